//! History command - list ledger entries, newest first

use anyhow::Result;
use comfy_table::{Cell, CellAlignment};

use super::{get_context, parse_owner, print_json_result};
use crate::output;

pub fn run(owner: &str, limit: Option<usize>, json: bool) -> Result<()> {
    let owner = parse_owner(owner)?;
    let ctx = get_context()?;
    let result = ctx.ledger_service.list_transactions(owner, limit);

    if json {
        return print_json_result(result);
    }

    let entries = result?;
    if entries.is_empty() {
        println!("No transactions yet.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["#", "Date", "Description", "Amount", "Balance"]);
    for entry in &entries {
        table.add_row(vec![
            Cell::new(entry.sequence),
            Cell::new(entry.created_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(&entry.description),
            output::signed_amount_cell(entry.kind, entry.amount),
            Cell::new(entry.balance_after).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{}", table);
    Ok(())
}
