//! Status command - show wallet and ledger totals

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.get_status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Ledger Status".bold());
    println!();

    let mut table = output::create_table();
    table.add_row(vec!["Wallets".to_string(), status.total_wallets.to_string()]);
    table.add_row(vec![
        "Transactions".to_string(),
        status.total_transactions.to_string(),
    ]);
    for (currency, total) in &status.total_balance_by_currency {
        table.add_row(vec![
            format!("Total {}", currency),
            output::format_money(*total, currency),
        ]);
    }
    println!("{}", table);

    if let Some(last) = &status.last_activity {
        println!();
        println!("Last activity: {}", last);
    }
    if let Some(path) = ctx.db_path() {
        println!("{}", format!("Database: {}", path.display()).dimmed());
    }

    Ok(())
}
