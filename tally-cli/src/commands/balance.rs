//! Balance command - show an owner's current balance

use anyhow::Result;
use colored::Colorize;

use super::{get_context, parse_owner, print_json_result};
use crate::output;

pub fn run(owner: &str, json: bool) -> Result<()> {
    let owner = parse_owner(owner)?;
    let ctx = get_context()?;
    let result = ctx.ledger_service.get_balance(owner);

    if json {
        return print_json_result(result);
    }

    let wallet = result?;
    println!(
        "{} {}",
        "Balance:".bold(),
        output::format_money(wallet.balance, &wallet.currency).bold()
    );
    println!("{}", format!("Wallet {}", wallet.id).dimmed());
    Ok(())
}
