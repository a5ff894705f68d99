//! Deposit and withdraw commands

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::{get_context, get_logger, log_event, parse_owner, print_json_result, report_error};
use crate::output;
use tally_core::services::{CancelToken, MovementOptions};
use tally_core::{LogEvent, Money, MovementKind};

#[derive(Args)]
pub struct MovementArgs {
    /// Amount, e.g. 100 or 12.50
    amount: String,
    /// Owner (user) ID
    #[arg(long, env = "TALLY_OWNER")]
    owner: String,
    /// Ledger description (defaults to "User deposit" / "User withdrawal")
    #[arg(long, short)]
    description: Option<String>,
    /// Give up if not committed within this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(kind: MovementKind, args: MovementArgs) -> Result<()> {
    let owner = parse_owner(&args.owner)?;
    let amount: Money = args.amount.parse()?;

    let ctx = get_context()?;
    let options = MovementOptions {
        description: args.description,
        cancel: match args.timeout_ms {
            Some(ms) => CancelToken::with_timeout(Duration::from_millis(ms)),
            None => CancelToken::new(),
        },
    };

    let result = ctx
        .movement_service
        .apply_movement(owner, kind, amount, &options);

    let logger = get_logger();
    match &result {
        Ok(_) => log_event(
            &logger,
            LogEvent::new("movement_applied").with_command(kind.as_str()),
        ),
        Err(e) => log_event(
            &logger,
            LogEvent::new("movement_rejected")
                .with_command(kind.as_str())
                .with_core_error(e),
        ),
    }

    if args.json {
        return print_json_result(result);
    }

    // Already logged as movement_rejected
    let receipt = match result {
        Ok(receipt) => receipt,
        Err(e) => return Err(report_error(&e)),
    };
    let wallet = ctx.ledger_service.get_wallet(receipt.wallet_id)?;
    let verb = match kind {
        MovementKind::Deposit => "Deposited",
        MovementKind::Withdraw => "Withdrew",
    };
    output::success(&format!(
        "{} {}",
        verb,
        output::format_money(receipt.amount, &wallet.currency)
    ));
    println!(
        "  Balance: {} -> {}",
        receipt.balance_before,
        output::format_money(receipt.new_balance, &wallet.currency).bold()
    );
    println!("{}", format!("  Entry #{} ({})", receipt.sequence, receipt.transaction_id).dimmed());
    Ok(())
}
