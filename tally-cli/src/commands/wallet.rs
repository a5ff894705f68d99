//! Wallet command - provision and inspect wallets

use anyhow::Result;
use clap::Subcommand;
use uuid::Uuid;

use super::{get_context, parse_owner, print_json_result};
use crate::output;

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Create a wallet for an existing owner
    Create {
        /// Owner (user) ID
        #[arg(long, env = "TALLY_OWNER")]
        owner: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a wallet by its ID
    Show {
        /// Wallet ID
        wallet_id: Uuid,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: WalletCommands) -> Result<()> {
    match command {
        WalletCommands::Create { owner, json } => run_create(&owner, json),
        WalletCommands::Show { wallet_id, json } => run_show(wallet_id, json),
    }
}

fn run_create(owner: &str, json: bool) -> Result<()> {
    let owner = parse_owner(owner)?;
    let ctx = get_context()?;
    let result = ctx.onboarding_service.create_wallet(owner);

    if json {
        return print_json_result(result);
    }

    let wallet = result?;
    output::success("Wallet created");
    println!("  Wallet ID: {}", wallet.id);
    println!("  Owner:     {}", wallet.owner_id);
    println!("  Currency:  {}", wallet.currency);
    Ok(())
}

fn run_show(wallet_id: Uuid, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx.ledger_service.get_wallet(wallet_id);

    if json {
        return print_json_result(result);
    }

    let wallet = result?;
    let mut table = output::create_table();
    table.add_row(vec!["Wallet ID".to_string(), wallet.id.to_string()]);
    table.add_row(vec!["Owner".to_string(), wallet.owner_id.to_string()]);
    table.add_row(vec![
        "Balance".to_string(),
        output::format_money(wallet.balance, &wallet.currency),
    ]);
    table.add_row(vec!["Entries".to_string(), wallet.version.to_string()]);
    table.add_row(vec!["Created".to_string(), wallet.created_at.to_rfc3339()]);
    table.add_row(vec!["Updated".to_string(), wallet.updated_at.to_rfc3339()]);
    println!("{}", table);
    Ok(())
}
