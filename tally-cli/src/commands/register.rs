//! Register command - create a user and their wallet

use anyhow::Result;
use colored::Colorize;
use dialoguer::Input;

use super::{get_context, print_json_result};
use crate::output;

pub fn run(email: Option<String>, json: bool) -> Result<()> {
    let email = match email {
        Some(e) => e,
        None => Input::new().with_prompt("Email").interact_text()?,
    };

    let ctx = get_context()?;
    let result = ctx.onboarding_service.register(&email);

    if json {
        return print_json_result(result);
    }

    let registration = result?;
    output::success("Registered");
    println!("  User ID:   {}", registration.user.id.to_string().bold());
    println!("  Email:     {}", registration.user.email);
    println!("  Wallet ID: {}", registration.wallet.id);
    println!(
        "  Balance:   {}",
        output::format_money(registration.wallet.balance, &registration.wallet.currency)
    );
    println!();
    output::info(&format!(
        "Use --owner {} (or TALLY_OWNER) for wallet commands",
        registration.user.id
    ));

    Ok(())
}
