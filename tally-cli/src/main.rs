//! Tally CLI - wallet balances and ledger in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{balance, doctor, history, logs, movement, register, status, wallet};
use tally_core::{ErrorKind, LogEvent};

/// Tally - wallet balances and ledger in your terminal
#[derive(Parser)]
#[command(name = "tally", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a user and create their wallet
    Register {
        /// Email address (prompted for when omitted)
        email: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage wallets
    Wallet {
        #[command(subcommand)]
        command: wallet::WalletCommands,
    },

    /// Show the current balance
    Balance {
        /// Owner (user) ID
        #[arg(long, env = "TALLY_OWNER")]
        owner: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add money to a wallet
    Deposit {
        #[command(flatten)]
        args: movement::MovementArgs,
    },

    /// Take money out of a wallet
    Withdraw {
        #[command(flatten)]
        args: movement::MovementArgs,
    },

    /// Show ledger entries, newest first
    History {
        /// Owner (user) ID
        #[arg(long, env = "TALLY_OWNER")]
        owner: String,
        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run ledger consistency checks
    Doctor {
        /// Show the offending rows
        #[arg(long, short)]
        verbose: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show wallet and ledger totals
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Register { .. } => "register",
            Commands::Wallet { .. } => "wallet",
            Commands::Balance { .. } => "balance",
            Commands::Deposit { .. } => "deposit",
            Commands::Withdraw { .. } => "withdraw",
            Commands::History { .. } => "history",
            Commands::Doctor { .. } => "doctor",
            Commands::Status { .. } => "status",
            Commands::Logs { .. } => "logs",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.command.name();

    // Logger handle is dropped before the command runs; `logs` opens the same file
    commands::log_event(
        &commands::get_logger(),
        LogEvent::new("command_executed").with_command(command),
    );

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Already printed and logged by the command
            if let Some(reported) = e.downcast_ref::<commands::Reported>() {
                return exit_code(reported.0);
            }
            let logger = commands::get_logger();
            let event = LogEvent::new("command_failed").with_command(command);
            match e.downcast_ref::<tally_core::Error>() {
                Some(core) => {
                    commands::log_event(&logger, event.with_core_error(core));
                    output::error(&core.user_message());
                    exit_code(core.kind())
                }
                None => {
                    commands::log_event(&logger, event.with_error(format!("{:#}", e)));
                    output::error(&format!("{:#}", e));
                    ExitCode::FAILURE
                }
            }
        }
    }
}

/// Exit status per error kind, so scripts can tell a refusal from an outage
fn exit_code(kind: ErrorKind) -> ExitCode {
    match kind {
        ErrorKind::Validation => ExitCode::from(2),
        ErrorKind::NotFound => ExitCode::from(3),
        ErrorKind::BusinessRule => ExitCode::from(4),
        ErrorKind::Operational => ExitCode::from(5),
        ErrorKind::PartialFailure => ExitCode::from(6),
        ErrorKind::Cancelled => ExitCode::from(7),
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Register { email, json } => register::run(email, json),
        Commands::Wallet { command } => wallet::run(command),
        Commands::Balance { owner, json } => balance::run(&owner, json),
        Commands::Deposit { args } => movement::run(tally_core::MovementKind::Deposit, args),
        Commands::Withdraw { args } => movement::run(tally_core::MovementKind::Withdraw, args),
        Commands::History { owner, limit, json } => history::run(&owner, limit, json),
        Commands::Doctor { verbose, json } => doctor::run(verbose, json),
        Commands::Status { json } => status::run(json),
        Commands::Logs { command } => logs::run(command),
    }
}
