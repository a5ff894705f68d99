//! Output formatting utilities

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, CellAlignment, ContentArrangement, Table};
use tally_core::{Money, MovementKind};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Amount with its currency, e.g. `60.00 USD`
pub fn format_money(amount: Money, currency: &str) -> String {
    format!("{} {}", amount, currency)
}

/// Right-aligned amount cell, signed by movement kind
pub fn signed_amount_cell(kind: MovementKind, amount: Money) -> Cell {
    let text = match kind {
        MovementKind::Deposit => format!("+{}", amount),
        MovementKind::Withdraw => format!("-{}", amount),
    };
    let cell = Cell::new(text).set_alignment(CellAlignment::Right);
    match kind {
        MovementKind::Deposit => cell.fg(comfy_table::Color::Green),
        MovementKind::Withdraw => cell.fg(comfy_table::Color::Red),
    }
}

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
