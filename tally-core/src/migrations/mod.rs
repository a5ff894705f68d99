//! Ledger database migrations - embedded SQL files
//!
//! Each migration is a `(name, sql)` pair compiled in with `include_str!`
//! and applied in listed order.
//!
//! To add one, create `NNN_description.sql` next to this file and append
//! an entry below. Never edit a migration that has shipped.

pub const MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
