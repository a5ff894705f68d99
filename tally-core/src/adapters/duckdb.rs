//! DuckDB store implementation
//!
//! One database instance is opened per store. Every unit of work and every
//! read gets its own connection cloned from it, so work on different wallets
//! runs in parallel.
//!
//! DuckDB is MVCC without `SELECT ... FOR UPDATE`, and a no-op update does
//! not make a row exclusive. Units therefore take a [`WalletClaims`] claim
//! before touching a wallet and only then open their DuckDB transaction, so
//! the snapshot they read includes the previous holder's commit. The
//! versioned balance update stays as a second guard; a lost race there, or
//! a DuckDB write-write conflict, surfaces as [`Error::Conflict`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{params, Connection};
use uuid::Uuid;

use super::claims::{ClaimGuard, WalletClaims, CLAIM_TIMEOUT};
use crate::domain::result::{Error, Result};
use crate::domain::{Money, MovementKind, Transaction, User, Wallet};
use crate::migrations::MIGRATIONS;
use crate::ports::{LedgerSnapshot, UnitOfWork, WalletStore};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of attempts when the database file is locked
const MAX_OPEN_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const WALLET_COLUMNS: &str =
    "id, owner_id, balance_minor, currency, version, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, wallet_id, kind, amount_minor, balance_before_minor, \
     balance_after_minor, description, sequence, created_at";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_open_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        || lower.contains("resource temporarily unavailable")
        || lower.contains("could not set lock on file")
        || lower.contains("database is locked")
}

/// Check if an error is a write-write conflict between concurrent transactions
fn is_conflict_error(err_msg: &str) -> bool {
    err_msg.to_lowercase().contains("conflict")
}

fn is_unique_violation(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("duplicate key") || lower.contains("unique constraint")
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        let msg = err.to_string();
        if is_conflict_error(&msg) {
            Error::Conflict(msg)
        } else {
            Error::Database(msg)
        }
    }
}

/// DuckDB-backed [`WalletStore`]
pub struct DuckDbStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    claims: Arc<WalletClaims>,
}

impl DuckDbStore {
    /// Open (or create) a file-backed store.
    ///
    /// Retries with exponential backoff while another process holds the
    /// file lock.
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        let mut attempt = 0;
        loop {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                        claims: WalletClaims::new(),
                    });
                }
                Err(e) => {
                    attempt += 1;
                    let err_msg = e.to_string();
                    if !is_retryable_open_error(&err_msg) || attempt >= MAX_OPEN_RETRIES {
                        return Err(e);
                    }
                    let delay =
                        Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt - 1));
                    eprintln!(
                        "[tally] Database busy, retrying in {}ms (attempt {}/{}): {}",
                        delay.as_millis(),
                        attempt,
                        MAX_OPEN_RETRIES,
                        err_msg
                    );
                    thread::sleep(delay);
                }
            }
        }
    }

    /// Open a private in-memory store, used by tests and embedders
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
            claims: WalletClaims::new(),
        })
    }

    fn try_open_connection(db_path: &Path) -> anyhow::Result<Connection> {
        // Extension autoloading stays off; nothing here needs extensions
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    /// Path of the database file, `None` for in-memory stores
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Apply pending migrations
    pub fn run_migrations(&self) -> anyhow::Result<MigrationResult> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        MigrationService::new(&conn, MIGRATIONS).run_pending()
    }

    /// Ensure the schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> anyhow::Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    /// Size of the database file in bytes
    pub fn get_db_size(&self) -> anyhow::Result<u64> {
        match &self.db_path {
            Some(path) => Ok(std::fs::metadata(path)?.len()),
            None => Ok(0),
        }
    }

    /// A fresh connection to the shared database instance
    fn connection(&self) -> Result<Connection> {
        let root = self
            .conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))?;
        Ok(root.try_clone()?)
    }
}

impl WalletStore for DuckDbStore {
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>> {
        let conn = self.connection()?;
        Ok(Box::new(DuckDbUnit::new(conn, Arc::clone(&self.claims))))
    }

    fn get_wallet_by_owner(&self, owner_id: Uuid) -> Result<Option<Wallet>> {
        let conn = self.connection()?;
        query_wallet(&conn, "owner_id", owner_id)
    }

    fn get_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>> {
        let conn = self.connection()?;
        query_wallet(&conn, "id", wallet_id)
    }

    fn list_wallets(&self) -> Result<Vec<Wallet>> {
        let conn = self.connection()?;
        query_all_wallets(&conn)
    }

    fn list_transactions(&self, wallet_id: Uuid, limit: Option<usize>) -> Result<Vec<Transaction>> {
        let conn = self.connection()?;
        let mut sql = format!(
            "SELECT {} FROM transactions WHERE wallet_id = ? ORDER BY sequence DESC",
            TRANSACTION_COLUMNS
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![wallet_id.to_string()])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(row_to_transaction(row)?);
        }
        Ok(entries)
    }

    fn list_all_transactions(&self) -> Result<Vec<Transaction>> {
        let conn = self.connection()?;
        query_all_transactions(&conn)
    }

    fn ledger_snapshot(&self) -> Result<LedgerSnapshot> {
        let conn = self.connection()?;
        conn.execute_batch("BEGIN TRANSACTION")?;
        let snapshot = LedgerSnapshot {
            wallets: query_all_wallets(&conn)?,
            transactions: query_all_transactions(&conn)?,
        };
        conn.execute_batch("COMMIT")?;
        Ok(snapshot)
    }

    fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare("SELECT id, email, created_at, updated_at FROM users WHERE id = ?")?;
        let mut rows = stmt.query(params![user_id.to_string()])?;
        let user = match rows.next()? {
            Some(row) => Some(row_to_user(row)?),
            None => None,
        };
        Ok(user)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare("SELECT id, email, created_at, updated_at FROM users WHERE email = ?")?;
        let mut rows = stmt.query(params![email.trim().to_lowercase()])?;
        let user = match rows.next()? {
            Some(row) => Some(row_to_user(row)?),
            None => None,
        };
        Ok(user)
    }
}

/// An explicit DuckDB transaction on its own connection.
///
/// `BEGIN` is deferred to the first statement so that a unit waiting on a
/// wallet claim starts its snapshot only once the claim is granted.
struct DuckDbUnit {
    conn: Connection,
    claims: Arc<WalletClaims>,
    held: Vec<ClaimGuard>,
    started: bool,
    finished: bool,
}

impl DuckDbUnit {
    fn new(conn: Connection, claims: Arc<WalletClaims>) -> Self {
        Self {
            conn,
            claims,
            held: Vec::new(),
            started: false,
            finished: false,
        }
    }

    fn start(&mut self) -> Result<()> {
        if !self.started {
            self.conn.execute_batch("BEGIN TRANSACTION")?;
            self.started = true;
        }
        Ok(())
    }
}

impl UnitOfWork for DuckDbUnit {
    fn lock_wallet(&mut self, owner_id: Uuid) -> Result<Option<Wallet>> {
        if !self.held.iter().any(|claim| claim.owner_id() == owner_id) {
            let claim = self.claims.acquire(owner_id, CLAIM_TIMEOUT)?;
            self.held.push(claim);
        }
        self.start()?;
        query_wallet(&self.conn, "owner_id", owner_id)
    }

    fn update_balance(
        &mut self,
        wallet_id: Uuid,
        expected_version: u64,
        balance: Money,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.start()?;
        let changed = self.conn.execute(
            "UPDATE wallets SET balance_minor = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
            params![
                balance.minor(),
                format_timestamp(&updated_at),
                wallet_id.to_string(),
                expected_version as i64,
            ],
        )?;
        if changed != 1 {
            return Err(Error::Conflict(format!(
                "wallet {} moved past version {}",
                wallet_id, expected_version
            )));
        }
        Ok(())
    }

    fn append_transaction(&mut self, tx: &Transaction) -> Result<()> {
        self.start()?;
        self.conn.execute(
            &format!(
                "INSERT INTO transactions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                TRANSACTION_COLUMNS
            ),
            params![
                tx.id.to_string(),
                tx.wallet_id.to_string(),
                tx.kind.as_str(),
                tx.amount.minor(),
                tx.balance_before.minor(),
                tx.balance_after.minor(),
                tx.description,
                tx.sequence as i64,
                format_timestamp(&tx.created_at),
            ],
        )?;
        Ok(())
    }

    fn insert_user(&mut self, user: &User) -> Result<()> {
        self.start()?;
        let result = self.conn.execute(
            "INSERT INTO users (id, email, created_at, updated_at) VALUES (?, ?, ?, ?)",
            params![
                user.id.to_string(),
                user.email,
                format_timestamp(&user.created_at),
                format_timestamp(&user.updated_at),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e.to_string()) => Err(Error::EmailTaken),
            Err(e) => Err(e.into()),
        }
    }

    fn insert_wallet(&mut self, wallet: &Wallet) -> Result<()> {
        self.start()?;
        let result = self.conn.execute(
            &format!(
                "INSERT INTO wallets ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
                WALLET_COLUMNS
            ),
            params![
                wallet.id.to_string(),
                wallet.owner_id.to_string(),
                wallet.balance.minor(),
                wallet.currency,
                wallet.version as i64,
                format_timestamp(&wallet.created_at),
                format_timestamp(&wallet.updated_at),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e.to_string()) => {
                Err(Error::WalletExists(wallet.owner_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        if !self.started {
            return Ok(());
        }
        if let Err(e) = self.conn.execute_batch("COMMIT") {
            // A failed COMMIT may leave the transaction open
            let _ = self.conn.execute_batch("ROLLBACK");
            return Err(e.into());
        }
        Ok(())
    }
}

impl Drop for DuckDbUnit {
    // Claims in `held` are released after this, once the transaction is closed
    fn drop(&mut self) {
        if self.started && !self.finished {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

// Row mapping

fn query_all_wallets(conn: &Connection) -> Result<Vec<Wallet>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM wallets ORDER BY created_at, id",
        WALLET_COLUMNS
    ))?;
    let mut rows = stmt.query([])?;
    let mut wallets = Vec::new();
    while let Some(row) = rows.next()? {
        wallets.push(row_to_wallet(row)?);
    }
    Ok(wallets)
}

fn query_all_transactions(conn: &Connection) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM transactions ORDER BY wallet_id, sequence",
        TRANSACTION_COLUMNS
    ))?;
    let mut rows = stmt.query([])?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        entries.push(row_to_transaction(row)?);
    }
    Ok(entries)
}

fn query_wallet(conn: &Connection, column: &str, id: Uuid) -> Result<Option<Wallet>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM wallets WHERE {} = ?",
        WALLET_COLUMNS, column
    ))?;
    let mut rows = stmt.query(params![id.to_string()])?;
    let wallet = match rows.next()? {
        Some(row) => Some(row_to_wallet(row)?),
        None => None,
    };
    Ok(wallet)
}

fn row_to_wallet(row: &duckdb::Row) -> Result<Wallet> {
    Ok(Wallet {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        owner_id: parse_uuid(&row.get::<_, String>(1)?)?,
        balance: Money::from_minor(row.get(2)?),
        currency: row.get(3)?,
        version: parse_counter(row.get(4)?)?,
        created_at: parse_timestamp(&row.get::<_, String>(5)?)?,
        updated_at: parse_timestamp(&row.get::<_, String>(6)?)?,
    })
}

fn row_to_transaction(row: &duckdb::Row) -> Result<Transaction> {
    let kind: String = row.get(2)?;
    Ok(Transaction {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        wallet_id: parse_uuid(&row.get::<_, String>(1)?)?,
        kind: kind
            .parse::<MovementKind>()
            .map_err(|_| Error::database(format!("unknown transaction kind '{}'", kind)))?,
        amount: Money::from_minor(row.get(3)?),
        balance_before: Money::from_minor(row.get(4)?),
        balance_after: Money::from_minor(row.get(5)?),
        description: row.get(6)?,
        sequence: parse_counter(row.get(7)?)?,
        created_at: parse_timestamp(&row.get::<_, String>(8)?)?,
    })
}

fn row_to_user(row: &duckdb::Row) -> Result<User> {
    Ok(User {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        email: row.get(1)?,
        created_at: parse_timestamp(&row.get::<_, String>(2)?)?,
        updated_at: parse_timestamp(&row.get::<_, String>(3)?)?,
    })
}

// Helper functions

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::database(format!("invalid timestamp '{}': {}", s, e)))
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::database(format!("invalid id '{}': {}", s, e)))
}

fn parse_counter(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::database(format!("negative counter {}", value)))
}
