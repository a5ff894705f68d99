//! Tally Core - wallets with an atomic, auditable balance ledger
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (Wallet, Transaction, Money, etc.)
//! - **ports**: Trait definitions for the durable store (WalletStore, UnitOfWork)
//! - **services**: Business logic orchestration (movements, onboarding, reads)
//! - **adapters**: Concrete store implementations (DuckDB, in-memory)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbStore;
use config::Config;
use ports::WalletStore;
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, ErrorKind, OperationResult};
pub use domain::{Money, MovementKind, OwnerId, Transaction, User, Wallet};
pub use services::{EntryPoint, LogEvent, LoggingService};

/// Main context for Tally operations
///
/// This is the primary entry point for all business logic. It holds the
/// configuration, the store and every service built on it.
pub struct TallyContext {
    pub config: Config,
    pub store: Arc<dyn WalletStore>,
    pub movement_service: MovementService,
    pub onboarding_service: OnboardingService,
    pub ledger_service: LedgerService,
    pub doctor_service: DoctorService,
    pub status_service: StatusService,
    db_path: Option<PathBuf>,
}

impl TallyContext {
    /// Open the ledger database in `tally_dir` and run pending migrations
    pub fn new(tally_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(tally_dir)
            .with_context(|| format!("Failed to create {}", tally_dir.display()))?;
        let config = Config::load(tally_dir)?;

        let db_path = tally_dir.join(&config.database_file);
        let store = DuckDbStore::new(&db_path)
            .with_context(|| format!("Failed to open {}", db_path.display()))?;
        store.ensure_schema().context("Failed to migrate ledger database")?;

        let mut context = Self::with_store(config, Arc::new(store));
        context.db_path = Some(db_path);
        Ok(context)
    }

    /// Build a context around an existing store
    pub fn with_store(config: Config, store: Arc<dyn WalletStore>) -> Self {
        let movement_service = MovementService::new(Arc::clone(&store), config.retry_policy());
        let onboarding_service =
            OnboardingService::new(Arc::clone(&store), config.default_currency.clone());
        let ledger_service = LedgerService::new(Arc::clone(&store));
        let doctor_service = DoctorService::new(Arc::clone(&store));
        let status_service = StatusService::new(Arc::clone(&store));

        Self {
            config,
            store,
            movement_service,
            onboarding_service,
            ledger_service,
            doctor_service,
            status_service,
            db_path: None,
        }
    }

    /// Ledger database file, when the context is file-backed
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}
