//! Wallet store port - durable wallets, users and ledger entries

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{Money, Transaction, User, Wallet};

/// Durable store behind every service.
///
/// Writes only happen through a [`UnitOfWork`]; the read methods see the
/// latest committed state and never observe a partially applied unit.
pub trait WalletStore: Send + Sync {
    /// Start a unit of work. Dropping it without `commit` discards every
    /// write made through it.
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>>;

    // === Wallets ===

    fn get_wallet_by_owner(&self, owner_id: Uuid) -> Result<Option<Wallet>>;

    fn get_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>>;

    fn list_wallets(&self) -> Result<Vec<Wallet>>;

    // === Ledger ===

    /// Entries for one wallet, newest first
    fn list_transactions(&self, wallet_id: Uuid, limit: Option<usize>) -> Result<Vec<Transaction>>;

    /// Every entry in the store, grouped by wallet and ordered by sequence
    fn list_all_transactions(&self) -> Result<Vec<Transaction>>;

    /// Every wallet and every entry, read from one consistent snapshot
    fn ledger_snapshot(&self) -> Result<LedgerSnapshot>;

    // === Users ===

    fn get_user(&self, user_id: Uuid) -> Result<Option<User>>;

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
}

/// Wallets and ledger entries as of a single point in time
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    /// Ordered by creation time
    pub wallets: Vec<Wallet>,
    /// Grouped by wallet and ordered by sequence
    pub transactions: Vec<Transaction>,
}

/// One atomic, isolated batch of writes.
pub trait UnitOfWork {
    /// Claim the owner's wallet for this unit, then read it.
    ///
    /// Blocks while another unit of the same store holds the claim, and
    /// reads the state that unit committed. Waiting too long, or a change
    /// made outside the store's claims, surfaces as `Error::Conflict`.
    fn lock_wallet(&mut self, owner_id: Uuid) -> Result<Option<Wallet>>;

    /// Store a new balance and bump the wallet version, provided the version
    /// is still `expected_version`.
    fn update_balance(
        &mut self,
        wallet_id: Uuid,
        expected_version: u64,
        balance: Money,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    fn append_transaction(&mut self, tx: &Transaction) -> Result<()>;

    /// Fails with `Error::EmailTaken` when the email is registered
    fn insert_user(&mut self, user: &User) -> Result<()>;

    /// Fails with `Error::WalletExists` when the owner already has a wallet
    fn insert_wallet(&mut self, wallet: &Wallet) -> Result<()>;

    fn commit(self: Box<Self>) -> Result<()>;
}
