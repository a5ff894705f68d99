//! In-memory store
//!
//! Keeps everything behind one mutex and stages a unit's writes until
//! commit, so readers never see a half-applied unit. Wallet claims and the
//! versioned commit check behave like the DuckDB adapter: a second unit
//! claiming a wallet that is already claimed waits for the first to finish.
//!
//! Faults can be injected at each protocol step to check that a failed
//! unit leaves nothing behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::claims::{ClaimGuard, WalletClaims, CLAIM_TIMEOUT};
use crate::domain::result::{Error, Result};
use crate::domain::{Money, Transaction, User, Wallet};
use crate::ports::{LedgerSnapshot, UnitOfWork, WalletStore};

/// Protocol step at which an injected fault fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    Begin,
    Read,
    Write,
    Append,
    Commit,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    wallets: HashMap<Uuid, Wallet>,
    transactions: Vec<Transaction>,
}

impl MemoryState {
    fn wallet_for_owner(&self, owner_id: Uuid) -> Option<&Wallet> {
        self.wallets.values().find(|w| w.owner_id == owner_id)
    }
}

/// Process-local [`WalletStore`]
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    claims: Arc<WalletClaims>,
    faults: Mutex<Vec<FaultPoint>>,
    pending_conflicts: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next unit that reaches `point` with a database error
    pub fn inject_fault(&self, point: FaultPoint) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push(point);
        }
    }

    /// Make the next `count` commits fail with `Error::Conflict`
    pub fn inject_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Overwrite a stored balance without touching version or ledger.
    ///
    /// Only useful for simulating corruption.
    pub fn overwrite_balance(&self, wallet_id: Uuid, balance: Money) -> Result<()> {
        let mut state = self.state()?;
        let wallet = state
            .wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| Error::not_found(format!("wallet {}", wallet_id)))?;
        wallet.balance = balance;
        Ok(())
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    fn trip(&self, point: FaultPoint) -> Result<()> {
        let mut faults = self
            .faults
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))?;
        if let Some(pos) = faults.iter().position(|f| *f == point) {
            faults.remove(pos);
            return Err(Error::database(format!("injected fault at {:?}", point)));
        }
        Ok(())
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl WalletStore for MemoryStore {
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>> {
        self.trip(FaultPoint::Begin)?;
        Ok(Box::new(MemoryUnit {
            store: self,
            held: Vec::new(),
            balances: Vec::new(),
            transactions: Vec::new(),
            users: Vec::new(),
            wallets: Vec::new(),
        }))
    }

    fn get_wallet_by_owner(&self, owner_id: Uuid) -> Result<Option<Wallet>> {
        Ok(self.state()?.wallet_for_owner(owner_id).cloned())
    }

    fn get_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>> {
        Ok(self.state()?.wallets.get(&wallet_id).cloned())
    }

    fn list_wallets(&self) -> Result<Vec<Wallet>> {
        Ok(sorted_wallets(&*self.state()?))
    }

    fn list_transactions(&self, wallet_id: Uuid, limit: Option<usize>) -> Result<Vec<Transaction>> {
        let state = self.state()?;
        let mut entries: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    fn list_all_transactions(&self) -> Result<Vec<Transaction>> {
        Ok(sorted_transactions(&*self.state()?))
    }

    fn ledger_snapshot(&self) -> Result<LedgerSnapshot> {
        let state = self.state()?;
        Ok(LedgerSnapshot {
            wallets: sorted_wallets(&state),
            transactions: sorted_transactions(&state),
        })
    }

    fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.state()?.users.get(&user_id).cloned())
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.trim().to_lowercase();
        Ok(self
            .state()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }
}

fn sorted_wallets(state: &MemoryState) -> Vec<Wallet> {
    let mut wallets: Vec<Wallet> = state.wallets.values().cloned().collect();
    wallets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    wallets
}

fn sorted_transactions(state: &MemoryState) -> Vec<Transaction> {
    let mut entries = state.transactions.clone();
    entries.sort_by(|a, b| a.wallet_id.cmp(&b.wallet_id).then(a.sequence.cmp(&b.sequence)));
    entries
}

struct StagedBalance {
    wallet_id: Uuid,
    expected_version: u64,
    balance: Money,
    updated_at: DateTime<Utc>,
}

struct MemoryUnit<'a> {
    store: &'a MemoryStore,
    held: Vec<ClaimGuard>,
    balances: Vec<StagedBalance>,
    transactions: Vec<Transaction>,
    users: Vec<User>,
    wallets: Vec<Wallet>,
}

impl MemoryUnit<'_> {
    fn check_versions(&self, state: &MemoryState) -> Result<()> {
        for staged in &self.balances {
            let current = state.wallets.get(&staged.wallet_id).map(|w| w.version);
            if current != Some(staged.expected_version) {
                return Err(Error::Conflict(format!(
                    "wallet {} moved past version {}",
                    staged.wallet_id, staged.expected_version
                )));
            }
        }
        Ok(())
    }
}

impl UnitOfWork for MemoryUnit<'_> {
    fn lock_wallet(&mut self, owner_id: Uuid) -> Result<Option<Wallet>> {
        let store = self.store;
        store.trip(FaultPoint::Read)?;
        if !self.held.iter().any(|claim| claim.owner_id() == owner_id) {
            let claim = store.claims.acquire(owner_id, CLAIM_TIMEOUT)?;
            self.held.push(claim);
        }
        let state = store.state()?;
        Ok(state.wallet_for_owner(owner_id).cloned())
    }

    fn update_balance(
        &mut self,
        wallet_id: Uuid,
        expected_version: u64,
        balance: Money,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let store = self.store;
        store.trip(FaultPoint::Write)?;
        let state = store.state()?;
        let current = state.wallets.get(&wallet_id).map(|w| w.version);
        if current != Some(expected_version) {
            return Err(Error::Conflict(format!(
                "wallet {} moved past version {}",
                wallet_id, expected_version
            )));
        }
        if balance.is_negative() {
            return Err(Error::database("balance_minor must not be negative"));
        }
        self.balances.push(StagedBalance {
            wallet_id,
            expected_version,
            balance,
            updated_at,
        });
        Ok(())
    }

    fn append_transaction(&mut self, tx: &Transaction) -> Result<()> {
        let store = self.store;
        store.trip(FaultPoint::Append)?;
        let state = store.state()?;
        let taken = state
            .transactions
            .iter()
            .chain(self.transactions.iter())
            .any(|t| t.wallet_id == tx.wallet_id && t.sequence == tx.sequence);
        if taken {
            return Err(Error::Conflict(format!(
                "sequence {} already recorded for wallet {}",
                tx.sequence, tx.wallet_id
            )));
        }
        self.transactions.push(tx.clone());
        Ok(())
    }

    fn insert_user(&mut self, user: &User) -> Result<()> {
        let store = self.store;
        let state = store.state()?;
        let taken = state
            .users
            .values()
            .chain(self.users.iter())
            .any(|u| u.email == user.email);
        if taken {
            return Err(Error::EmailTaken);
        }
        self.users.push(user.clone());
        Ok(())
    }

    fn insert_wallet(&mut self, wallet: &Wallet) -> Result<()> {
        let store = self.store;
        store.trip(FaultPoint::Write)?;
        let state = store.state()?;
        let taken = state.wallet_for_owner(wallet.owner_id).is_some()
            || self.wallets.iter().any(|w| w.owner_id == wallet.owner_id);
        if taken {
            return Err(Error::WalletExists(wallet.owner_id));
        }
        self.wallets.push(wallet.clone());
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        let store = self.store;
        store.trip(FaultPoint::Commit)?;
        if store.take_conflict() {
            return Err(Error::Conflict("injected commit conflict".to_string()));
        }

        let mut state = store.state()?;
        self.check_versions(&state)?;
        // Uniqueness may have changed since staging
        for user in &self.users {
            if state.users.values().any(|u| u.email == user.email) {
                return Err(Error::EmailTaken);
            }
        }
        for wallet in &self.wallets {
            if state.wallet_for_owner(wallet.owner_id).is_some() {
                return Err(Error::WalletExists(wallet.owner_id));
            }
        }

        for user in self.users.drain(..) {
            state.users.insert(user.id, user);
        }
        for wallet in self.wallets.drain(..) {
            state.wallets.insert(wallet.id, wallet);
        }
        for staged in self.balances.drain(..) {
            if let Some(wallet) = state.wallets.get_mut(&staged.wallet_id) {
                wallet.balance = staged.balance;
                wallet.version += 1;
                wallet.updated_at = staged.updated_at;
            }
        }
        state.transactions.append(&mut self.transactions);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MovementKind;

    fn seed(store: &MemoryStore) -> Wallet {
        let wallet = Wallet::new(Uuid::new_v4(), "EUR").unwrap();
        let mut unit = store.begin().unwrap();
        unit.insert_wallet(&wallet).unwrap();
        unit.commit().unwrap();
        wallet
    }

    fn deposit(store: &MemoryStore, owner_id: Uuid, minor: i64) -> Result<()> {
        let mut unit = store.begin()?;
        let wallet = unit.lock_wallet(owner_id)?.unwrap();
        let after = MovementKind::Deposit.apply(wallet.balance, Money::from_minor(minor))?;
        let now = Utc::now();
        unit.update_balance(wallet.id, wallet.version, after, now)?;
        let tx = Transaction::record(
            &wallet,
            MovementKind::Deposit,
            Money::from_minor(minor),
            after,
            "User deposit",
            now,
        );
        unit.append_transaction(&tx)?;
        unit.commit()
    }

    #[test]
    fn test_staged_writes_invisible_until_commit() {
        let store = MemoryStore::new();
        let wallet = seed(&store);

        let mut unit = store.begin().unwrap();
        let locked = unit.lock_wallet(wallet.owner_id).unwrap().unwrap();
        unit.update_balance(locked.id, 0, Money::from_minor(250), Utc::now())
            .unwrap();
        assert_eq!(
            store.get_wallet(wallet.id).unwrap().unwrap().balance,
            Money::ZERO
        );

        unit.commit().unwrap();
        let after = store.get_wallet(wallet.id).unwrap().unwrap();
        assert_eq!(after.balance, Money::from_minor(250));
        assert_eq!(after.version, 1);
    }

    #[test]
    fn test_second_claim_waits_until_release() {
        let store = MemoryStore::new();
        let wallet = seed(&store);

        let mut first = store.begin().unwrap();
        first.lock_wallet(wallet.owner_id).unwrap();
        assert!(store.claims.is_claimed(wallet.owner_id));

        std::thread::scope(|s| {
            let waiter = s.spawn(|| deposit(&store, wallet.owner_id, 40));
            std::thread::sleep(std::time::Duration::from_millis(50));
            assert!(!waiter.is_finished());

            first
                .update_balance(wallet.id, 0, Money::from_minor(10), Utc::now())
                .unwrap();
            first.commit().unwrap();
            waiter.join().unwrap().unwrap();
        });

        let after = store.get_wallet(wallet.id).unwrap().unwrap();
        assert_eq!(after.balance, Money::from_minor(50));
        assert_eq!(after.version, 2);
        assert!(!store.claims.is_claimed(wallet.owner_id));
    }

    #[test]
    fn test_dropped_unit_releases_claim() {
        let store = MemoryStore::new();
        let wallet = seed(&store);

        let mut first = store.begin().unwrap();
        first.lock_wallet(wallet.owner_id).unwrap();
        drop(first);

        assert!(!store.claims.is_claimed(wallet.owner_id));
        deposit(&store, wallet.owner_id, 1).unwrap();
    }

    #[test]
    fn test_injected_faults_fire_once() {
        let store = MemoryStore::new();
        let wallet = seed(&store);

        store.inject_fault(FaultPoint::Append);
        assert!(matches!(
            deposit(&store, wallet.owner_id, 100),
            Err(Error::Database(_))
        ));
        assert!(store.list_transactions(wallet.id, None).unwrap().is_empty());

        deposit(&store, wallet.owner_id, 100).unwrap();
        assert_eq!(store.list_transactions(wallet.id, None).unwrap().len(), 1);
    }

    #[test]
    fn test_injected_conflicts() {
        let store = MemoryStore::new();
        let wallet = seed(&store);

        store.inject_conflicts(2);
        assert!(matches!(
            deposit(&store, wallet.owner_id, 1),
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            deposit(&store, wallet.owner_id, 1),
            Err(Error::Conflict(_))
        ));
        deposit(&store, wallet.owner_id, 1).unwrap();
        assert_eq!(
            store.get_wallet(wallet.id).unwrap().unwrap().version,
            1
        );
    }

    #[test]
    fn test_unique_owner_and_email() {
        let store = MemoryStore::new();
        let wallet = seed(&store);

        let mut unit = store.begin().unwrap();
        let dup = Wallet::new(wallet.owner_id, "EUR").unwrap();
        assert!(matches!(
            unit.insert_wallet(&dup),
            Err(Error::WalletExists(_))
        ));

        let user = User::new("a@b.io").unwrap();
        unit.insert_user(&user).unwrap();
        let again = User::new("A@B.io").unwrap();
        assert!(matches!(unit.insert_user(&again), Err(Error::EmailTaken)));
    }

    #[test]
    fn test_overwrite_balance_leaves_version() {
        let store = MemoryStore::new();
        let wallet = seed(&store);
        store
            .overwrite_balance(wallet.id, Money::from_minor(999))
            .unwrap();
        let after = store.get_wallet(wallet.id).unwrap().unwrap();
        assert_eq!(after.balance, Money::from_minor(999));
        assert_eq!(after.version, 0);
    }
}
