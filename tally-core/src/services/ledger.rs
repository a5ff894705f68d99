//! Ledger service - balance and history reads
//!
//! Reads take no locks and see the latest committed state.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{OwnerId, Transaction, User, Wallet};
use crate::ports::WalletStore;

pub struct LedgerService {
    store: Arc<dyn WalletStore>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn WalletStore>) -> Self {
        Self { store }
    }

    /// Current wallet (and balance) for an owner
    pub fn get_balance(&self, owner: OwnerId) -> Result<Wallet> {
        self.store
            .get_wallet_by_owner(owner.as_uuid())?
            .ok_or(Error::WalletNotFound(owner.as_uuid()))
    }

    /// The owner's ledger entries, newest first
    pub fn list_transactions(&self, owner: OwnerId, limit: Option<usize>) -> Result<Vec<Transaction>> {
        let wallet = self.get_balance(owner)?;
        self.store.list_transactions(wallet.id, limit)
    }

    pub fn list_wallet_transactions(
        &self,
        wallet_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>> {
        self.store.list_transactions(wallet_id, limit)
    }

    pub fn get_wallet(&self, wallet_id: Uuid) -> Result<Wallet> {
        self.store
            .get_wallet(wallet_id)?
            .ok_or_else(|| Error::not_found(format!("wallet {}", wallet_id)))
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.store.find_user_by_email(email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::Money;
    use crate::services::{MovementOptions, MovementService, OnboardingService, RetryPolicy};

    #[test]
    fn test_history_newest_first_with_limit() {
        let store = Arc::new(MemoryStore::new());
        let reg = OnboardingService::new(store.clone(), "USD")
            .register("dana@example.com")
            .unwrap();
        let owner = reg.user.owner_id();
        let movements = MovementService::new(store.clone(), RetryPolicy::default());
        let ledger = LedgerService::new(store);

        for minor in [100, 200, 300] {
            movements
                .deposit(owner, Money::from_minor(minor), &MovementOptions::default())
                .unwrap();
        }

        let history = ledger.list_transactions(owner, None).unwrap();
        let amounts: Vec<i64> = history.iter().map(|t| t.amount.minor()).collect();
        assert_eq!(amounts, vec![300, 200, 100]);

        let latest = ledger.list_transactions(owner, Some(2)).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].sequence, 3);

        let wallet = ledger.get_balance(owner).unwrap();
        assert_eq!(wallet.balance, Money::from_minor(600));
        assert_eq!(history[0].balance_after, wallet.balance);
        assert_eq!(ledger.get_wallet(wallet.id).unwrap().owner_id, owner.as_uuid());
        assert_eq!(
            ledger.list_wallet_transactions(wallet.id, None).unwrap().len(),
            3
        );
    }

    #[test]
    fn test_missing_wallet() {
        let ledger = LedgerService::new(Arc::new(MemoryStore::new()));
        let owner = OwnerId::new(Uuid::new_v4());
        assert!(matches!(
            ledger.get_balance(owner),
            Err(Error::WalletNotFound(_))
        ));
        assert!(matches!(
            ledger.list_transactions(owner, None),
            Err(Error::WalletNotFound(_))
        ));
        assert!(matches!(
            ledger.get_wallet(Uuid::new_v4()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_new_wallet_has_empty_history() {
        let store = Arc::new(MemoryStore::new());
        let reg = OnboardingService::new(store.clone(), "USD")
            .register("erin@example.com")
            .unwrap();
        let ledger = LedgerService::new(store);
        assert!(ledger
            .list_transactions(reg.user.owner_id(), None)
            .unwrap()
            .is_empty());
        assert!(ledger
            .find_user_by_email("ERIN@example.com")
            .unwrap()
            .is_some());
    }
}
