//! Onboarding service - user registration and wallet provisioning

use std::sync::Arc;

use serde::Serialize;

use crate::domain::result::{Error, ErrorKind, Result};
use crate::domain::{OwnerId, User, Wallet};
use crate::ports::WalletStore;

/// A newly registered user together with their empty wallet
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub user: User,
    pub wallet: Wallet,
}

pub struct OnboardingService {
    store: Arc<dyn WalletStore>,
    default_currency: String,
}

impl OnboardingService {
    pub fn new(store: Arc<dyn WalletStore>, default_currency: impl Into<String>) -> Self {
        Self {
            store,
            default_currency: default_currency.into(),
        }
    }

    /// Create a user and their wallet in a single unit of work.
    ///
    /// Either both rows exist afterwards or neither does.
    pub fn register(&self, email: &str) -> Result<Registration> {
        let user = User::new(email)?;
        let wallet = Wallet::new(user.id, &self.default_currency)?;

        let mut unit = self.store.begin()?;
        unit.insert_user(&user)?;
        unit.insert_wallet(&wallet)?;
        unit.commit()?;

        Ok(Registration { user, wallet })
    }

    /// Provision a zero-balance wallet for an owner that already exists.
    ///
    /// Store failures come back as `Error::WalletProvisioning` because the
    /// owner is left without a wallet; the caller may retry or compensate.
    pub fn create_wallet(&self, owner: OwnerId) -> Result<Wallet> {
        let wallet = Wallet::new(owner.as_uuid(), &self.default_currency)?;

        let provision = || -> Result<()> {
            let mut unit = self.store.begin()?;
            unit.insert_wallet(&wallet)?;
            unit.commit()
        };

        match provision() {
            Ok(()) => Ok(wallet),
            Err(e) if e.kind() == ErrorKind::Operational => Err(Error::WalletProvisioning {
                owner_id: owner.as_uuid(),
                reason: e.to_string(),
            }),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{FaultPoint, MemoryStore};
    use uuid::Uuid;

    fn service() -> (Arc<MemoryStore>, OnboardingService) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), OnboardingService::new(store, "usd"))
    }

    #[test]
    fn test_register_creates_user_and_wallet() {
        let (store, service) = service();
        let reg = service.register("  Alice@Example.com ").unwrap();

        assert_eq!(reg.user.email, "alice@example.com");
        assert_eq!(reg.wallet.owner_id, reg.user.id);
        assert_eq!(reg.wallet.currency, "USD");
        assert!(reg.wallet.balance.minor() == 0);

        let stored = store.get_wallet_by_owner(reg.user.id).unwrap().unwrap();
        assert_eq!(stored.id, reg.wallet.id);
        assert!(store.get_user(reg.user.id).unwrap().is_some());
    }

    #[test]
    fn test_register_duplicate_email() {
        let (store, service) = service();
        service.register("bob@example.com").unwrap();

        let err = service.register("BOB@example.com").unwrap_err();
        assert!(matches!(err, Error::EmailTaken));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.list_wallets().unwrap().len(), 1);
    }

    #[test]
    fn test_register_is_atomic() {
        let (store, service) = service();
        store.inject_fault(FaultPoint::Write);

        let err = service.register("carol@example.com").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Operational);
        assert!(store
            .find_user_by_email("carol@example.com")
            .unwrap()
            .is_none());
        assert!(store.list_wallets().unwrap().is_empty());

        store.inject_fault(FaultPoint::Commit);
        assert!(service.register("carol@example.com").is_err());
        assert!(store
            .find_user_by_email("carol@example.com")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_register_rejects_bad_email() {
        let (_store, service) = service();
        let err = service.register("not-an-email").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_create_wallet_once_per_owner() {
        let (_store, service) = service();
        let owner = OwnerId::new(Uuid::new_v4());

        let wallet = service.create_wallet(owner).unwrap();
        assert_eq!(wallet.owner_id, owner.as_uuid());
        assert_eq!(wallet.version, 0);

        let err = service.create_wallet(owner).unwrap_err();
        assert!(matches!(err, Error::WalletExists(id) if id == owner.as_uuid()));
    }

    #[test]
    fn test_create_wallet_store_failure_is_partial() {
        let (store, service) = service();
        let owner = OwnerId::new(Uuid::new_v4());
        store.inject_fault(FaultPoint::Commit);

        let err = service.create_wallet(owner).unwrap_err();
        assert!(matches!(err, Error::WalletProvisioning { owner_id, .. } if owner_id == owner.as_uuid()));
        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        assert!(store.get_wallet_by_owner(owner.as_uuid()).unwrap().is_none());

        // Retrying succeeds once the store recovers
        service.create_wallet(owner).unwrap();
    }
}
