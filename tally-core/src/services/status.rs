//! Status service - wallet and ledger summaries

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::domain::Money;
use crate::ports::WalletStore;

/// Status service for store-wide summaries
pub struct StatusService {
    store: Arc<dyn WalletStore>,
}

impl StatusService {
    pub fn new(store: Arc<dyn WalletStore>) -> Self {
        Self { store }
    }

    /// Get overall status summary
    pub fn get_status(&self) -> Result<StatusSummary> {
        let snapshot = self.store.ledger_snapshot()?;
        let wallets = snapshot.wallets;
        let transactions = snapshot.transactions;

        let mut totals: BTreeMap<String, Money> = BTreeMap::new();
        for wallet in &wallets {
            let total = totals.entry(wallet.currency.clone()).or_insert(Money::ZERO);
            *total = total.checked_add(wallet.balance).ok_or_else(|| {
                Error::database(format!("{} total overflows", wallet.currency))
            })?;
        }

        let latest = transactions.iter().map(|t| t.created_at).max();

        Ok(StatusSummary {
            total_wallets: wallets.len() as i64,
            total_transactions: transactions.len() as i64,
            total_balance_by_currency: totals,
            last_activity: latest.map(|t| t.to_rfc3339()),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub total_wallets: i64,
    pub total_transactions: i64,
    pub total_balance_by_currency: BTreeMap<String, Money>,
    pub last_activity: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::services::{MovementOptions, MovementService, OnboardingService, RetryPolicy};

    #[test]
    fn test_status_totals() {
        let store = Arc::new(MemoryStore::new());
        let usd = OnboardingService::new(store.clone(), "USD");
        let eur = OnboardingService::new(store.clone(), "EUR");
        let movements = MovementService::new(store.clone(), RetryPolicy::default());
        let opts = MovementOptions::default();

        for (service, email, minor) in [
            (&usd, "a@example.com", 1_000),
            (&usd, "b@example.com", 250),
            (&eur, "c@example.com", 75),
        ] {
            let reg = service.register(email).unwrap();
            movements
                .deposit(reg.user.owner_id(), Money::from_minor(minor), &opts)
                .unwrap();
        }

        let status = StatusService::new(store).get_status().unwrap();
        assert_eq!(status.total_wallets, 3);
        assert_eq!(status.total_transactions, 3);
        assert_eq!(status.total_balance_by_currency["USD"], Money::from_minor(1_250));
        assert_eq!(status.total_balance_by_currency["EUR"], Money::from_minor(75));
        assert!(status.last_activity.is_some());
    }

    #[test]
    fn test_status_empty() {
        let status = StatusService::new(Arc::new(MemoryStore::new()))
            .get_status()
            .unwrap();
        assert_eq!(status.total_wallets, 0);
        assert!(status.total_balance_by_currency.is_empty());
        assert!(status.last_activity.is_none());
    }
}
