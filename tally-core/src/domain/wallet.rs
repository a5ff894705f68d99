//! Wallet domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::Money;
use super::result::{Error, Result};

/// A single owner's balance record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    /// Exactly one wallet per owner
    pub owner_id: Uuid,
    pub balance: Money,
    /// ISO 4217 currency code, normalized to uppercase, fixed at creation
    pub currency: String,
    /// Number of accepted mutations; the newest ledger entry carries this as its sequence
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a zero-balance wallet for an owner
    pub fn new(owner_id: Uuid, currency: &str) -> Result<Self> {
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            owner_id,
            balance: Money::ZERO,
            currency: Self::normalize_currency(currency)?,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Normalize and check a currency code (three ASCII letters)
    pub fn normalize_currency(currency: &str) -> Result<String> {
        let code = currency.trim().to_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::validation(format!(
                "'{}' is not an ISO 4217 currency code",
                currency.trim()
            )));
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_wallet_starts_empty() {
        let owner = Uuid::new_v4();
        let wallet = Wallet::new(owner, "usd").unwrap();
        assert_eq!(wallet.owner_id, owner);
        assert_eq!(wallet.balance, Money::ZERO);
        assert_eq!(wallet.currency, "USD");
        assert_eq!(wallet.version, 0);
    }

    #[test]
    fn test_currency_normalization() {
        assert_eq!(Wallet::normalize_currency(" eur ").unwrap(), "EUR");
        assert!(Wallet::normalize_currency("euro").is_err());
        assert!(Wallet::normalize_currency("U$D").is_err());
        assert!(Wallet::normalize_currency("").is_err());
    }
}
