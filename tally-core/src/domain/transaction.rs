//! Ledger entry domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::Money;
use super::result::{Error, Result};
use super::wallet::Wallet;

/// Longest description accepted for a ledger entry, in characters
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// Direction of a balance movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Deposit,
    Withdraw,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Deposit => "deposit",
            MovementKind::Withdraw => "withdraw",
        }
    }

    pub fn default_description(&self) -> &'static str {
        match self {
            MovementKind::Deposit => "User deposit",
            MovementKind::Withdraw => "User withdrawal",
        }
    }

    /// Compute the balance after moving `amount`.
    ///
    /// `amount` must already be known positive; withdrawals may not take the
    /// balance below zero.
    pub fn apply(&self, balance: Money, amount: Money) -> Result<Money> {
        match self {
            MovementKind::Deposit => balance.checked_add(amount).ok_or_else(|| {
                Error::invalid_amount(format!("depositing {} would overflow the balance", amount))
            }),
            MovementKind::Withdraw => {
                if amount > balance {
                    return Err(Error::InsufficientFunds {
                        balance,
                        requested: amount,
                    });
                }
                balance
                    .checked_sub(amount)
                    .ok_or_else(|| Error::invalid_amount(format!("cannot withdraw {}", amount)))
            }
        }
    }

    /// Pick the description for an entry: the caller's text, or the default
    pub fn describe(&self, description: Option<&str>) -> Result<String> {
        match description.map(str::trim) {
            None => Ok(self.default_description().to_string()),
            Some("") => Err(Error::validation("description cannot be empty")),
            Some(text) if text.chars().count() > MAX_DESCRIPTION_LEN => Err(Error::validation(
                format!("description exceeds {} characters", MAX_DESCRIPTION_LEN),
            )),
            Some(text) => Ok(text.to_string()),
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "deposit" => Ok(MovementKind::Deposit),
            "withdraw" | "withdrawal" => Ok(MovementKind::Withdraw),
            other => Err(Error::validation(format!(
                "invalid transaction type '{}'",
                other
            ))),
        }
    }
}

/// An immutable ledger entry recording one accepted movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub kind: MovementKind,
    pub amount: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    pub description: String,
    /// Wallet version produced by this entry (1-based, gap-free per wallet)
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Build the entry for a movement applied to `wallet` as it was read
    pub fn record(
        wallet: &Wallet,
        kind: MovementKind,
        amount: Money,
        balance_after: Money,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_id: wallet.id,
            kind,
            amount,
            balance_before: wallet.balance,
            balance_after,
            description: description.into(),
            sequence: wallet.version + 1,
            created_at,
        }
    }

    /// Check the before/after equation for this entry
    pub fn is_consistent(&self) -> bool {
        if !self.amount.is_positive() || self.balance_after.is_negative() {
            return false;
        }
        let expected = match self.kind {
            MovementKind::Deposit => self.balance_before.checked_add(self.amount),
            MovementKind::Withdraw => self.balance_before.checked_sub(self.amount),
        };
        expected == Some(self.balance_after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet_with(balance: i64, version: u64) -> Wallet {
        let mut wallet = Wallet::new(Uuid::new_v4(), "USD").unwrap();
        wallet.balance = Money::from_minor(balance);
        wallet.version = version;
        wallet
    }

    #[test]
    fn test_deposit_adds() {
        let after = MovementKind::Deposit
            .apply(Money::ZERO, Money::from_minor(10_000))
            .unwrap();
        assert_eq!(after, Money::from_minor(10_000));
    }

    #[test]
    fn test_withdraw_to_exactly_zero() {
        let after = MovementKind::Withdraw
            .apply(Money::from_minor(6_000), Money::from_minor(6_000))
            .unwrap();
        assert_eq!(after, Money::ZERO);
    }

    #[test]
    fn test_withdraw_more_than_balance() {
        let err = MovementKind::Withdraw
            .apply(Money::from_minor(6_000), Money::from_minor(100_000))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientFunds { balance, requested }
                if balance == Money::from_minor(6_000) && requested == Money::from_minor(100_000)
        ));
    }

    #[test]
    fn test_deposit_overflow() {
        let err = MovementKind::Deposit
            .apply(Money::from_minor(i64::MAX), Money::from_minor(1))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Deposit".parse::<MovementKind>().unwrap(), MovementKind::Deposit);
        assert_eq!("withdrawal".parse::<MovementKind>().unwrap(), MovementKind::Withdraw);
        assert!("transfer".parse::<MovementKind>().is_err());
    }

    #[test]
    fn test_describe() {
        assert_eq!(MovementKind::Deposit.describe(None).unwrap(), "User deposit");
        assert_eq!(MovementKind::Withdraw.describe(None).unwrap(), "User withdrawal");
        assert_eq!(
            MovementKind::Deposit.describe(Some("  payday ")).unwrap(),
            "payday"
        );
        assert!(MovementKind::Deposit.describe(Some("   ")).is_err());
        let long = "x".repeat(MAX_DESCRIPTION_LEN + 1);
        assert!(MovementKind::Deposit.describe(Some(&long)).is_err());
    }

    #[test]
    fn test_record_carries_before_and_sequence() {
        let wallet = wallet_with(10_000, 1);
        let tx = Transaction::record(
            &wallet,
            MovementKind::Withdraw,
            Money::from_minor(4_000),
            Money::from_minor(6_000),
            "User withdrawal",
            Utc::now(),
        );
        assert_eq!(tx.wallet_id, wallet.id);
        assert_eq!(tx.balance_before, Money::from_minor(10_000));
        assert_eq!(tx.sequence, 2);
        assert!(tx.is_consistent());
    }

    #[test]
    fn test_inconsistent_entry_detected() {
        let wallet = wallet_with(10_000, 0);
        let mut tx = Transaction::record(
            &wallet,
            MovementKind::Deposit,
            Money::from_minor(500),
            Money::from_minor(10_500),
            "User deposit",
            Utc::now(),
        );
        assert!(tx.is_consistent());
        tx.balance_after = Money::from_minor(10_400);
        assert!(!tx.is_consistent());
    }
}
