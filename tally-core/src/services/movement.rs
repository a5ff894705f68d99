//! Movement service - the balance mutation protocol
//!
//! Every deposit and withdrawal runs as one unit of work: claim the wallet,
//! validate against its balance, write the new balance and append the
//! ledger entry, then commit. Concurrent movements on the same wallet queue
//! on the claim. A unit that still loses the versioned write, or times out
//! waiting for the claim, is retried from the start.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Money, MovementKind, OwnerId, Transaction};
use crate::ports::WalletStore;

/// How conflicting units are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 16,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// A policy that gives up after the first conflict
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt + 1`: exponential, capped, with up to
    /// 50% random jitter added
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let base = self
            .initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff);
        let jitter_cap = base.as_micros() as u64 / 2;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        base + Duration::from_micros(jitter)
    }
}

/// Cooperative cancellation for a movement in flight.
///
/// Clones share the same flag. A token with a deadline also counts as
/// cancelled once the deadline has passed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

/// Per-call options for a movement
#[derive(Debug, Clone, Default)]
pub struct MovementOptions {
    /// Ledger description; the kind's default when `None`
    pub description: Option<String>,
    pub cancel: CancelToken,
}

impl MovementOptions {
    pub fn with_description(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }
}

/// Outcome of an accepted movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub wallet_id: Uuid,
    pub transaction_id: Uuid,
    pub kind: MovementKind,
    pub amount: Money,
    pub balance_before: Money,
    pub new_balance: Money,
    pub sequence: u64,
    /// Attempts used, 1 when no conflict occurred
    #[serde(skip)]
    pub attempts: u32,
}

/// Service applying deposits and withdrawals
pub struct MovementService {
    store: Arc<dyn WalletStore>,
    retry: RetryPolicy,
}

impl MovementService {
    pub fn new(store: Arc<dyn WalletStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn deposit(&self, owner: OwnerId, amount: Money, options: &MovementOptions) -> Result<Receipt> {
        self.apply_movement(owner, MovementKind::Deposit, amount, options)
    }

    pub fn withdraw(&self, owner: OwnerId, amount: Money, options: &MovementOptions) -> Result<Receipt> {
        self.apply_movement(owner, MovementKind::Withdraw, amount, options)
    }

    /// Apply one movement to the owner's wallet.
    ///
    /// Either the new balance and its ledger entry are both committed, or
    /// nothing is. Waiting behind other movements on the same wallet is not
    /// a conflict. Conflicts are retried according to the retry policy and
    /// surface as `Error::Busy` once it is exhausted.
    pub fn apply_movement(
        &self,
        owner: OwnerId,
        kind: MovementKind,
        amount: Money,
        options: &MovementOptions,
    ) -> Result<Receipt> {
        if !amount.is_positive() {
            return Err(Error::invalid_amount(format!(
                "amount must be greater than zero, got {}",
                amount
            )));
        }
        let description = kind.describe(options.description.as_deref())?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(owner, kind, amount, &description, &options.cancel) {
                Err(Error::Conflict(_)) if attempt < self.retry.max_attempts => {
                    thread::sleep(self.retry.backoff(attempt));
                    options.cancel.check()?;
                }
                Err(Error::Conflict(_)) => return Err(Error::Busy { attempts: attempt }),
                Ok(mut receipt) => {
                    receipt.attempts = attempt;
                    return Ok(receipt);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn attempt(
        &self,
        owner: OwnerId,
        kind: MovementKind,
        amount: Money,
        description: &str,
        cancel: &CancelToken,
    ) -> Result<Receipt> {
        cancel.check()?;
        let mut unit = self.store.begin()?;

        let wallet = unit
            .lock_wallet(owner.as_uuid())?
            .ok_or(Error::WalletNotFound(owner.as_uuid()))?;
        cancel.check()?;

        let new_balance = kind.apply(wallet.balance, amount)?;
        let now = Utc::now();
        unit.update_balance(wallet.id, wallet.version, new_balance, now)?;
        cancel.check()?;

        let entry = Transaction::record(&wallet, kind, amount, new_balance, description, now);
        unit.append_transaction(&entry)?;
        cancel.check()?;

        unit.commit()?;

        Ok(Receipt {
            wallet_id: wallet.id,
            transaction_id: entry.id,
            kind,
            amount,
            balance_before: wallet.balance,
            new_balance,
            sequence: entry.sequence,
            attempts: 1,
        })
    }
}
