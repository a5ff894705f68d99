//! Exclusive per-wallet claims
//!
//! Units of one store claim a wallet (keyed by owner) before reading it.
//! A second unit asking for the same wallet blocks until the holder commits
//! or is dropped, so contenders queue instead of racing on the version check.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::domain::result::{Error, Result};

/// Longest a unit waits for a claimed wallet before reporting a conflict
pub const CLAIM_TIMEOUT: Duration = Duration::from_secs(30);

/// Owners whose wallet is claimed by an open unit
#[derive(Debug, Default)]
pub struct WalletClaims {
    held: Mutex<HashSet<Uuid>>,
    released: Condvar,
}

impl WalletClaims {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the wallet of `owner_id`, waiting up to `timeout` for the
    /// current holder to let go. A timeout surfaces as `Error::Conflict`.
    pub fn acquire(self: &Arc<Self>, owner_id: Uuid, timeout: Duration) -> Result<ClaimGuard> {
        let deadline = Instant::now() + timeout;
        let mut held = self
            .held
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))?;

        while held.contains(&owner_id) {
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Conflict(format!(
                    "wallet of owner {} stayed claimed for {:?}",
                    owner_id, timeout
                )));
            }
            let (guard, _) = self
                .released
                .wait_timeout(held, deadline - now)
                .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))?;
            held = guard;
        }

        held.insert(owner_id);
        Ok(ClaimGuard {
            claims: Arc::clone(self),
            owner_id,
        })
    }

    pub fn is_claimed(&self, owner_id: Uuid) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(&owner_id))
            .unwrap_or(false)
    }

    fn release(&self, owner_id: Uuid) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&owner_id);
        }
        self.released.notify_all();
    }
}

/// A held claim; dropping it wakes the waiters
#[derive(Debug)]
pub struct ClaimGuard {
    claims: Arc<WalletClaims>,
    owner_id: Uuid,
}

impl ClaimGuard {
    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.claims.release(self.owner_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn test_claim_released_on_drop() {
        let claims = WalletClaims::new();
        let owner = Uuid::new_v4();

        let guard = claims.acquire(owner, CLAIM_TIMEOUT).unwrap();
        assert!(claims.is_claimed(owner));
        assert_eq!(guard.owner_id(), owner);

        drop(guard);
        assert!(!claims.is_claimed(owner));
        claims.acquire(owner, CLAIM_TIMEOUT).unwrap();
    }

    #[test]
    fn test_different_owners_do_not_wait() {
        let claims = WalletClaims::new();
        let _a = claims.acquire(Uuid::new_v4(), CLAIM_TIMEOUT).unwrap();
        let _b = claims
            .acquire(Uuid::new_v4(), Duration::from_millis(1))
            .unwrap();
    }

    #[test]
    fn test_waiter_gets_claim_after_release() {
        let claims = WalletClaims::new();
        let owner = Uuid::new_v4();
        let guard = claims.acquire(owner, CLAIM_TIMEOUT).unwrap();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let claims = Arc::clone(&claims);
            thread::spawn(move || {
                let _guard = claims.acquire(owner, CLAIM_TIMEOUT).unwrap();
                tx.send(()).unwrap();
            })
        };

        // Still blocked while the first claim is held
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        drop(guard);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }

    #[test]
    fn test_wait_times_out_as_conflict() {
        let claims = WalletClaims::new();
        let owner = Uuid::new_v4();
        let _guard = claims.acquire(owner, CLAIM_TIMEOUT).unwrap();

        let err = claims
            .acquire(owner, Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
