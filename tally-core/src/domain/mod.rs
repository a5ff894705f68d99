//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

pub mod money;
mod transaction;
mod user;
mod wallet;
pub mod result;

pub use money::Money;
pub use transaction::{MovementKind, Transaction, MAX_DESCRIPTION_LEN};
pub use user::{OwnerId, User};
pub use wallet::Wallet;
