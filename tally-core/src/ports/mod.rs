//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. Services depend
//! only on these traits and receive a concrete store at construction.

mod store;

pub use store::{LedgerSnapshot, UnitOfWork, WalletStore};
