//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the durable WalletStore
//! - An in-memory WalletStore with fault injection, for tests and embedding
//!
//! Both share [`claims::WalletClaims`] for exclusive per-wallet claims.

pub mod claims;
pub mod duckdb;
pub mod memory;
