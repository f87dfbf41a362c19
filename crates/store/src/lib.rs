//! Ledger data store
//!
//! Persists batches, batch transactions, anchor records, proofs,
//! attestations, proof requests, intents and their timeline behind the
//! [`LedgerStore`] trait.

pub mod memory;
pub mod sqlite;
pub mod store;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use store::{LedgerStore, StoreError};
