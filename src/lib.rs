//! Proof assembly and anchoring engine
//!
//! Transactions are committed into Merkle batches, batch roots are anchored
//! on external chains, and once an anchor is final every member transaction
//! gets a four-component proof (inclusion, anchor reference, state proof,
//! governance proof). Multi-leg intents are orchestrated across chains on
//! top of the same pipeline.
//!
//! [`ProofEngine`] wires every component from one [`AppConfig`]; the member
//! crates are re-exported for callers that need them individually.

mod engine;
mod error;
pub mod settings;

pub use engine::ProofEngine;
pub use error::EngineError;

pub use anchor_proofs_anchoring as anchoring;
pub use anchor_proofs_chain as chain;
pub use anchor_proofs_config as config;
pub use anchor_proofs_merkle as merkle;
pub use anchor_proofs_metrics as metrics;
pub use anchor_proofs_orchestrator as orchestrator;
pub use anchor_proofs_proof as proof;
pub use anchor_proofs_retry as retry;
pub use anchor_proofs_store as store;
pub use anchor_proofs_types as types;

pub use anchor_proofs_config::AppConfig;

use std::path::Path;

use anyhow::Context;

/// Load a config file with `ANCHOR_PROOFS_*` overrides and validate it
pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let config = config::ConfigLoader::from_file_with_env(path, config::ENV_PREFIX)
        .with_context(|| format!("loading {}", path.display()))?;
    config::validate_config(&config).context("validating configuration")?;
    Ok(config)
}

/// Open the SQLite store a configuration names
pub async fn open_sqlite(config: &AppConfig) -> anyhow::Result<store::SqliteStore> {
    let database = &config.database;
    store::SqliteStore::connect(&database.url, database.max_connections)
        .await
        .with_context(|| format!("connecting to {}", database.url))
}
