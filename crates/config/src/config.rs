//! Core configuration structures for the proof engine

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Service identity and logging
    #[serde(default)]
    pub service: ServiceConfig,

    /// Ledger store connection
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Batch closing thresholds
    #[serde(default)]
    pub batching: BatchingConfig,

    /// Anchoring targets by chain key (e.g. "ethereum")
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,

    /// Backoff for anchor submission and leg execution
    #[serde(default)]
    pub retry: RetryConfig,

    /// Intent orchestration defaults
    #[serde(default)]
    pub intents: IntentConfig,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Mainnet,
    Testnet,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_environment")]
    pub environment: Environment,

    /// Identity stamped on batches, proofs and attestations
    pub validator_id: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Version string recorded on every assembled proof
    #[serde(default = "default_proof_version")]
    pub proof_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection URL; empty selects the in-memory store
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Refuse to start without a persistent store
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// Count ceiling for scheduled batches
    #[serde(default = "default_max_transactions")]
    pub max_transactions: usize,

    /// Time-in-pending ceiling
    #[serde(default = "default_max_batch_age_secs")]
    pub max_batch_age_secs: u64,

    /// Count ceiling for on-demand batches
    #[serde(default = "default_on_demand_max_transactions")]
    pub on_demand_max_transactions: usize,
}

/// One anchoring target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Network the observer talks to (e.g. "mainnet", "sepolia")
    pub network_name: String,

    /// Numeric chain id, for EVM targets
    #[serde(default)]
    pub chain_id: Option<u64>,

    /// Depth at which an anchor becomes final
    #[serde(default = "default_required_confirmations")]
    pub required_confirmations: u64,

    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,

    #[serde(default = "default_submission_retries")]
    pub submission_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    /// Executor retries for legs that do not set their own
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Deadline applied to intents discovered without one
    #[serde(default = "default_deadline_secs")]
    pub default_deadline_secs: Option<u64>,
}

// Default value functions
fn default_environment() -> Environment {
    Environment::Local
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_proof_version() -> String {
    "1.0".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_max_transactions() -> usize {
    1000
}

fn default_max_batch_age_secs() -> u64 {
    900 // 15 minutes
}

fn default_on_demand_max_transactions() -> usize {
    1
}

fn default_required_confirmations() -> u64 {
    6
}

fn default_confirmation_timeout_secs() -> u64 {
    3600 // 1 hour
}

fn default_submission_retries() -> u32 {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_deadline_secs() -> Option<u64> {
    Some(3600)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            validator_id: String::new(),
            log_level: default_log_level(),
            metrics_enabled: default_true(),
            proof_version: default_proof_version(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            required: false,
        }
    }
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_transactions: default_max_transactions(),
            max_batch_age_secs: default_max_batch_age_secs(),
            on_demand_max_transactions: default_on_demand_max_transactions(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            network_name: String::new(),
            chain_id: None,
            required_confirmations: default_required_confirmations(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            submission_retries: default_submission_retries(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            default_max_retries: default_max_retries(),
            default_deadline_secs: default_deadline_secs(),
        }
    }
}
