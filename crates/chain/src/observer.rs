use anchor_proofs_types::{Hash32, TargetChain};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("anchor submission failed on {chain}: {reason}")]
    SubmissionFailed { chain: TargetChain, reason: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("no observer registered for chain {0}")]
    UnknownChain(TargetChain),

    #[error("transaction {tx_hash} not found on {chain}")]
    TransactionNotFound { chain: TargetChain, tx_hash: String },
}

impl ChainError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::ConnectionFailed(_)
                | ChainError::QueryFailed(_)
                | ChainError::SubmissionFailed { .. }
                | ChainError::Timeout(_)
        )
    }
}

/// Confirmation depth of one transaction as seen by an observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationStatus {
    pub block_height: u64,
    pub confirmations: u64,
}

/// Pushed by an observer when an anchor transaction gains depth
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationUpdate {
    pub chain: TargetChain,
    pub anchor_tx_hash: String,
    pub block_height: u64,
    pub confirmations: u64,
}

/// Pushed by an observer when a previously included anchor left the canonical chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorgNotice {
    pub chain: TargetChain,
    pub anchor_tx_hash: String,
    pub detected_at_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObserverMessage {
    Confirmation(ConfirmationUpdate),
    Reorg(ReorgNotice),
}

/// Read and write access to external chains for anchoring
#[async_trait]
pub trait ChainObserver: Send + Sync {
    async fn is_connected(&self) -> bool;

    /// Block height the transaction was included at and its current depth
    async fn get_confirmations(
        &self,
        chain: &TargetChain,
        tx_hash: &str,
    ) -> Result<ConfirmationStatus, ChainError>;

    /// Write a Merkle root to `chain`, returning the submission tx hash
    async fn submit_anchor(&self, chain: &TargetChain, merkle_root: &Hash32)
        -> Result<String, ChainError>;

    async fn latest_height(&self, chain: &TargetChain) -> Result<u64, ChainError>;
}
