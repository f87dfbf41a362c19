use anchor_proofs_chain::ChainError;
use anchor_proofs_merkle::MerkleError;
use anchor_proofs_store::StoreError;
use anchor_proofs_types::{AnchorId, BatchId, BatchStatus, TargetChain};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnchoringError {
    #[error("cannot {operation} batch {batch_id} in status {status}")]
    InvalidState {
        batch_id: BatchId,
        status: BatchStatus,
        operation: &'static str,
    },

    #[error("batch {batch_id} has no transactions")]
    EmptyBatch { batch_id: BatchId },

    #[error("transaction {tx_hash} already in batch {batch_id}")]
    DuplicateTransaction { batch_id: BatchId, tx_hash: String },

    #[error("batch not found: {0}")]
    BatchNotFound(BatchId),

    #[error("anchor not found: {0}")]
    AnchorNotFound(AnchorId),

    #[error("reorg on {chain} invalidated anchor {anchor_id} of batch {batch_id}")]
    ReorgDetected {
        anchor_id: AnchorId,
        batch_id: BatchId,
        chain: TargetChain,
    },

    #[error("timed out after {waited_secs}s waiting on {entity_id}")]
    Timeout { entity_id: String, waited_secs: u64 },

    #[error("anchoring batch {batch_id} on {chain} failed after {attempts} attempts: {reason}")]
    SubmissionFailed {
        batch_id: BatchId,
        chain: TargetChain,
        attempts: u32,
        reason: String,
    },

    #[error("no anchoring settings for chain {0}")]
    UnconfiguredChain(TargetChain),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("merkle error: {0}")]
    Merkle(#[from] MerkleError),
}

impl AnchoringError {
    /// Lifecycle violations the caller can resolve by retrying in a valid state
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, AnchoringError::InvalidState { .. })
    }
}
