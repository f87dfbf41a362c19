use anchor_proofs_anchoring::AnchoringError;
use anchor_proofs_config::ConfigError;
use anchor_proofs_orchestrator::{BuilderError, OrchestratorError};
use anchor_proofs_proof::ProofError;
use anchor_proofs_store::StoreError;
use anchor_proofs_types::{BatchId, RequestId, TargetChain};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("orchestrator wiring failed: {0}")]
    Builder(#[from] BuilderError),

    #[error("anchoring error: {0}")]
    Anchoring(#[from] AnchoringError),

    #[error("proof error: {0}")]
    Proof(#[from] ProofError),

    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("batch {batch_id} has no live anchor on {chain}")]
    NotAnchored { batch_id: BatchId, chain: TargetChain },

    #[error("proof request {request_id} cannot be fulfilled: {reason}")]
    Unfulfillable { request_id: RequestId, reason: String },
}
