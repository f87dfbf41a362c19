use anchor_proofs_anchoring::AnchoringError;
use anchor_proofs_proof::ProofError;
use anchor_proofs_store::StoreError;
use anchor_proofs_types::{IntentStatus, LegId, LegStatus};
use thiserror::Error;

use crate::graph::GraphError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid dependency graph for intent {intent_id}: {reason}")]
    InvalidDependencyGraph { intent_id: String, reason: GraphError },

    #[error("intent {intent_id} is {status}, cannot {operation}")]
    InvalidState {
        intent_id: String,
        status: IntentStatus,
        operation: &'static str,
    },

    #[error("leg {leg_id} cannot move from {from} to {to}")]
    InvalidLegTransition {
        leg_id: LegId,
        from: LegStatus,
        to: LegStatus,
    },

    #[error("intent {0} is already being run")]
    AlreadyRunning(String),

    #[error("intent not found: {0}")]
    IntentNotFound(String),

    #[error("leg not found: {0}")]
    LegNotFound(LegId),

    #[error("anchoring error: {0}")]
    Anchoring(#[from] AnchoringError),

    #[error("proof error: {0}")]
    Proof(#[from] ProofError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl OrchestratorError {
    pub fn is_invalid_graph(&self) -> bool {
        matches!(self, OrchestratorError::InvalidDependencyGraph { .. })
    }
}
