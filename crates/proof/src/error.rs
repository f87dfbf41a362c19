use anchor_proofs_store::StoreError;
use anchor_proofs_types::{
    AnchorId, BatchId, BatchStatus, ProofId, RequestId, RequestStatus, TargetChain,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProofError {
    #[error("batch {batch_id} is {status}, proofs need an anchored batch")]
    BatchNotAnchored {
        batch_id: BatchId,
        status: BatchStatus,
    },

    #[error("anchor {anchor_id} does not belong to batch {batch_id}")]
    AnchorMismatch { anchor_id: AnchorId, batch_id: BatchId },

    #[error("anchor {anchor_id} is not final")]
    AnchorNotFinal { anchor_id: AnchorId },

    #[error("no usable anchor for batch {batch_id} on {chain}")]
    NoAnchor { batch_id: BatchId, chain: TargetChain },

    #[error("batch {batch_id} has no merkle root")]
    MissingRoot { batch_id: BatchId },

    #[error("batch not found: {0}")]
    BatchNotFound(BatchId),

    #[error("batch transaction not found: {0}")]
    TransactionNotFound(Uuid),

    #[error("proof not found: {0}")]
    ProofNotFound(ProofId),

    #[error("proof {0} was invalidated by a reorg")]
    StaleProof(ProofId),

    #[error("proof request not found: {0}")]
    RequestNotFound(RequestId),

    #[error("proof request {request_id} cannot move from {from} to {to}")]
    InvalidRequestTransition {
        request_id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("proof request needs a transaction hash or an account")]
    EmptyRequest,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
