use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::batch::{BatchId, BatchType};
use crate::hash::{opt_hex32, Hash32};
use crate::proof::ProofId;

pub type RequestId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for RequestPriority {
    fn default() -> Self {
        RequestPriority::Normal
    }
}

/// Proof request lifecycle, tracked independently of the batch it lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Processing,
    Batched,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Processing => "processing",
            RequestStatus::Batched => "batched",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed)
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        match (self, next) {
            (Pending, Processing) | (Processing, Batched) | (Batched, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRequest {
    pub request_id: RequestId,
    pub request_type: BatchType,
    pub priority: RequestPriority,
    pub status: RequestStatus,

    #[serde(default, with = "opt_hex32")]
    pub tx_hash: Option<Hash32>,
    pub account_url: Option<String>,
    pub requester_id: Option<String>,

    pub batch_id: Option<BatchId>,
    pub proof_id: Option<ProofId>,

    pub retry_count: u32,
    pub error_message: Option<String>,

    pub requested_at: u64,
    pub processed_at: Option<u64>,
    pub completed_at: Option<u64>,
}
