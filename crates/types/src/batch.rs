use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::hash::{hex32, opt_hex32, vec_hex32, Hash32};
use crate::proof::{GovernanceProof, StateProof};

pub type BatchId = Uuid;

/// How a batch is scheduled for anchoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchType {
    /// Closed on a regular cadence, cheaper per transaction
    OnCadence,
    /// Closed as soon as requested, faster but more expensive
    OnDemand,
}

impl BatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchType::OnCadence => "on_cadence",
            BatchType::OnDemand => "on_demand",
        }
    }
}

/// Lifecycle state of an anchor batch
///
/// `Pending -> Closed -> Anchoring -> Anchored -> Confirmed`, with `Failed`
/// reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Closed,
    Anchoring,
    Anchored,
    Confirmed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Closed => "closed",
            BatchStatus::Anchoring => "anchoring",
            BatchStatus::Anchored => "anchored",
            BatchStatus::Confirmed => "confirmed",
            BatchStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Confirmed | BatchStatus::Failed)
    }

    /// True once the batch's anchor has been observed on chain
    pub fn is_anchored(&self) -> bool {
        matches!(self, BatchStatus::Anchored | BatchStatus::Confirmed)
    }

    /// Whether moving from `self` to `next` is a legal forward step
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        match (self, next) {
            (Pending, Closed)
            | (Closed, Anchoring)
            | (Anchoring, Anchored)
            | (Anchored, Confirmed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A group of transactions committed together under one Merkle root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorBatch {
    pub batch_id: BatchId,
    pub batch_type: BatchType,
    pub status: BatchStatus,

    /// Member transaction hashes in insertion order (leaf order)
    #[serde(with = "vec_hex32")]
    pub transactions: Vec<Hash32>,

    /// Set exactly when the batch is closed
    #[serde(default, with = "opt_hex32")]
    pub merkle_root: Option<Hash32>,

    pub validator_id: String,
    pub error_message: Option<String>,

    pub created_at: u64,
    pub updated_at: u64,
    pub closed_at: Option<u64>,
}

impl AnchorBatch {
    pub fn new(batch_type: BatchType, validator_id: impl Into<String>, now: u64) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            batch_type,
            status: BatchStatus::Pending,
            transactions: Vec::new(),
            merkle_root: None,
            validator_id: validator_id.into(),
            error_message: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Seconds since the batch was opened
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }
}

/// Which side of the running hash a sibling sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathSide {
    Left,
    Right,
}

/// One step of a Merkle inclusion path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePathNode {
    #[serde(with = "hex32")]
    pub hash: Hash32,
    pub position: PathSide,
}

impl MerklePathNode {
    pub fn new(hash: Hash32, position: PathSide) -> Self {
        Self { hash, position }
    }
}

/// A transaction admitted into a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTransaction {
    pub id: Uuid,
    pub batch_id: BatchId,

    /// Leaf position, unique within the batch
    pub tree_index: u32,

    #[serde(with = "hex32")]
    pub tx_hash: Hash32,
    pub account_url: String,

    /// Populated when the batch closes
    #[serde(default)]
    pub merkle_path: Vec<MerklePathNode>,

    pub state_proof: Option<StateProof>,
    pub governance_proof: Option<GovernanceProof>,

    // Intent linkage, when the transaction is a leg commitment
    pub intent_id: Option<String>,
    pub leg_id: Option<Uuid>,

    pub created_at: u64,
}

/// Caller-supplied content of a transaction being added to a batch
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub tx_hash: Hash32,
    pub account_url: String,
    pub state_proof: Option<StateProof>,
    pub governance_proof: Option<GovernanceProof>,
    pub intent_id: Option<String>,
    pub leg_id: Option<Uuid>,
}

impl NewTransaction {
    pub fn new(tx_hash: Hash32, account_url: impl Into<String>) -> Self {
        Self {
            tx_hash,
            account_url: account_url.into(),
            state_proof: None,
            governance_proof: None,
            intent_id: None,
            leg_id: None,
        }
    }

    pub fn with_state_proof(mut self, proof: StateProof) -> Self {
        self.state_proof = Some(proof);
        self
    }

    pub fn with_governance_proof(mut self, proof: GovernanceProof) -> Self {
        self.governance_proof = Some(proof);
        self
    }

    pub fn with_intent(mut self, intent_id: impl Into<String>, leg_id: Uuid) -> Self {
        self.intent_id = Some(intent_id.into());
        self.leg_id = Some(leg_id);
        self
    }

    /// Materialize as the member at `tree_index` of `batch_id`
    pub fn into_transaction(self, batch_id: BatchId, tree_index: u32, now: u64) -> BatchTransaction {
        BatchTransaction {
            id: Uuid::new_v4(),
            batch_id,
            tree_index,
            tx_hash: self.tx_hash,
            account_url: self.account_url,
            merkle_path: Vec::new(),
            state_proof: self.state_proof,
            governance_proof: self.governance_proof,
            intent_id: self.intent_id,
            leg_id: self.leg_id,
            created_at: now,
        }
    }
}
