use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::anchor::{AnchorId, TargetChain};
use crate::batch::{BatchId, BatchType};
use crate::hash::{sha256_concat, Hash32};
use crate::proof::ProofId;

pub type LegId = Uuid;

// ═══════════════════════════════════════════════════════════════════════════
// STATUS ENUMS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One leg at a time in `sequence_order`
    Sequential,
    /// Every eligible leg at once
    Parallel,
    /// Concurrent, but all-or-nothing with compensation
    Atomic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Discovered,
    Processing,
    Anchoring,
    Completed,
    PartialComplete,
    Failed,
    RolledBack,
    Expired,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Discovered => "discovered",
            IntentStatus::Processing => "processing",
            IntentStatus::Anchoring => "anchoring",
            IntentStatus::Completed => "completed",
            IntentStatus::PartialComplete => "partial_complete",
            IntentStatus::Failed => "failed",
            IntentStatus::RolledBack => "rolled_back",
            IntentStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IntentStatus::Completed
                | IntentStatus::PartialComplete
                | IntentStatus::Failed
                | IntentStatus::RolledBack
                | IntentStatus::Expired
        )
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegStatus {
    Pending,
    Ready,
    Processing,
    Batched,
    Anchored,
    Confirmed,
    Executed,
    Completed,
    Failed,
    Skipped,
    /// Completed, then compensated during an atomic rollback
    RolledBack,
}

impl LegStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegStatus::Pending => "pending",
            LegStatus::Ready => "ready",
            LegStatus::Processing => "processing",
            LegStatus::Batched => "batched",
            LegStatus::Anchored => "anchored",
            LegStatus::Confirmed => "confirmed",
            LegStatus::Executed => "executed",
            LegStatus::Completed => "completed",
            LegStatus::Failed => "failed",
            LegStatus::Skipped => "skipped",
            LegStatus::RolledBack => "rolled_back",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LegStatus::Completed | LegStatus::Failed | LegStatus::Skipped | LegStatus::RolledBack
        )
    }

    /// Terminal without durable effects
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            LegStatus::Failed | LegStatus::Skipped | LegStatus::RolledBack
        )
    }

    /// Position on the happy path, used to reject backward moves
    fn rank(&self) -> u8 {
        match self {
            LegStatus::Pending => 0,
            LegStatus::Ready => 1,
            LegStatus::Processing => 2,
            LegStatus::Batched => 3,
            LegStatus::Anchored => 4,
            LegStatus::Confirmed => 5,
            LegStatus::Executed => 6,
            LegStatus::Completed => 7,
            LegStatus::Failed | LegStatus::Skipped | LegStatus::RolledBack => 8,
        }
    }

    pub fn can_transition_to(&self, next: LegStatus) -> bool {
        match (self, next) {
            (LegStatus::Completed, LegStatus::RolledBack) => true,
            (from, _) if from.is_terminal() => false,
            (_, LegStatus::Failed | LegStatus::Skipped) => true,
            (_, LegStatus::RolledBack) => false,
            (from, to) => to.rank() == from.rank() + 1,
        }
    }
}

impl fmt::Display for LegStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegRole {
    Source,
    Destination,
    Intermediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyCondition {
    /// Upstream leg reached `completed`
    Success,
    /// Upstream leg reached any terminal state
    Completion,
    /// Upstream leg's anchor reached its required confirmations
    Confirmation,
}

// ═══════════════════════════════════════════════════════════════════════════
// STORED ENTITIES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub intent_id: String,
    pub operation_id: String,
    pub user_id: Option<String>,
    pub account_url: Option<String>,

    pub execution_mode: ExecutionMode,
    pub proof_class: BatchType,
    pub status: IntentStatus,

    pub leg_count: u32,
    pub legs_completed: u32,
    pub legs_failed: u32,
    pub legs_pending: u32,
    /// Highest `sequence_order` dispatched so far
    pub current_leg_index: u32,

    #[serde(default)]
    pub intent_data: serde_json::Value,
    pub error_message: Option<String>,

    pub created_at: u64,
    pub updated_at: u64,
    pub completed_at: Option<u64>,
    pub expires_at: Option<u64>,
}

impl Intent {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentLeg {
    pub leg_id: LegId,
    pub intent_id: String,
    /// Caller-chosen key, unique within the intent
    pub key: String,
    pub leg_index: u32,

    pub target_chain: TargetChain,
    pub role: LegRole,
    pub sequence_order: u32,

    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub amount: Option<Decimal>,
    pub token_symbol: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,

    pub status: LegStatus,

    pub execution_tx_hash: Option<String>,
    pub execution_block: Option<u64>,
    pub execution_error: Option<String>,

    pub batch_id: Option<BatchId>,
    pub anchor_id: Option<AnchorId>,
    pub proof_id: Option<ProofId>,

    pub retry_count: u32,
    pub max_retries: u32,
    pub last_retry_at: Option<u64>,

    pub created_at: u64,
    pub updated_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
}

impl IntentLeg {
    /// Hash committed into the chain group's batch for this leg
    pub fn commitment_hash(&self) -> Hash32 {
        let payload = serde_json::to_vec(&self.payload).unwrap_or_default();
        sha256_concat(&[
            self.intent_id.as_bytes(),
            self.leg_id.as_bytes(),
            self.target_chain.as_str().as_bytes(),
            &payload,
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegDependency {
    pub dependency_id: Uuid,
    pub intent_id: String,
    pub leg_id: LegId,
    pub depends_on_leg_id: LegId,
    pub condition: DependencyCondition,
    /// Set exactly once, when the upstream leg satisfies the condition
    pub is_satisfied: bool,
    pub satisfied_at: Option<u64>,
    pub created_at: u64,
}

/// Legs of one intent that share a target chain, anchored in one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainGroup {
    pub group_id: Uuid,
    pub intent_id: String,
    pub target_chain: TargetChain,
    pub leg_ids: Vec<LegId>,
    pub status: LegStatus,

    pub batch_id: Option<BatchId>,
    pub anchor_id: Option<AnchorId>,
    pub anchor_tx_hash: Option<String>,

    pub created_at: u64,
    pub anchored_at: Option<u64>,
    pub completed_at: Option<u64>,
}

// ═══════════════════════════════════════════════════════════════════════════
// DISCOVERY INPUT
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIntent {
    pub intent_id: String,
    pub operation_id: String,
    pub user_id: Option<String>,
    pub account_url: Option<String>,
    pub execution_mode: ExecutionMode,
    pub proof_class: BatchType,
    #[serde(default)]
    pub intent_data: serde_json::Value,
    pub expires_at: Option<u64>,
}

impl NewIntent {
    pub fn new(intent_id: impl Into<String>, execution_mode: ExecutionMode) -> Self {
        let intent_id = intent_id.into();
        Self {
            operation_id: intent_id.clone(),
            intent_id,
            user_id: None,
            account_url: None,
            execution_mode,
            proof_class: BatchType::OnDemand,
            intent_data: serde_json::Value::Null,
            expires_at: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_proof_class(mut self, proof_class: BatchType) -> Self {
        self.proof_class = proof_class;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLeg {
    pub key: String,
    pub target_chain: TargetChain,
    pub role: LegRole,
    pub sequence_order: u32,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub amount: Option<Decimal>,
    pub token_symbol: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Falls back to the orchestrator's default
    pub max_retries: Option<u32>,
}

impl NewLeg {
    pub fn new(key: impl Into<String>, target_chain: TargetChain, sequence_order: u32) -> Self {
        Self {
            key: key.into(),
            target_chain,
            role: LegRole::Intermediate,
            sequence_order,
            from_address: None,
            to_address: None,
            amount: None,
            token_symbol: None,
            payload: serde_json::Value::Null,
            max_retries: None,
        }
    }

    pub fn with_role(mut self, role: LegRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_transfer(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        amount: Decimal,
        token: impl Into<String>,
    ) -> Self {
        self.from_address = Some(from.into());
        self.to_address = Some(to.into());
        self.amount = Some(amount);
        self.token_symbol = Some(token.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Declared edge: `leg` waits on `depends_on`, both addressed by intent and key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDependency {
    pub intent_id: String,
    pub leg: String,
    pub depends_on_intent_id: String,
    pub depends_on: String,
    pub condition: DependencyCondition,
}

impl NewDependency {
    pub fn within(
        intent_id: impl Into<String>,
        leg: impl Into<String>,
        depends_on: impl Into<String>,
        condition: DependencyCondition,
    ) -> Self {
        let intent_id = intent_id.into();
        Self {
            depends_on_intent_id: intent_id.clone(),
            intent_id,
            leg: leg.into(),
            depends_on: depends_on.into(),
            condition,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// QUERY VIEWS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentLegProgress {
    pub intent_id: String,
    pub status: IntentStatus,
    pub leg_count: u32,
    pub legs_completed: u32,
    pub legs_failed: u32,
    pub legs_pending: u32,
    pub current_leg_index: u32,
    pub progress_percent: f64,
}

impl IntentLegProgress {
    pub fn from_intent(intent: &Intent) -> Self {
        let done = intent.legs_completed + intent.legs_failed;
        let progress_percent = if intent.leg_count == 0 {
            0.0
        } else {
            f64::from(done) * 100.0 / f64::from(intent.leg_count)
        };
        Self {
            intent_id: intent.intent_id.clone(),
            status: intent.status,
            leg_count: intent.leg_count,
            legs_completed: intent.legs_completed,
            legs_failed: intent.legs_failed,
            legs_pending: intent.legs_pending,
            current_leg_index: intent.current_leg_index,
            progress_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentLegSummary {
    pub intent: Intent,
    pub legs: Vec<IntentLeg>,
    pub chain_groups: Vec<ChainGroup>,
    pub dependencies: Vec<LegDependency>,
}
