use anchor_proofs_types::{
    AnchorBatch, AnchorId, AnchorRecord, BatchId, BatchStatus, BatchTransaction, ChainGroup,
    Hash32, Intent, IntentLeg, LegDependency, LegId, Proof, ProofId, ProofRequest, RequestId,
    RequestStatus, TargetChain, TimelineEvent, ValidatorAttestation, VerificationResult,
};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════
// ERROR TYPES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("duplicate {entity}: {id}")]
    DuplicateId { entity: &'static str, id: String },

    /// Compare-and-swap precondition did not hold
    #[error("conflicting write on {entity} {id}: expected {expected}, found {actual}")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: String,
        actual: String,
    },

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn duplicate(entity: &'static str, id: impl ToString) -> Self {
        StoreError::DuplicateId {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::SerializationError(e.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// STORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════

/// Ledger storage trait - implemented for in-memory and SQLite backends
///
/// Every write is visible to the next read on the same store.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ─── batches ────────────────────────────────────────────────────────────

    async fn create_batch(&self, batch: &AnchorBatch) -> Result<(), StoreError>;

    async fn get_batch(&self, id: BatchId) -> Result<Option<AnchorBatch>, StoreError>;

    /// Replace a batch only if its stored status still equals `expected`.
    async fn update_batch(
        &self,
        batch: &AnchorBatch,
        expected: BatchStatus,
    ) -> Result<(), StoreError>;

    async fn list_batches_by_status(
        &self,
        status: BatchStatus,
    ) -> Result<Vec<AnchorBatch>, StoreError>;

    // ─── batch transactions ─────────────────────────────────────────────────

    /// Append a member to a pending batch.
    ///
    /// Atomic with respect to `update_batch`: fails with `Conflict` unless the
    /// batch is `pending` and `tx.tree_index` equals its current member count,
    /// and with `DuplicateId` if the hash is already a member.
    async fn append_transaction(&self, tx: &BatchTransaction) -> Result<AnchorBatch, StoreError>;

    async fn update_transaction(&self, tx: &BatchTransaction) -> Result<(), StoreError>;

    async fn get_transaction(&self, id: Uuid) -> Result<Option<BatchTransaction>, StoreError>;

    /// Members of a batch in tree-index order
    async fn list_transactions(&self, batch_id: BatchId)
        -> Result<Vec<BatchTransaction>, StoreError>;

    // ─── anchors ────────────────────────────────────────────────────────────

    async fn create_anchor(&self, anchor: &AnchorRecord) -> Result<(), StoreError>;

    async fn update_anchor(&self, anchor: &AnchorRecord) -> Result<(), StoreError>;

    /// Remove an anchor record whose submission never took effect
    async fn delete_anchor(&self, id: AnchorId) -> Result<(), StoreError>;

    async fn get_anchor(&self, id: AnchorId) -> Result<Option<AnchorRecord>, StoreError>;

    async fn find_anchor(
        &self,
        chain: &TargetChain,
        anchor_tx_hash: &str,
    ) -> Result<Option<AnchorRecord>, StoreError>;

    async fn anchors_for_batch(&self, batch_id: BatchId) -> Result<Vec<AnchorRecord>, StoreError>;

    /// Anchors neither final nor invalidated, oldest first
    async fn list_unfinalized_anchors(&self) -> Result<Vec<AnchorRecord>, StoreError>;

    // ─── proofs ─────────────────────────────────────────────────────────────

    /// At most one proof per batch transaction
    async fn create_proof(&self, proof: &Proof) -> Result<(), StoreError>;

    /// Flag a proof whose anchor left the canonical chain and clear its
    /// cached `verified`. Nothing else on the row changes.
    async fn mark_proof_stale(&self, id: ProofId, at: u64) -> Result<(), StoreError>;

    /// Cache a verification outcome on a stored proof.
    ///
    /// Writes only `verified`, `verification_time`, `verification_details`
    /// and `updated_at`. `stale` is never touched, and a proof that is
    /// already stale is stored as unverified whatever `verified` says.
    async fn record_verification(
        &self,
        id: ProofId,
        verified: bool,
        at: u64,
        details: &VerificationResult,
    ) -> Result<(), StoreError>;

    async fn get_proof(&self, id: ProofId) -> Result<Option<Proof>, StoreError>;

    async fn proof_for_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<Proof>, StoreError>;

    async fn proofs_by_tx_hash(&self, tx_hash: &Hash32) -> Result<Vec<Proof>, StoreError>;

    async fn proofs_by_account(&self, account_url: &str) -> Result<Vec<Proof>, StoreError>;

    async fn proofs_by_batch(&self, batch_id: BatchId) -> Result<Vec<Proof>, StoreError>;

    async fn proofs_by_anchor(&self, anchor_id: AnchorId) -> Result<Vec<Proof>, StoreError>;

    // ─── attestations ───────────────────────────────────────────────────────

    async fn create_attestation(&self, attestation: &ValidatorAttestation)
        -> Result<(), StoreError>;

    async fn attestations_for_proof(
        &self,
        proof_id: ProofId,
    ) -> Result<Vec<ValidatorAttestation>, StoreError>;

    // ─── proof requests ─────────────────────────────────────────────────────

    async fn create_request(&self, request: &ProofRequest) -> Result<(), StoreError>;

    async fn update_request(&self, request: &ProofRequest) -> Result<(), StoreError>;

    async fn get_request(&self, id: RequestId) -> Result<Option<ProofRequest>, StoreError>;

    async fn list_requests_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<ProofRequest>, StoreError>;

    // ─── intents ────────────────────────────────────────────────────────────

    /// Persist an intent with all of its legs, edges and chain groups, or nothing.
    async fn create_intent_graph(
        &self,
        intent: &Intent,
        legs: &[IntentLeg],
        dependencies: &[LegDependency],
        groups: &[ChainGroup],
    ) -> Result<(), StoreError>;

    async fn get_intent(&self, intent_id: &str) -> Result<Option<Intent>, StoreError>;

    async fn update_intent(&self, intent: &Intent) -> Result<(), StoreError>;

    /// Intents not yet in a terminal status
    async fn list_active_intents(&self) -> Result<Vec<Intent>, StoreError>;

    async fn list_intents_by_user(&self, user_id: &str) -> Result<Vec<Intent>, StoreError>;

    async fn get_leg(&self, leg_id: LegId) -> Result<Option<IntentLeg>, StoreError>;

    async fn update_leg(&self, leg: &IntentLeg) -> Result<(), StoreError>;

    /// Legs of an intent in `leg_index` order
    async fn legs_for_intent(&self, intent_id: &str) -> Result<Vec<IntentLeg>, StoreError>;

    async fn dependencies_for_intent(
        &self,
        intent_id: &str,
    ) -> Result<Vec<LegDependency>, StoreError>;

    async fn update_dependency(&self, dependency: &LegDependency) -> Result<(), StoreError>;

    async fn chain_groups_for_intent(&self, intent_id: &str)
        -> Result<Vec<ChainGroup>, StoreError>;

    async fn update_chain_group(&self, group: &ChainGroup) -> Result<(), StoreError>;

    // ─── timeline ───────────────────────────────────────────────────────────

    async fn record_event(&self, event: &TimelineEvent) -> Result<(), StoreError>;

    /// Events of one entity in recording order
    async fn timeline(&self, entity_id: &str) -> Result<Vec<TimelineEvent>, StoreError>;

    /// Events of an intent and its legs in recording order
    async fn intent_timeline(&self, intent_id: &str) -> Result<Vec<TimelineEvent>, StoreError>;
}
