use anchor_proofs_merkle::build_tree;
use anchor_proofs_metrics::MetricsCollector;
use anchor_proofs_store::{LedgerStore, StoreError};
use anchor_proofs_types::{
    current_timestamp, AnchorBatch, AnchorRecord, BatchId, BatchStatus, BatchTransaction,
    BatchType, EntityKind, NewTransaction, TargetChain, TimelineEvent,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::AnchoringError;
use crate::locks::KeyedLocks;

// ═══════════════════════════════════════════════════════════════════════════
// CLOSE POLICY
// ═══════════════════════════════════════════════════════════════════════════

/// Count-or-age rule selecting pending batches for closing
#[derive(Debug, Clone)]
pub struct BatchPolicy {
    /// Transaction ceiling for scheduled batches
    pub max_transactions: usize,

    /// Seconds a batch may stay pending
    pub max_batch_age_secs: u64,

    /// Transaction ceiling for on-demand batches
    pub on_demand_max_transactions: usize,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            max_transactions: 1000,
            max_batch_age_secs: 900, // 15 minutes
            on_demand_max_transactions: 1,
        }
    }
}

impl BatchPolicy {
    pub fn ceiling(&self, batch_type: BatchType) -> usize {
        match batch_type {
            BatchType::OnCadence => self.max_transactions,
            BatchType::OnDemand => self.on_demand_max_transactions,
        }
    }

    /// Whichever ceiling is hit first. Empty batches are never due.
    pub fn should_close(&self, batch: &AnchorBatch, now: u64) -> bool {
        if batch.status != BatchStatus::Pending || batch.transactions.is_empty() {
            return false;
        }
        batch.transaction_count() >= self.ceiling(batch.batch_type)
            || batch.age(now) >= self.max_batch_age_secs
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// MANAGER
// ═══════════════════════════════════════════════════════════════════════════

/// Owns the batch state machine
///
/// Mutations of one batch are serialized by a per-batch lock, and every
/// status write is a compare-and-swap on the previous status, so appends
/// racing a close are rejected rather than lost.
pub struct BatchManager<S: LedgerStore> {
    store: Arc<S>,
    policy: BatchPolicy,
    validator_id: String,
    metrics: Arc<MetricsCollector>,
    locks: KeyedLocks<BatchId>,
}

impl<S: LedgerStore> BatchManager<S> {
    pub fn new(
        store: Arc<S>,
        policy: BatchPolicy,
        validator_id: impl Into<String>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            policy,
            validator_id: validator_id.into(),
            metrics,
            locks: KeyedLocks::new(),
        }
    }

    pub fn policy(&self) -> &BatchPolicy {
        &self.policy
    }

    pub fn validator_id(&self) -> &str {
        &self.validator_id
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn get_batch(&self, batch_id: BatchId) -> Result<AnchorBatch, AnchoringError> {
        self.store
            .get_batch(batch_id)
            .await?
            .ok_or(AnchoringError::BatchNotFound(batch_id))
    }

    /// Members of a batch in tree-index order
    pub async fn transactions(
        &self,
        batch_id: BatchId,
    ) -> Result<Vec<BatchTransaction>, AnchoringError> {
        Ok(self.store.list_transactions(batch_id).await?)
    }

    /// Create an empty pending batch
    pub async fn open_batch(&self, batch_type: BatchType) -> Result<AnchorBatch, AnchoringError> {
        let now = current_timestamp();
        let batch = AnchorBatch::new(batch_type, self.validator_id.clone(), now);
        self.store.create_batch(&batch).await?;
        self.record(&batch, None, None).await?;
        self.metrics.record_batch_opened(batch_type);

        info!(
            batch_id = %batch.batch_id,
            batch_type = batch_type.as_str(),
            "Batch opened"
        );
        Ok(batch)
    }

    /// Append a transaction at the next tree index
    pub async fn add_transaction(
        &self,
        batch_id: BatchId,
        new_tx: NewTransaction,
    ) -> Result<BatchTransaction, AnchoringError> {
        let _guard = self.locks.lock(&batch_id).await;
        let batch = self.get_batch(batch_id).await?;

        if batch.status != BatchStatus::Pending {
            return Err(AnchoringError::InvalidState {
                batch_id,
                status: batch.status,
                operation: "add transaction to",
            });
        }
        if batch.transactions.contains(&new_tx.tx_hash) {
            return Err(AnchoringError::DuplicateTransaction {
                batch_id,
                tx_hash: hex::encode(new_tx.tx_hash),
            });
        }

        let tree_index = batch.transactions.len() as u32;
        let tx = new_tx.into_transaction(batch_id, tree_index, current_timestamp());

        match self.store.append_transaction(&tx).await {
            Ok(_) => {}
            Err(StoreError::DuplicateId { .. }) => {
                return Err(AnchoringError::DuplicateTransaction {
                    batch_id,
                    tx_hash: hex::encode(tx.tx_hash),
                });
            }
            Err(e) if e.is_conflict() => {
                return Err(self.rejected(batch_id, "add transaction to").await);
            }
            Err(e) => return Err(e.into()),
        }
        self.metrics.record_transaction_appended();

        debug!(
            batch_id = %batch_id,
            tree_index = tree_index,
            tx_hash = %hex::encode(tx.tx_hash),
            "Transaction added to batch"
        );
        Ok(tx)
    }

    /// Fix the batch root and persist every member's inclusion path
    pub async fn close(&self, batch_id: BatchId) -> Result<AnchorBatch, AnchoringError> {
        let _guard = self.locks.lock(&batch_id).await;
        let mut batch = self.get_batch(batch_id).await?;

        if batch.status != BatchStatus::Pending {
            return Err(AnchoringError::InvalidState {
                batch_id,
                status: batch.status,
                operation: "close",
            });
        }
        if batch.transactions.is_empty() {
            return Err(AnchoringError::EmptyBatch { batch_id });
        }

        let mut members = self.store.list_transactions(batch_id).await?;
        let leaves: Vec<_> = members.iter().map(|tx| tx.tx_hash).collect();
        let (root, paths) = build_tree(&leaves)?;

        for (tx, path) in members.iter_mut().zip(paths) {
            tx.merkle_path = path;
            self.store.update_transaction(tx).await?;
        }

        let now = current_timestamp();
        batch.merkle_root = Some(root);
        batch.closed_at = Some(now);
        let batch = self
            .transition(batch, BatchStatus::Closed, "close", None)
            .await?;
        self.metrics.record_batch_size(leaves.len());

        info!(
            batch_id = %batch_id,
            transactions = leaves.len(),
            merkle_root = %hex::encode(root),
            "Batch closed"
        );
        Ok(batch)
    }

    /// Record the anchor submission of a closed batch
    pub async fn mark_submitted(
        &self,
        batch_id: BatchId,
        chain: TargetChain,
        anchor_tx_hash: &str,
        required_confirmations: u64,
    ) -> Result<AnchorRecord, AnchoringError> {
        let _guard = self.locks.lock(&batch_id).await;
        let batch = self.get_batch(batch_id).await?;

        if batch.status != BatchStatus::Closed {
            return Err(AnchoringError::InvalidState {
                batch_id,
                status: batch.status,
                operation: "mark submitted",
            });
        }
        let root = batch.merkle_root.ok_or(AnchoringError::InvalidState {
            batch_id,
            status: batch.status,
            operation: "mark submitted without a root",
        })?;

        let anchor = AnchorRecord::new(
            batch_id,
            chain,
            anchor_tx_hash,
            root,
            required_confirmations,
            self.validator_id.clone(),
            current_timestamp(),
        );

        // the anchor exists before the batch claims it, so an `anchoring`
        // batch always has a record the tracker can find
        self.store.create_anchor(&anchor).await?;
        if let Err(e) = self
            .transition(
                batch,
                BatchStatus::Anchoring,
                "mark submitted",
                Some(anchor_tx_hash.to_string()),
            )
            .await
        {
            self.discard_anchor(&anchor).await;
            return Err(e);
        }
        self.store
            .record_event(
                &TimelineEvent::new(
                    EntityKind::Anchor,
                    anchor.anchor_id,
                    None,
                    "submitted",
                    anchor.created_at,
                )
                .with_details(format!("batch {batch_id} on {}", anchor.target_chain))
                .with_tx_hash(anchor_tx_hash),
            )
            .await?;

        info!(
            batch_id = %batch_id,
            anchor_id = %anchor.anchor_id,
            chain = %anchor.target_chain,
            anchor_tx = anchor_tx_hash,
            required_confirmations = required_confirmations,
            "Batch submitted for anchoring"
        );
        Ok(anchor)
    }

    /// Fail a non-terminal batch, keeping its members and root for audit
    pub async fn mark_failed(
        &self,
        batch_id: BatchId,
        reason: impl Into<String>,
    ) -> Result<AnchorBatch, AnchoringError> {
        let _guard = self.locks.lock(&batch_id).await;
        let batch = self.get_batch(batch_id).await?;
        if batch.status.is_terminal() {
            return Err(AnchoringError::InvalidState {
                batch_id,
                status: batch.status,
                operation: "fail",
            });
        }
        self.fail(batch, reason.into()).await
    }

    /// Close every pending batch the policy says is due
    pub async fn close_due(&self, now: u64) -> Result<Vec<AnchorBatch>, AnchoringError> {
        let pending = self.store.list_batches_by_status(BatchStatus::Pending).await?;
        let mut closed = Vec::new();

        for batch in pending {
            if !self.policy.should_close(&batch, now) {
                continue;
            }
            match self.close(batch.batch_id).await {
                Ok(batch) => closed.push(batch),
                // closed concurrently by someone else
                Err(AnchoringError::InvalidState { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(closed)
    }

    // ─── tracker hooks ──────────────────────────────────────────────────────

    /// Advance a batch whose anchor just reached finality
    pub(crate) async fn record_finality(
        &self,
        batch_id: BatchId,
        anchor_tx_hash: &str,
    ) -> Result<AnchorBatch, AnchoringError> {
        let _guard = self.locks.lock(&batch_id).await;
        let mut batch = self.get_batch(batch_id).await?;

        if batch.status == BatchStatus::Anchoring {
            batch = self
                .transition(
                    batch,
                    BatchStatus::Anchored,
                    "anchor",
                    Some(anchor_tx_hash.to_string()),
                )
                .await?;
        }
        if batch.status == BatchStatus::Anchored {
            batch = self
                .transition(
                    batch,
                    BatchStatus::Confirmed,
                    "confirm",
                    Some(anchor_tx_hash.to_string()),
                )
                .await?;
        } else if batch.status != BatchStatus::Confirmed {
            warn!(
                batch_id = %batch_id,
                status = %batch.status,
                "Anchor finalized for a batch no longer awaiting it"
            );
        }
        Ok(batch)
    }

    /// Fail a batch whose anchor left the canonical chain, even once confirmed
    pub(crate) async fn invalidate(
        &self,
        batch_id: BatchId,
        reason: String,
    ) -> Result<AnchorBatch, AnchoringError> {
        let _guard = self.locks.lock(&batch_id).await;
        let batch = self.get_batch(batch_id).await?;
        if batch.status == BatchStatus::Failed {
            return Ok(batch);
        }
        self.fail(batch, reason).await
    }

    // ─── internals ──────────────────────────────────────────────────────────

    /// Drop the anchor record of a submission whose batch never left `closed`
    async fn discard_anchor(&self, anchor: &AnchorRecord) {
        match self.store.get_batch(anchor.batch_id).await {
            Ok(Some(batch)) if batch.status == BatchStatus::Anchoring => {}
            Ok(_) => {
                if let Err(e) = self.store.delete_anchor(anchor.anchor_id).await {
                    error!(
                        anchor_id = %anchor.anchor_id,
                        batch_id = %anchor.batch_id,
                        error = %e,
                        "Failed to discard anchor of an unsubmitted batch"
                    );
                }
            }
            Err(e) => {
                error!(
                    anchor_id = %anchor.anchor_id,
                    batch_id = %anchor.batch_id,
                    error = %e,
                    "Could not reload batch, keeping its anchor record"
                );
            }
        }
    }

    async fn fail(&self, mut batch: AnchorBatch, reason: String) -> Result<AnchorBatch, AnchoringError> {
        warn!(
            batch_id = %batch.batch_id,
            from = %batch.status,
            reason = %reason,
            "Batch failed"
        );
        batch.error_message = Some(reason.clone());
        self.transition(batch, BatchStatus::Failed, "fail", Some(reason))
            .await
    }

    /// CAS the batch from its loaded status to `next` and log the change
    async fn transition(
        &self,
        mut batch: AnchorBatch,
        next: BatchStatus,
        operation: &'static str,
        details: Option<String>,
    ) -> Result<AnchorBatch, AnchoringError> {
        let from = batch.status;
        batch.status = next;
        batch.updated_at = current_timestamp();

        match self.store.update_batch(&batch, from).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => return Err(self.rejected(batch.batch_id, operation).await),
            Err(e) => return Err(e.into()),
        }

        self.record(&batch, Some(from), details).await?;
        self.metrics.record_batch_status(next);
        Ok(batch)
    }

    async fn record(
        &self,
        batch: &AnchorBatch,
        from: Option<BatchStatus>,
        details: Option<String>,
    ) -> Result<(), AnchoringError> {
        let mut event = TimelineEvent::new(
            EntityKind::Batch,
            batch.batch_id,
            from.map(|s| s.as_str()),
            batch.status.as_str(),
            batch.updated_at,
        );
        if let Some(details) = details {
            event = event.with_details(details);
        }
        self.store.record_event(&event).await?;
        Ok(())
    }

    /// Turn a lost compare-and-swap into the caller-facing state error
    async fn rejected(&self, batch_id: BatchId, operation: &'static str) -> AnchoringError {
        match self.store.get_batch(batch_id).await {
            Ok(Some(current)) => AnchoringError::InvalidState {
                batch_id,
                status: current.status,
                operation,
            },
            Ok(None) => AnchoringError::BatchNotFound(batch_id),
            Err(e) => e.into(),
        }
    }
}
