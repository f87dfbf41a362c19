use anchor_proofs_metrics::MetricsCollector;
use anchor_proofs_store::{LedgerStore, StoreError};
use anchor_proofs_types::{
    current_timestamp, AnchorRecord, AnchorReference, BatchId, BatchTransaction, EntityKind,
    GovernanceProof, InclusionProof, Proof, StateProof, TargetChain, TimelineEvent,
    PROOF_VERSION,
};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ProofError;

/// Packages the four proof components of anchored batch transactions
///
/// Assembly never judges correctness; that is the verifier's job.
pub struct ProofAssembler<S: LedgerStore> {
    store: Arc<S>,
    validator_id: String,
    proof_version: String,
    metrics: Arc<MetricsCollector>,
}

impl<S: LedgerStore> ProofAssembler<S> {
    pub fn new(store: Arc<S>, validator_id: impl Into<String>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            store,
            validator_id: validator_id.into(),
            proof_version: PROOF_VERSION.to_string(),
            metrics,
        }
    }

    /// Version string stamped on newly assembled proofs
    pub fn with_proof_version(mut self, proof_version: impl Into<String>) -> Self {
        self.proof_version = proof_version.into();
        self
    }

    /// Build the proof of one transaction, or return the one already stored.
    ///
    /// Explicit component payloads take precedence over those attached to
    /// the transaction before anchoring.
    pub async fn assemble(
        &self,
        tx: &BatchTransaction,
        anchor: &AnchorRecord,
        state_proof: Option<StateProof>,
        governance_proof: Option<GovernanceProof>,
    ) -> Result<Proof, ProofError> {
        if anchor.batch_id != tx.batch_id {
            return Err(ProofError::AnchorMismatch {
                anchor_id: anchor.anchor_id,
                batch_id: tx.batch_id,
            });
        }

        let batch = self
            .store
            .get_batch(tx.batch_id)
            .await?
            .ok_or(ProofError::BatchNotFound(tx.batch_id))?;
        if !batch.status.is_anchored() {
            return Err(ProofError::BatchNotAnchored {
                batch_id: batch.batch_id,
                status: batch.status,
            });
        }
        let merkle_root = batch
            .merkle_root
            .ok_or(ProofError::MissingRoot { batch_id: batch.batch_id })?;

        if let Some(existing) = self.store.proof_for_transaction(tx.id).await? {
            debug!(proof_id = %existing.proof_id, "Proof already assembled");
            return Ok(existing);
        }

        let now = current_timestamp();
        let proof = Proof {
            proof_id: Uuid::new_v4(),
            batch_id: tx.batch_id,
            transaction_id: tx.id,
            tx_hash: tx.tx_hash,
            account_url: tx.account_url.clone(),
            inclusion: InclusionProof {
                merkle_root,
                leaf_hash: tx.tx_hash,
                leaf_index: tx.tree_index,
                path: tx.merkle_path.clone(),
            },
            anchor_reference: AnchorReference {
                anchor_id: anchor.anchor_id,
                target_chain: anchor.target_chain.clone(),
                anchor_tx_hash: anchor.anchor_tx_hash.clone(),
                block_number: anchor.block_number,
                anchored_root: anchor.merkle_root,
                confirmations: anchor.confirmations,
                required_confirmations: anchor.required_confirmations,
            },
            state_proof: state_proof.or_else(|| tx.state_proof.clone()),
            governance_proof: governance_proof.or_else(|| tx.governance_proof.clone()),
            verified: false,
            verification_time: None,
            verification_details: None,
            stale: anchor.reorged,
            validator_id: self.validator_id.clone(),
            proof_version: self.proof_version.clone(),
            created_at: now,
            updated_at: now,
        };

        match self.store.create_proof(&proof).await {
            Ok(()) => {}
            // lost a race with another assembler; keep the first proof
            Err(StoreError::DuplicateId { .. }) => {
                return self
                    .store
                    .proof_for_transaction(tx.id)
                    .await?
                    .ok_or(ProofError::TransactionNotFound(tx.id));
            }
            Err(e) => return Err(e.into()),
        }

        self.store
            .record_event(
                &TimelineEvent::new(EntityKind::Proof, proof.proof_id, None, "assembled", now)
                    .with_details(format!("batch {} leaf {}", proof.batch_id, tx.tree_index))
                    .with_tx_hash(anchor.anchor_tx_hash.clone()),
            )
            .await?;
        self.metrics.record_proof_assembled();
        Ok(proof)
    }

    /// Assemble a proof for every member of an anchored batch.
    ///
    /// Existing proofs are returned as stored, never re-created.
    pub async fn materialize_batch(
        &self,
        batch_id: BatchId,
        chain: &TargetChain,
    ) -> Result<Vec<Proof>, ProofError> {
        let anchor = self
            .store
            .anchors_for_batch(batch_id)
            .await?
            .into_iter()
            .find(|a| &a.target_chain == chain && !a.reorged)
            .ok_or_else(|| ProofError::NoAnchor {
                batch_id,
                chain: chain.clone(),
            })?;
        if !anchor.is_final {
            return Err(ProofError::AnchorNotFinal {
                anchor_id: anchor.anchor_id,
            });
        }

        let members = self.store.list_transactions(batch_id).await?;
        let mut proofs = Vec::with_capacity(members.len());
        for tx in &members {
            proofs.push(self.assemble(tx, &anchor, None, None).await?);
        }

        info!(
            batch_id = %batch_id,
            anchor_id = %anchor.anchor_id,
            proofs = proofs.len(),
            "Batch proofs materialized"
        );
        Ok(proofs)
    }
}
