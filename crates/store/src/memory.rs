use anchor_proofs_types::{
    AnchorBatch, AnchorId, AnchorRecord, BatchId, BatchStatus, BatchTransaction, ChainGroup,
    Hash32, Intent, IntentLeg, LegDependency, LegId, Proof, ProofId, ProofRequest, RequestId,
    RequestStatus, TargetChain, TimelineEvent, ValidatorAttestation, VerificationResult,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

use crate::store::{LedgerStore, StoreError};

// ═══════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE (for testing)
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct Tables {
    batches: HashMap<BatchId, AnchorBatch>,
    transactions: HashMap<Uuid, BatchTransaction>,
    anchors: HashMap<AnchorId, AnchorRecord>,
    proofs: HashMap<ProofId, Proof>,
    attestations: Vec<ValidatorAttestation>,
    requests: HashMap<RequestId, ProofRequest>,
    intents: HashMap<String, Intent>,
    legs: HashMap<LegId, IntentLeg>,
    dependencies: HashMap<Uuid, LegDependency>,
    groups: HashMap<Uuid, ChainGroup>,
    events: Vec<TimelineEvent>,
}

/// Ledger store held entirely in process memory.
///
/// All tables sit behind one lock so multi-entity writes stay atomic.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Mutex<HashMap<&'static str, usize>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of batches (for testing)
    pub fn batch_count(&self) -> usize {
        self.tables.read().unwrap().batches.len()
    }

    /// Number of intent legs (for testing)
    pub fn leg_count(&self) -> usize {
        self.tables.read().unwrap().legs.len()
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        *self.tables.write().unwrap() = Tables::default();
    }

    /// Make the next `times` calls of a write operation fail (for testing)
    ///
    /// Covers `create_anchor`, `update_anchor`, `delete_anchor`,
    /// `update_batch` and `record_event`.
    pub fn fail_next(&self, operation: &'static str, times: usize) {
        self.faults.lock().unwrap().insert(operation, times);
    }

    fn injected(&self, operation: &'static str) -> Result<(), StoreError> {
        let mut faults = self.faults.lock().unwrap();
        match faults.get_mut(operation) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(StoreError::DatabaseError(format!(
                    "injected failure in {operation}"
                )))
            }
            _ => Ok(()),
        }
    }
}

fn sorted_by<T, K: Ord>(mut items: Vec<T>, key: impl FnMut(&T) -> K) -> Vec<T> {
    items.sort_by_key(key);
    items
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn create_batch(&self, batch: &AnchorBatch) -> Result<(), StoreError> {
        let mut t = self.tables.write().unwrap();
        if t.batches.contains_key(&batch.batch_id) {
            return Err(StoreError::duplicate("batch", batch.batch_id));
        }
        t.batches.insert(batch.batch_id, batch.clone());
        Ok(())
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<AnchorBatch>, StoreError> {
        Ok(self.tables.read().unwrap().batches.get(&id).cloned())
    }

    async fn update_batch(
        &self,
        batch: &AnchorBatch,
        expected: BatchStatus,
    ) -> Result<(), StoreError> {
        self.injected("update_batch")?;
        let mut t = self.tables.write().unwrap();
        let stored = t
            .batches
            .get_mut(&batch.batch_id)
            .ok_or_else(|| StoreError::not_found("batch", batch.batch_id))?;
        if stored.status != expected {
            return Err(StoreError::Conflict {
                entity: "batch",
                id: batch.batch_id.to_string(),
                expected: expected.to_string(),
                actual: stored.status.to_string(),
            });
        }
        *stored = batch.clone();
        Ok(())
    }

    async fn list_batches_by_status(
        &self,
        status: BatchStatus,
    ) -> Result<Vec<AnchorBatch>, StoreError> {
        let t = self.tables.read().unwrap();
        let items = t
            .batches
            .values()
            .filter(|b| b.status == status)
            .cloned()
            .collect();
        Ok(sorted_by(items, |b: &AnchorBatch| b.created_at))
    }

    async fn append_transaction(&self, tx: &BatchTransaction) -> Result<AnchorBatch, StoreError> {
        let mut t = self.tables.write().unwrap();
        let batch = t
            .batches
            .get(&tx.batch_id)
            .ok_or_else(|| StoreError::not_found("batch", tx.batch_id))?;

        if batch.status != BatchStatus::Pending {
            return Err(StoreError::Conflict {
                entity: "batch",
                id: tx.batch_id.to_string(),
                expected: BatchStatus::Pending.to_string(),
                actual: batch.status.to_string(),
            });
        }
        if batch.transactions.len() != tx.tree_index as usize {
            return Err(StoreError::Conflict {
                entity: "batch",
                id: tx.batch_id.to_string(),
                expected: format!("tree index {}", batch.transactions.len()),
                actual: format!("tree index {}", tx.tree_index),
            });
        }
        if batch.transactions.contains(&tx.tx_hash) {
            return Err(StoreError::duplicate("transaction", hex::encode(tx.tx_hash)));
        }

        let mut updated = batch.clone();
        updated.transactions.push(tx.tx_hash);
        updated.updated_at = updated.updated_at.max(tx.created_at);
        t.batches.insert(updated.batch_id, updated.clone());
        t.transactions.insert(tx.id, tx.clone());
        Ok(updated)
    }

    async fn update_transaction(&self, tx: &BatchTransaction) -> Result<(), StoreError> {
        let mut t = self.tables.write().unwrap();
        match t.transactions.get_mut(&tx.id) {
            Some(stored) => {
                *stored = tx.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("transaction", tx.id)),
        }
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<BatchTransaction>, StoreError> {
        Ok(self.tables.read().unwrap().transactions.get(&id).cloned())
    }

    async fn list_transactions(
        &self,
        batch_id: BatchId,
    ) -> Result<Vec<BatchTransaction>, StoreError> {
        let t = self.tables.read().unwrap();
        let items = t
            .transactions
            .values()
            .filter(|tx| tx.batch_id == batch_id)
            .cloned()
            .collect();
        Ok(sorted_by(items, |tx: &BatchTransaction| tx.tree_index))
    }

    async fn create_anchor(&self, anchor: &AnchorRecord) -> Result<(), StoreError> {
        self.injected("create_anchor")?;
        let mut t = self.tables.write().unwrap();
        let clash = t.anchors.values().any(|a| {
            a.anchor_id == anchor.anchor_id
                || (a.target_chain == anchor.target_chain
                    && a.anchor_tx_hash == anchor.anchor_tx_hash)
        });
        if clash {
            return Err(StoreError::duplicate("anchor", &anchor.anchor_tx_hash));
        }
        t.anchors.insert(anchor.anchor_id, anchor.clone());
        Ok(())
    }

    async fn update_anchor(&self, anchor: &AnchorRecord) -> Result<(), StoreError> {
        self.injected("update_anchor")?;
        let mut t = self.tables.write().unwrap();
        match t.anchors.get_mut(&anchor.anchor_id) {
            Some(stored) => {
                *stored = anchor.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("anchor", anchor.anchor_id)),
        }
    }

    async fn delete_anchor(&self, id: AnchorId) -> Result<(), StoreError> {
        self.injected("delete_anchor")?;
        self.tables
            .write()
            .unwrap()
            .anchors
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("anchor", id))
    }

    async fn get_anchor(&self, id: AnchorId) -> Result<Option<AnchorRecord>, StoreError> {
        Ok(self.tables.read().unwrap().anchors.get(&id).cloned())
    }

    async fn find_anchor(
        &self,
        chain: &TargetChain,
        anchor_tx_hash: &str,
    ) -> Result<Option<AnchorRecord>, StoreError> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .anchors
            .values()
            .find(|a| &a.target_chain == chain && a.anchor_tx_hash == anchor_tx_hash)
            .cloned())
    }

    async fn anchors_for_batch(&self, batch_id: BatchId) -> Result<Vec<AnchorRecord>, StoreError> {
        let t = self.tables.read().unwrap();
        let items = t
            .anchors
            .values()
            .filter(|a| a.batch_id == batch_id)
            .cloned()
            .collect();
        Ok(sorted_by(items, |a: &AnchorRecord| a.created_at))
    }

    async fn list_unfinalized_anchors(&self) -> Result<Vec<AnchorRecord>, StoreError> {
        let t = self.tables.read().unwrap();
        let items = t
            .anchors
            .values()
            .filter(|a| !a.is_final && !a.reorged)
            .cloned()
            .collect();
        Ok(sorted_by(items, |a: &AnchorRecord| a.created_at))
    }

    async fn create_proof(&self, proof: &Proof) -> Result<(), StoreError> {
        let mut t = self.tables.write().unwrap();
        let clash = t.proofs.values().any(|p| {
            p.proof_id == proof.proof_id || p.transaction_id == proof.transaction_id
        });
        if clash {
            return Err(StoreError::duplicate("proof", proof.transaction_id));
        }
        t.proofs.insert(proof.proof_id, proof.clone());
        Ok(())
    }

    async fn mark_proof_stale(&self, id: ProofId, at: u64) -> Result<(), StoreError> {
        let mut t = self.tables.write().unwrap();
        let proof = t
            .proofs
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("proof", id))?;
        proof.stale = true;
        proof.verified = false;
        proof.updated_at = at;
        Ok(())
    }

    async fn record_verification(
        &self,
        id: ProofId,
        verified: bool,
        at: u64,
        details: &VerificationResult,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.write().unwrap();
        let proof = t
            .proofs
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("proof", id))?;
        proof.verified = verified && !proof.stale;
        proof.verification_time = Some(at);
        proof.verification_details = Some(details.clone());
        proof.updated_at = at;
        Ok(())
    }

    async fn get_proof(&self, id: ProofId) -> Result<Option<Proof>, StoreError> {
        Ok(self.tables.read().unwrap().proofs.get(&id).cloned())
    }

    async fn proof_for_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<Proof>, StoreError> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .proofs
            .values()
            .find(|p| p.transaction_id == transaction_id)
            .cloned())
    }

    async fn proofs_by_tx_hash(&self, tx_hash: &Hash32) -> Result<Vec<Proof>, StoreError> {
        let t = self.tables.read().unwrap();
        let items = t
            .proofs
            .values()
            .filter(|p| &p.tx_hash == tx_hash)
            .cloned()
            .collect();
        Ok(sorted_by(items, |p: &Proof| p.created_at))
    }

    async fn proofs_by_account(&self, account_url: &str) -> Result<Vec<Proof>, StoreError> {
        let t = self.tables.read().unwrap();
        let items = t
            .proofs
            .values()
            .filter(|p| p.account_url == account_url)
            .cloned()
            .collect();
        Ok(sorted_by(items, |p: &Proof| p.created_at))
    }

    async fn proofs_by_batch(&self, batch_id: BatchId) -> Result<Vec<Proof>, StoreError> {
        let t = self.tables.read().unwrap();
        let items = t
            .proofs
            .values()
            .filter(|p| p.batch_id == batch_id)
            .cloned()
            .collect();
        Ok(sorted_by(items, |p: &Proof| p.inclusion.leaf_index))
    }

    async fn proofs_by_anchor(&self, anchor_id: AnchorId) -> Result<Vec<Proof>, StoreError> {
        let t = self.tables.read().unwrap();
        let items = t
            .proofs
            .values()
            .filter(|p| p.anchor_reference.anchor_id == anchor_id)
            .cloned()
            .collect();
        Ok(sorted_by(items, |p: &Proof| p.inclusion.leaf_index))
    }

    async fn create_attestation(
        &self,
        attestation: &ValidatorAttestation,
    ) -> Result<(), StoreError> {
        let mut t = self.tables.write().unwrap();
        if t
            .attestations
            .iter()
            .any(|a| a.attestation_id == attestation.attestation_id)
        {
            return Err(StoreError::duplicate("attestation", attestation.attestation_id));
        }
        t.attestations.push(attestation.clone());
        Ok(())
    }

    async fn attestations_for_proof(
        &self,
        proof_id: ProofId,
    ) -> Result<Vec<ValidatorAttestation>, StoreError> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .attestations
            .iter()
            .filter(|a| a.proof_id == proof_id)
            .cloned()
            .collect())
    }

    async fn create_request(&self, request: &ProofRequest) -> Result<(), StoreError> {
        let mut t = self.tables.write().unwrap();
        if t.requests.contains_key(&request.request_id) {
            return Err(StoreError::duplicate("proof request", request.request_id));
        }
        t.requests.insert(request.request_id, request.clone());
        Ok(())
    }

    async fn update_request(&self, request: &ProofRequest) -> Result<(), StoreError> {
        let mut t = self.tables.write().unwrap();
        match t.requests.get_mut(&request.request_id) {
            Some(stored) => {
                *stored = request.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("proof request", request.request_id)),
        }
    }

    async fn get_request(&self, id: RequestId) -> Result<Option<ProofRequest>, StoreError> {
        Ok(self.tables.read().unwrap().requests.get(&id).cloned())
    }

    async fn list_requests_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<ProofRequest>, StoreError> {
        let t = self.tables.read().unwrap();
        let items = t
            .requests
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        // Highest priority first, then oldest
        Ok(sorted_by(items, |r: &ProofRequest| {
            (std::cmp::Reverse(r.priority), r.requested_at)
        }))
    }

    async fn create_intent_graph(
        &self,
        intent: &Intent,
        legs: &[IntentLeg],
        dependencies: &[LegDependency],
        groups: &[ChainGroup],
    ) -> Result<(), StoreError> {
        let mut t = self.tables.write().unwrap();
        if t.intents.contains_key(&intent.intent_id) {
            return Err(StoreError::duplicate("intent", &intent.intent_id));
        }
        if let Some(leg) = legs.iter().find(|l| t.legs.contains_key(&l.leg_id)) {
            return Err(StoreError::duplicate("leg", leg.leg_id));
        }

        t.intents.insert(intent.intent_id.clone(), intent.clone());
        for leg in legs {
            t.legs.insert(leg.leg_id, leg.clone());
        }
        for dep in dependencies {
            t.dependencies.insert(dep.dependency_id, dep.clone());
        }
        for group in groups {
            t.groups.insert(group.group_id, group.clone());
        }
        Ok(())
    }

    async fn get_intent(&self, intent_id: &str) -> Result<Option<Intent>, StoreError> {
        Ok(self.tables.read().unwrap().intents.get(intent_id).cloned())
    }

    async fn update_intent(&self, intent: &Intent) -> Result<(), StoreError> {
        let mut t = self.tables.write().unwrap();
        match t.intents.get_mut(&intent.intent_id) {
            Some(stored) => {
                *stored = intent.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("intent", &intent.intent_id)),
        }
    }

    async fn list_active_intents(&self) -> Result<Vec<Intent>, StoreError> {
        let t = self.tables.read().unwrap();
        let items = t
            .intents
            .values()
            .filter(|i| !i.status.is_terminal())
            .cloned()
            .collect();
        Ok(sorted_by(items, |i: &Intent| i.created_at))
    }

    async fn list_intents_by_user(&self, user_id: &str) -> Result<Vec<Intent>, StoreError> {
        let t = self.tables.read().unwrap();
        let items = t
            .intents
            .values()
            .filter(|i| i.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        Ok(sorted_by(items, |i: &Intent| i.created_at))
    }

    async fn get_leg(&self, leg_id: LegId) -> Result<Option<IntentLeg>, StoreError> {
        Ok(self.tables.read().unwrap().legs.get(&leg_id).cloned())
    }

    async fn update_leg(&self, leg: &IntentLeg) -> Result<(), StoreError> {
        let mut t = self.tables.write().unwrap();
        match t.legs.get_mut(&leg.leg_id) {
            Some(stored) => {
                *stored = leg.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("leg", leg.leg_id)),
        }
    }

    async fn legs_for_intent(&self, intent_id: &str) -> Result<Vec<IntentLeg>, StoreError> {
        let t = self.tables.read().unwrap();
        let items = t
            .legs
            .values()
            .filter(|l| l.intent_id == intent_id)
            .cloned()
            .collect();
        Ok(sorted_by(items, |l: &IntentLeg| l.leg_index))
    }

    async fn dependencies_for_intent(
        &self,
        intent_id: &str,
    ) -> Result<Vec<LegDependency>, StoreError> {
        let t = self.tables.read().unwrap();
        let items = t
            .dependencies
            .values()
            .filter(|d| d.intent_id == intent_id)
            .cloned()
            .collect();
        Ok(sorted_by(items, |d: &LegDependency| {
            (d.created_at, d.dependency_id)
        }))
    }

    async fn update_dependency(&self, dependency: &LegDependency) -> Result<(), StoreError> {
        let mut t = self.tables.write().unwrap();
        match t.dependencies.get_mut(&dependency.dependency_id) {
            Some(stored) => {
                *stored = dependency.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("dependency", dependency.dependency_id)),
        }
    }

    async fn chain_groups_for_intent(
        &self,
        intent_id: &str,
    ) -> Result<Vec<ChainGroup>, StoreError> {
        let t = self.tables.read().unwrap();
        let items = t
            .groups
            .values()
            .filter(|g| g.intent_id == intent_id)
            .cloned()
            .collect();
        Ok(sorted_by(items, |g: &ChainGroup| g.target_chain.clone()))
    }

    async fn update_chain_group(&self, group: &ChainGroup) -> Result<(), StoreError> {
        let mut t = self.tables.write().unwrap();
        match t.groups.get_mut(&group.group_id) {
            Some(stored) => {
                *stored = group.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("chain group", group.group_id)),
        }
    }

    async fn record_event(&self, event: &TimelineEvent) -> Result<(), StoreError> {
        self.injected("record_event")?;
        self.tables.write().unwrap().events.push(event.clone());
        Ok(())
    }

    async fn timeline(&self, entity_id: &str) -> Result<Vec<TimelineEvent>, StoreError> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn intent_timeline(&self, intent_id: &str) -> Result<Vec<TimelineEvent>, StoreError> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.intent_id.as_deref() == Some(intent_id))
            .cloned()
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
