use anchor_proofs_anchoring::{
    AnchorSubmitter, BatchManager, BatchPolicy, ChainPolicy, ConfirmationTracker,
};
use anchor_proofs_chain::{MockChainObserver, ObserverPool};
use anchor_proofs_metrics::MetricsCollector;
use anchor_proofs_orchestrator::{
    GraphError, IntentOrchestrator, LegCounters, MockLegExecutor, OrchestratorConfig,
    OrchestratorError,
};
use anchor_proofs_proof::ProofAssembler;
use anchor_proofs_retry::RetryPolicy;
use anchor_proofs_store::{InMemoryStore, LedgerStore, StoreError};
use anchor_proofs_types::{
    current_timestamp, AnchorBatch, AnchorId, AnchorRecord, BatchId, BatchStatus,
    BatchTransaction, ChainGroup, DependencyCondition, EntityKind, ExecutionMode, Hash32, Intent,
    IntentLeg, IntentStatus, LegDependency, LegId, LegRole, LegStatus, NewDependency, NewIntent,
    NewLeg, Proof, ProofId, ProofRequest, RequestId, RequestStatus, TargetChain, TimelineEvent,
    ValidatorAttestation, VerificationResult,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════

struct Harness<S: LedgerStore + 'static = InMemoryStore> {
    store: Arc<S>,
    executor: Arc<MockLegExecutor>,
    orchestrator: Arc<IntentOrchestrator<S>>,
    poller: JoinHandle<()>,
}

impl<S: LedgerStore + 'static> Drop for Harness<S> {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(2))
}

async fn harness(executor: MockLegExecutor) -> Harness {
    harness_with(Arc::new(InMemoryStore::new()), executor).await
}

async fn harness_with<S: LedgerStore + 'static>(
    store: Arc<S>,
    executor: MockLegExecutor,
) -> Harness<S> {
    let metrics = Arc::new(MetricsCollector::new());

    let observer = MockChainObserver::new();
    observer.auto_confirm(2).await;
    let pool = ObserverPool::new();
    for chain in [TargetChain::ethereum(), TargetChain::bitcoin()] {
        pool.register(chain, Arc::new(observer.clone())).await;
    }

    let policy = ChainPolicy {
        required_confirmations: 2,
        confirmation_timeout: Duration::from_secs(5),
        submission_retries: 1,
    };
    let chains = HashMap::from([
        (TargetChain::ethereum(), policy.clone()),
        (TargetChain::bitcoin(), policy),
    ]);

    let batches = Arc::new(BatchManager::new(
        store.clone(),
        BatchPolicy::default(),
        "validator-1",
        metrics.clone(),
    ));
    let submitter = Arc::new(AnchorSubmitter::new(
        batches.clone(),
        pool.clone(),
        chains,
        fast_retry(),
        metrics.clone(),
    ));
    let tracker = Arc::new(ConfirmationTracker::new(batches.clone(), metrics.clone()));
    let poller = tracker
        .clone()
        .spawn_poller(pool, Duration::from_millis(5));
    let assembler = Arc::new(ProofAssembler::new(
        store.clone(),
        "validator-1",
        metrics.clone(),
    ));

    let executor = Arc::new(executor);
    let orchestrator = IntentOrchestrator::builder()
        .with_batches(batches)
        .with_submitter(submitter)
        .with_tracker(tracker)
        .with_assembler(assembler)
        .with_executor(executor.clone())
        .with_metrics(metrics)
        .with_config(OrchestratorConfig::default().with_leg_retry(fast_retry()))
        .build()
        .unwrap();

    Harness {
        store,
        executor,
        orchestrator: Arc::new(orchestrator),
        poller,
    }
}

fn leg(key: &str, chain: TargetChain, order: u32) -> NewLeg {
    NewLeg::new(key, chain, order)
}

fn needs(intent: &str, leg: &str, on: &str, condition: DependencyCondition) -> NewDependency {
    NewDependency::within(intent, leg, on, condition)
}

async fn status_of<S: LedgerStore + 'static>(
    h: &Harness<S>,
    intent_id: &str,
) -> HashMap<String, LegStatus> {
    h.orchestrator
        .legs(intent_id)
        .await
        .unwrap()
        .into_iter()
        .map(|l| (l.key, l.status))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// TALLY AUDIT
// ═══════════════════════════════════════════════════════════════════════════

/// Checks the leg tallies of every intent row written through it
#[derive(Default)]
struct AuditedStore {
    inner: InMemoryStore,
    audited: AtomicUsize,
}

impl AuditedStore {
    fn audited(&self) -> usize {
        self.audited.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerStore for AuditedStore {
    async fn update_intent(&self, intent: &Intent) -> Result<(), StoreError> {
        assert_eq!(
            intent.legs_completed + intent.legs_failed + intent.legs_pending,
            intent.leg_count,
            "tallies of {} drifted from its leg count in status {}",
            intent.intent_id,
            intent.status
        );
        let legs = self.inner.legs_for_intent(&intent.intent_id).await?;
        let stored = LegCounters::tally(legs.iter().map(|l| l.status));
        assert_eq!(
            (intent.legs_completed, intent.legs_failed, intent.legs_pending),
            (stored.completed, stored.failed, stored.pending),
            "tallies of {} disagree with its stored legs",
            intent.intent_id
        );
        self.audited.fetch_add(1, Ordering::SeqCst);
        self.inner.update_intent(intent).await
    }

    async fn create_batch(&self, batch: &AnchorBatch) -> Result<(), StoreError> {
        self.inner.create_batch(batch).await
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<AnchorBatch>, StoreError> {
        self.inner.get_batch(id).await
    }

    async fn update_batch(
        &self,
        batch: &AnchorBatch,
        expected: BatchStatus,
    ) -> Result<(), StoreError> {
        self.inner.update_batch(batch, expected).await
    }

    async fn list_batches_by_status(
        &self,
        status: BatchStatus,
    ) -> Result<Vec<AnchorBatch>, StoreError> {
        self.inner.list_batches_by_status(status).await
    }

    async fn append_transaction(&self, tx: &BatchTransaction) -> Result<AnchorBatch, StoreError> {
        self.inner.append_transaction(tx).await
    }

    async fn update_transaction(&self, tx: &BatchTransaction) -> Result<(), StoreError> {
        self.inner.update_transaction(tx).await
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<BatchTransaction>, StoreError> {
        self.inner.get_transaction(id).await
    }

    async fn list_transactions(
        &self,
        batch_id: BatchId,
    ) -> Result<Vec<BatchTransaction>, StoreError> {
        self.inner.list_transactions(batch_id).await
    }

    async fn create_anchor(&self, anchor: &AnchorRecord) -> Result<(), StoreError> {
        self.inner.create_anchor(anchor).await
    }

    async fn update_anchor(&self, anchor: &AnchorRecord) -> Result<(), StoreError> {
        self.inner.update_anchor(anchor).await
    }

    async fn delete_anchor(&self, id: AnchorId) -> Result<(), StoreError> {
        self.inner.delete_anchor(id).await
    }

    async fn get_anchor(&self, id: AnchorId) -> Result<Option<AnchorRecord>, StoreError> {
        self.inner.get_anchor(id).await
    }

    async fn find_anchor(
        &self,
        chain: &TargetChain,
        anchor_tx_hash: &str,
    ) -> Result<Option<AnchorRecord>, StoreError> {
        self.inner.find_anchor(chain, anchor_tx_hash).await
    }

    async fn anchors_for_batch(&self, batch_id: BatchId) -> Result<Vec<AnchorRecord>, StoreError> {
        self.inner.anchors_for_batch(batch_id).await
    }

    async fn list_unfinalized_anchors(&self) -> Result<Vec<AnchorRecord>, StoreError> {
        self.inner.list_unfinalized_anchors().await
    }

    async fn create_proof(&self, proof: &Proof) -> Result<(), StoreError> {
        self.inner.create_proof(proof).await
    }

    async fn mark_proof_stale(&self, id: ProofId, at: u64) -> Result<(), StoreError> {
        self.inner.mark_proof_stale(id, at).await
    }

    async fn record_verification(
        &self,
        id: ProofId,
        verified: bool,
        at: u64,
        details: &VerificationResult,
    ) -> Result<(), StoreError> {
        self.inner.record_verification(id, verified, at, details).await
    }

    async fn get_proof(&self, id: ProofId) -> Result<Option<Proof>, StoreError> {
        self.inner.get_proof(id).await
    }

    async fn proof_for_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<Proof>, StoreError> {
        self.inner.proof_for_transaction(transaction_id).await
    }

    async fn proofs_by_tx_hash(&self, tx_hash: &Hash32) -> Result<Vec<Proof>, StoreError> {
        self.inner.proofs_by_tx_hash(tx_hash).await
    }

    async fn proofs_by_account(&self, account_url: &str) -> Result<Vec<Proof>, StoreError> {
        self.inner.proofs_by_account(account_url).await
    }

    async fn proofs_by_batch(&self, batch_id: BatchId) -> Result<Vec<Proof>, StoreError> {
        self.inner.proofs_by_batch(batch_id).await
    }

    async fn proofs_by_anchor(&self, anchor_id: AnchorId) -> Result<Vec<Proof>, StoreError> {
        self.inner.proofs_by_anchor(anchor_id).await
    }

    async fn create_attestation(
        &self,
        attestation: &ValidatorAttestation,
    ) -> Result<(), StoreError> {
        self.inner.create_attestation(attestation).await
    }

    async fn attestations_for_proof(
        &self,
        proof_id: ProofId,
    ) -> Result<Vec<ValidatorAttestation>, StoreError> {
        self.inner.attestations_for_proof(proof_id).await
    }

    async fn create_request(&self, request: &ProofRequest) -> Result<(), StoreError> {
        self.inner.create_request(request).await
    }

    async fn update_request(&self, request: &ProofRequest) -> Result<(), StoreError> {
        self.inner.update_request(request).await
    }

    async fn get_request(&self, id: RequestId) -> Result<Option<ProofRequest>, StoreError> {
        self.inner.get_request(id).await
    }

    async fn list_requests_by_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<ProofRequest>, StoreError> {
        self.inner.list_requests_by_status(status).await
    }

    async fn create_intent_graph(
        &self,
        intent: &Intent,
        legs: &[IntentLeg],
        dependencies: &[LegDependency],
        groups: &[ChainGroup],
    ) -> Result<(), StoreError> {
        self.inner.create_intent_graph(intent, legs, dependencies, groups).await
    }

    async fn get_intent(&self, intent_id: &str) -> Result<Option<Intent>, StoreError> {
        self.inner.get_intent(intent_id).await
    }

    async fn list_active_intents(&self) -> Result<Vec<Intent>, StoreError> {
        self.inner.list_active_intents().await
    }

    async fn list_intents_by_user(&self, user_id: &str) -> Result<Vec<Intent>, StoreError> {
        self.inner.list_intents_by_user(user_id).await
    }

    async fn get_leg(&self, leg_id: LegId) -> Result<Option<IntentLeg>, StoreError> {
        self.inner.get_leg(leg_id).await
    }

    async fn update_leg(&self, leg: &IntentLeg) -> Result<(), StoreError> {
        self.inner.update_leg(leg).await
    }

    async fn legs_for_intent(&self, intent_id: &str) -> Result<Vec<IntentLeg>, StoreError> {
        self.inner.legs_for_intent(intent_id).await
    }

    async fn dependencies_for_intent(
        &self,
        intent_id: &str,
    ) -> Result<Vec<LegDependency>, StoreError> {
        self.inner.dependencies_for_intent(intent_id).await
    }

    async fn update_dependency(&self, dependency: &LegDependency) -> Result<(), StoreError> {
        self.inner.update_dependency(dependency).await
    }

    async fn chain_groups_for_intent(
        &self,
        intent_id: &str,
    ) -> Result<Vec<ChainGroup>, StoreError> {
        self.inner.chain_groups_for_intent(intent_id).await
    }

    async fn update_chain_group(&self, group: &ChainGroup) -> Result<(), StoreError> {
        self.inner.update_chain_group(group).await
    }

    async fn record_event(&self, event: &TimelineEvent) -> Result<(), StoreError> {
        self.inner.record_event(event).await
    }

    async fn timeline(&self, entity_id: &str) -> Result<Vec<TimelineEvent>, StoreError> {
        self.inner.timeline(entity_id).await
    }

    async fn intent_timeline(&self, intent_id: &str) -> Result<Vec<TimelineEvent>, StoreError> {
        self.inner.intent_timeline(intent_id).await
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_discover_builds_groups_and_counters() {
    let h = harness(MockLegExecutor::new()).await;
    let intent = h
        .orchestrator
        .discover(
            NewIntent::new("swap-1", ExecutionMode::Parallel).with_user("alice"),
            vec![
                leg("lock", TargetChain::ethereum(), 0).with_role(LegRole::Source),
                leg("mint", TargetChain::bitcoin(), 1).with_role(LegRole::Destination),
                leg("fee", TargetChain::ethereum(), 2),
            ],
            vec![needs("swap-1", "mint", "lock", DependencyCondition::Confirmation)],
        )
        .await
        .unwrap();

    assert_eq!(intent.status, IntentStatus::Discovered);
    assert_eq!((intent.leg_count, intent.legs_pending), (3, 3));
    assert!(intent.expires_at.is_some());

    let summary = h.orchestrator.summary("swap-1").await.unwrap();
    assert_eq!(summary.legs.len(), 3);
    assert!(summary.legs.iter().all(|l| l.status == LegStatus::Pending));
    assert_eq!(summary.dependencies.len(), 1);
    assert_eq!(summary.chain_groups.len(), 2);
    let eth = summary
        .chain_groups
        .iter()
        .find(|g| g.target_chain == TargetChain::ethereum())
        .unwrap();
    assert_eq!(eth.leg_ids.len(), 2);

    let mine = h.orchestrator.intents_for_user("alice").await.unwrap();
    assert_eq!(mine.len(), 1);
}

#[tokio::test]
async fn test_cycle_rejected_without_creating_legs() {
    let h = harness(MockLegExecutor::new()).await;
    let err = h
        .orchestrator
        .discover(
            NewIntent::new("loop", ExecutionMode::Parallel),
            vec![
                leg("a", TargetChain::ethereum(), 0),
                leg("b", TargetChain::ethereum(), 1),
                leg("c", TargetChain::bitcoin(), 2),
            ],
            vec![
                needs("loop", "b", "a", DependencyCondition::Success),
                needs("loop", "c", "b", DependencyCondition::Success),
                needs("loop", "a", "c", DependencyCondition::Completion),
            ],
        )
        .await
        .unwrap_err();

    assert!(err.is_invalid_graph());
    assert!(matches!(
        err,
        OrchestratorError::InvalidDependencyGraph {
            reason: GraphError::Cycle(_),
            ..
        }
    ));
    assert!(h.store.get_intent("loop").await.unwrap().is_none());
    assert!(h.store.legs_for_intent("loop").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cross_intent_dependency_rejected() {
    let h = harness(MockLegExecutor::new()).await;
    let mut foreign = needs("mine", "a", "b", DependencyCondition::Success);
    foreign.depends_on_intent_id = "theirs".to_string();

    let err = h
        .orchestrator
        .discover(
            NewIntent::new("mine", ExecutionMode::Parallel),
            vec![
                leg("a", TargetChain::ethereum(), 0),
                leg("b", TargetChain::ethereum(), 1),
            ],
            vec![foreign],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InvalidDependencyGraph {
            reason: GraphError::CrossIntent { .. },
            ..
        }
    ));
}

// ═══════════════════════════════════════════════════════════════════════════
// EXECUTION MODES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_parallel_intent_completes_with_anchored_commitments() {
    let h = harness(MockLegExecutor::new()).await;
    h.orchestrator
        .discover(
            NewIntent::new("transfer", ExecutionMode::Parallel),
            vec![
                leg("debit", TargetChain::ethereum(), 0).with_transfer(
                    "0xalice",
                    "0xbridge",
                    Decimal::new(1050, 2),
                    "USDC",
                ),
                leg("credit", TargetChain::bitcoin(), 1),
                leg("receipt", TargetChain::ethereum(), 2),
            ],
            vec![],
        )
        .await
        .unwrap();

    let intent = h.orchestrator.run_intent("transfer").await.unwrap();
    assert_eq!(intent.status, IntentStatus::Completed);
    assert_eq!(
        (intent.legs_completed, intent.legs_failed, intent.legs_pending),
        (3, 0, 0)
    );
    assert!(intent.completed_at.is_some());

    let legs = h.orchestrator.legs("transfer").await.unwrap();
    for leg in &legs {
        assert_eq!(leg.status, LegStatus::Completed);
        assert!(leg.execution_tx_hash.is_some());
        let proof = h
            .store
            .get_proof(leg.proof_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(proof.tx_hash, leg.commitment_hash());
        assert_eq!(Some(proof.anchor_reference.anchor_id), leg.anchor_id);
    }

    // same-chain legs share one batch
    let by_key: HashMap<_, _> = legs.iter().map(|l| (l.key.as_str(), l)).collect();
    assert_eq!(by_key["debit"].batch_id, by_key["receipt"].batch_id);
    assert_ne!(by_key["debit"].batch_id, by_key["credit"].batch_id);

    let summary = h.orchestrator.summary("transfer").await.unwrap();
    assert!(summary
        .chain_groups
        .iter()
        .all(|g| g.status == LegStatus::Completed && g.anchor_tx_hash.is_some()));

    let progress = h.orchestrator.progress("transfer").await.unwrap();
    assert_eq!(progress.progress_percent, 100.0);

    let timeline = h.orchestrator.timeline("transfer").await.unwrap();
    assert_eq!(timeline.last().unwrap().to_status, "completed");
    let debit_states: Vec<_> = timeline
        .iter()
        .filter(|e| e.entity_id == by_key["debit"].leg_id.to_string())
        .map(|e| e.to_status.as_str())
        .collect();
    assert_eq!(
        debit_states,
        [
            "pending",
            "ready",
            "processing",
            "batched",
            "anchored",
            "confirmed",
            "executed",
            "completed"
        ]
    );
}

#[tokio::test]
async fn test_sequential_runs_in_sequence_order() {
    let h = harness(MockLegExecutor::new()).await;
    h.orchestrator
        .discover(
            NewIntent::new("seq", ExecutionMode::Sequential),
            vec![
                leg("third", TargetChain::ethereum(), 30),
                leg("first", TargetChain::bitcoin(), 10),
                leg("second", TargetChain::ethereum(), 20),
            ],
            vec![],
        )
        .await
        .unwrap();

    let intent = h.orchestrator.run_intent("seq").await.unwrap();
    assert_eq!(intent.status, IntentStatus::Completed);
    assert_eq!(h.executor.executed(), ["first", "second", "third"]);
}

#[tokio::test]
async fn test_sequential_stops_at_first_failure() {
    let h = harness(MockLegExecutor::new().reject("b")).await;
    h.orchestrator
        .discover(
            NewIntent::new("seq-fail", ExecutionMode::Sequential),
            vec![
                leg("a", TargetChain::ethereum(), 0),
                leg("b", TargetChain::ethereum(), 1),
                leg("c", TargetChain::ethereum(), 2),
            ],
            vec![],
        )
        .await
        .unwrap();

    let intent = h.orchestrator.run_intent("seq-fail").await.unwrap();
    assert_eq!(intent.status, IntentStatus::PartialComplete);
    assert_eq!(
        (intent.legs_completed, intent.legs_failed, intent.legs_pending),
        (1, 2, 0)
    );

    let statuses = status_of(&h, "seq-fail").await;
    assert_eq!(statuses["a"], LegStatus::Completed);
    assert_eq!(statuses["b"], LegStatus::Failed);
    assert_eq!(statuses["c"], LegStatus::Skipped);
    assert_eq!(h.executor.attempts("b"), 1);
    assert_eq!(h.executor.attempts("c"), 0);
}

#[tokio::test]
async fn test_atomic_failure_rolls_back_completed_legs() {
    let h = harness(MockLegExecutor::new().always_fail("bridge")).await;
    h.orchestrator
        .discover(
            NewIntent::new("atomic", ExecutionMode::Atomic),
            vec![
                leg("lock", TargetChain::ethereum(), 0),
                leg("bridge", TargetChain::bitcoin(), 1).with_max_retries(2),
                leg("release", TargetChain::ethereum(), 2),
            ],
            vec![],
        )
        .await
        .unwrap();

    let intent = h.orchestrator.run_intent("atomic").await.unwrap();
    assert_eq!(intent.status, IntentStatus::RolledBack);
    assert_eq!(
        (intent.legs_completed, intent.legs_failed, intent.legs_pending),
        (0, 3, 0)
    );

    let statuses = status_of(&h, "atomic").await;
    assert_eq!(statuses["lock"], LegStatus::RolledBack);
    assert_eq!(statuses["bridge"], LegStatus::Failed);
    assert_eq!(statuses["release"], LegStatus::RolledBack);

    // leg-local retries: only the failing leg was re-attempted
    assert_eq!(h.executor.attempts("bridge"), 3);
    assert_eq!(h.executor.attempts("lock"), 1);
    let mut compensated = h.executor.compensated();
    compensated.sort();
    assert_eq!(compensated, ["lock", "release"]);

    let bridge = h
        .orchestrator
        .legs("atomic")
        .await
        .unwrap()
        .into_iter()
        .find(|l| l.key == "bridge")
        .unwrap();
    assert_eq!(bridge.retry_count, 2);
    assert!(bridge.execution_error.unwrap().contains("3 attempts"));
}

#[tokio::test]
async fn test_atomic_compensation_failure_fails_intent() {
    let h = harness(
        MockLegExecutor::new()
            .reject("b")
            .fail_compensation("a"),
    )
    .await;
    h.orchestrator
        .discover(
            NewIntent::new("stuck", ExecutionMode::Atomic),
            vec![
                leg("a", TargetChain::ethereum(), 0),
                leg("b", TargetChain::bitcoin(), 1),
            ],
            vec![],
        )
        .await
        .unwrap();

    let intent = h.orchestrator.run_intent("stuck").await.unwrap();
    assert_eq!(intent.status, IntentStatus::Failed);
    assert!(intent
        .error_message
        .unwrap()
        .starts_with("compensation failed for a"));
    assert_eq!(status_of(&h, "stuck").await["a"], LegStatus::Completed);
}

// ═══════════════════════════════════════════════════════════════════════════
// DEPENDENCIES AND RETRIES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_dependency_conditions() {
    let h = harness(MockLegExecutor::new().reject("a")).await;
    h.orchestrator
        .discover(
            NewIntent::new("deps", ExecutionMode::Parallel),
            vec![
                leg("a", TargetChain::ethereum(), 0),
                leg("on-success", TargetChain::ethereum(), 1),
                leg("on-completion", TargetChain::bitcoin(), 2),
                leg("on-confirmation", TargetChain::bitcoin(), 3),
            ],
            vec![
                needs("deps", "on-success", "a", DependencyCondition::Success),
                needs("deps", "on-completion", "a", DependencyCondition::Completion),
                needs("deps", "on-confirmation", "a", DependencyCondition::Confirmation),
            ],
        )
        .await
        .unwrap();

    let intent = h.orchestrator.run_intent("deps").await.unwrap();
    assert_eq!(intent.status, IntentStatus::PartialComplete);

    let statuses = status_of(&h, "deps").await;
    assert_eq!(statuses["a"], LegStatus::Failed);
    assert_eq!(statuses["on-success"], LegStatus::Skipped);
    assert_eq!(statuses["on-completion"], LegStatus::Completed);
    // a's anchor reached depth before its execution was rejected
    assert_eq!(statuses["on-confirmation"], LegStatus::Completed);

    let summary = h.orchestrator.summary("deps").await.unwrap();
    let satisfied = summary
        .dependencies
        .iter()
        .filter(|d| d.is_satisfied)
        .count();
    assert_eq!(satisfied, 2);
}

#[tokio::test]
async fn test_transient_failures_retry_within_leg() {
    let h = harness(MockLegExecutor::new().fail_times("flaky", 2)).await;
    h.orchestrator
        .discover(
            NewIntent::new("retry", ExecutionMode::Parallel),
            vec![leg("flaky", TargetChain::ethereum(), 0).with_max_retries(3)],
            vec![],
        )
        .await
        .unwrap();

    let intent = h.orchestrator.run_intent("retry").await.unwrap();
    assert_eq!(intent.status, IntentStatus::Completed);

    let leg = h.orchestrator.legs("retry").await.unwrap().remove(0);
    assert_eq!(leg.retry_count, 2);
    assert!(leg.last_retry_at.is_some());

    let retries: Vec<_> = h
        .orchestrator
        .timeline("retry")
        .await
        .unwrap()
        .into_iter()
        .filter_map(|e| e.details)
        .filter(|d| d.starts_with("retry"))
        .collect();
    assert_eq!(retries, ["retry 1 of 3", "retry 2 of 3"]);
}

// ═══════════════════════════════════════════════════════════════════════════
// DEADLINES AND GUARDS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_expire_overdue_idle_intents() {
    let h = harness(MockLegExecutor::new()).await;
    let now = current_timestamp();
    h.orchestrator
        .discover(
            NewIntent::new("late", ExecutionMode::Parallel).with_expiry(now.saturating_sub(1)),
            vec![leg("a", TargetChain::ethereum(), 0)],
            vec![],
        )
        .await
        .unwrap();
    h.orchestrator
        .discover(
            NewIntent::new("fresh", ExecutionMode::Parallel).with_expiry(now + 600),
            vec![leg("a", TargetChain::ethereum(), 0)],
            vec![],
        )
        .await
        .unwrap();

    let expired = h.orchestrator.expire_overdue(now).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].intent_id, "late");
    assert_eq!(expired[0].status, IntentStatus::Expired);
    assert_eq!(expired[0].legs_pending, 1);

    let err = h.orchestrator.run_intent("late").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidState { .. }));
    assert_eq!(h.orchestrator.active_intents().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_expiry_leaves_intent_being_run_alone() {
    let h = harness(MockLegExecutor::new().with_delay("slow", Duration::from_millis(300))).await;
    let now = current_timestamp();
    h.orchestrator
        .discover(
            NewIntent::new("in-flight", ExecutionMode::Parallel).with_expiry(now + 5),
            vec![leg("slow", TargetChain::ethereum(), 0)],
            vec![],
        )
        .await
        .unwrap();

    let run = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_intent("in-flight").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // overdue by the sweeper's clock, but claimed by the run
    assert!(h.orchestrator.expire_overdue(now + 60).await.unwrap().is_empty());
    let stored = h.store.get_intent("in-flight").await.unwrap().unwrap();
    assert!(!stored.status.is_terminal(), "{}", stored.status);

    let intent = run.await.unwrap().unwrap();
    assert_eq!(intent.status, IntentStatus::Completed);
    // settled intents are never expired afterwards
    assert!(h.orchestrator.expire_overdue(now + 60).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_running_intent_expires_at_deadline() {
    let h = harness(MockLegExecutor::new().with_delay("slow", Duration::from_secs(5))).await;
    h.orchestrator
        .discover(
            NewIntent::new("deadline", ExecutionMode::Parallel)
                .with_expiry(current_timestamp() + 1),
            vec![leg("slow", TargetChain::ethereum(), 0)],
            vec![],
        )
        .await
        .unwrap();

    let intent = h.orchestrator.run_intent("deadline").await.unwrap();
    assert_eq!(intent.status, IntentStatus::Expired);
    assert_eq!(intent.legs_pending, 1);
    assert!(intent.error_message.unwrap().contains("1 legs outstanding"));
}

#[tokio::test]
async fn test_intent_cannot_run_twice_concurrently() {
    let h = harness(MockLegExecutor::new().with_delay("slow", Duration::from_millis(300))).await;
    h.orchestrator
        .discover(
            NewIntent::new("once", ExecutionMode::Parallel),
            vec![leg("slow", TargetChain::ethereum(), 0)],
            vec![],
        )
        .await
        .unwrap();

    let first = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_intent("once").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = h.orchestrator.run_intent("once").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::AlreadyRunning(_)));
    assert_eq!(
        first.await.unwrap().unwrap().status,
        IntentStatus::Completed
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// LEG TALLIES
// ═══════════════════════════════════════════════════════════════════════════

/// Leg status changes recorded for an intent, retries excluded
async fn leg_transitions<S: LedgerStore>(store: &S, intent_id: &str) -> usize {
    store
        .intent_timeline(intent_id)
        .await
        .unwrap()
        .iter()
        .filter(|e| e.entity_kind == EntityKind::Leg)
        .filter(|e| matches!(&e.from_status, Some(from) if *from != e.to_status))
        .count()
}

#[tokio::test]
async fn test_leg_tallies_hold_after_every_transition() {
    let store = Arc::new(AuditedStore::default());
    let h = harness_with(
        store.clone(),
        MockLegExecutor::new()
            .reject("p-b")
            .always_fail("a-bridge")
            .reject("s-b"),
    )
    .await;

    h.orchestrator
        .discover(
            NewIntent::new("tally-parallel", ExecutionMode::Parallel),
            vec![
                leg("p-a", TargetChain::ethereum(), 0),
                leg("p-b", TargetChain::bitcoin(), 1),
                leg("p-c", TargetChain::ethereum(), 2),
            ],
            vec![needs("tally-parallel", "p-c", "p-b", DependencyCondition::Success)],
        )
        .await
        .unwrap();
    h.orchestrator
        .discover(
            NewIntent::new("tally-atomic", ExecutionMode::Atomic),
            vec![
                leg("a-lock", TargetChain::ethereum(), 0),
                leg("a-bridge", TargetChain::bitcoin(), 1),
                leg("a-release", TargetChain::ethereum(), 2),
            ],
            vec![],
        )
        .await
        .unwrap();
    h.orchestrator
        .discover(
            NewIntent::new("tally-sequential", ExecutionMode::Sequential),
            vec![
                leg("s-a", TargetChain::ethereum(), 0),
                leg("s-b", TargetChain::ethereum(), 1),
                leg("s-c", TargetChain::bitcoin(), 2),
            ],
            vec![],
        )
        .await
        .unwrap();

    let expected = [
        ("tally-parallel", IntentStatus::PartialComplete),
        ("tally-atomic", IntentStatus::RolledBack),
        ("tally-sequential", IntentStatus::PartialComplete),
    ];
    let mut transitions = 0;
    for (intent_id, status) in expected {
        let intent = h.orchestrator.run_intent(intent_id).await.unwrap();
        assert_eq!(intent.status, status, "{intent_id}");
        assert_eq!(intent.legs_pending, 0);
        transitions += leg_transitions(h.store.as_ref(), intent_id).await;
    }

    let statuses = status_of(&h, "tally-parallel").await;
    assert_eq!(statuses["p-c"], LegStatus::Skipped);
    let statuses = status_of(&h, "tally-atomic").await;
    assert_eq!(statuses["a-lock"], LegStatus::RolledBack);
    let statuses = status_of(&h, "tally-sequential").await;
    assert_eq!(statuses["s-c"], LegStatus::Skipped);

    // one audited intent write per leg transition, at least
    assert!(transitions > 0);
    assert!(
        store.audited() >= transitions,
        "{} intent writes for {} leg transitions",
        store.audited(),
        transitions
    );
}
