use anchor_proofs_anchoring::{
    AnchorEvent, AnchorSubmitter, BatchManager, ConfirmationTracker, UpdateOutcome,
};
use anchor_proofs_chain::{ObserverMessage, ObserverPool};
use anchor_proofs_config::{validate_config, AppConfig};
use anchor_proofs_metrics::{
    init_tracing, init_tracing_with_metrics, MetricsCollector, TracingError,
};
use anchor_proofs_orchestrator::{IntentOrchestrator, LegExecutor};
use anchor_proofs_proof::{
    AttestationService, ChainedStateProofValidator, ProofAssembler, ProofBundle, ProofQuery,
    ProofRequestService, ProofVerifier, SignatureGovernanceValidator,
};
use anchor_proofs_store::LedgerStore;
use anchor_proofs_types::{
    current_timestamp, AnchorBatch, AnchorRecord, BatchId, BatchStatus, NewTransaction, Proof,
    ProofId, ProofRequest, RequestId, RequestStatus, TargetChain, ValidatorAttestation,
    VerificationResult,
};
use ed25519_dalek::SigningKey;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::settings;

/// Every engine component wired over one store and one observer pool
///
/// Components are constructed from an [`AppConfig`]; the validator id and
/// thresholds flow into each constructor, so several engines can share a
/// process without interfering.
pub struct ProofEngine<S: LedgerStore + 'static> {
    config: AppConfig,
    store: Arc<S>,
    observers: ObserverPool,
    metrics: Arc<MetricsCollector>,

    batches: Arc<BatchManager<S>>,
    submitter: Arc<AnchorSubmitter<S>>,
    tracker: Arc<ConfirmationTracker<S>>,
    assembler: Arc<ProofAssembler<S>>,
    verifier: ProofVerifier<S>,
    attestations: AttestationService<S>,
    query: ProofQuery<S>,
    requests: ProofRequestService<S>,
    orchestrator: Arc<IntentOrchestrator<S>>,

    background: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: LedgerStore + 'static> ProofEngine<S> {
    pub fn new(
        config: AppConfig,
        store: Arc<S>,
        observers: ObserverPool,
        signing_key: SigningKey,
        executor: Arc<dyn LegExecutor>,
    ) -> Result<Self, EngineError> {
        validate_config(&config)?;

        let validator_id = config.service.validator_id.clone();
        let metrics = Arc::new(MetricsCollector::new());

        let batches = Arc::new(BatchManager::new(
            store.clone(),
            settings::batch_policy(&config.batching),
            validator_id.clone(),
            metrics.clone(),
        ));
        let submitter = Arc::new(AnchorSubmitter::new(
            batches.clone(),
            observers.clone(),
            settings::chain_policies(&config.chains),
            settings::retry_policy(&config.retry),
            metrics.clone(),
        ));
        let tracker = Arc::new(ConfirmationTracker::new(batches.clone(), metrics.clone()));
        let assembler = Arc::new(
            ProofAssembler::new(store.clone(), validator_id.clone(), metrics.clone())
                .with_proof_version(config.service.proof_version.clone()),
        );
        let verifier = ProofVerifier::new(
            store.clone(),
            Arc::new(ChainedStateProofValidator::new()),
            Arc::new(SignatureGovernanceValidator::new()),
            metrics.clone(),
        );
        let attestations =
            AttestationService::new(store.clone(), validator_id, signing_key, metrics.clone());

        let orchestrator = IntentOrchestrator::builder()
            .with_batches(batches.clone())
            .with_submitter(submitter.clone())
            .with_tracker(tracker.clone())
            .with_assembler(assembler.clone())
            .with_executor(executor)
            .with_metrics(metrics.clone())
            .with_config(settings::orchestrator_config(&config))
            .build()?;

        info!(
            validator_id = %config.service.validator_id,
            environment = ?config.service.environment,
            chains = config.chains.len(),
            "Proof engine ready"
        );

        Ok(Self {
            query: ProofQuery::new(store.clone()),
            requests: ProofRequestService::new(store.clone()),
            config,
            store,
            observers,
            metrics,
            batches,
            submitter,
            tracker,
            assembler,
            verifier,
            attestations,
            orchestrator: Arc::new(orchestrator),
            background: Mutex::new(Vec::new()),
        })
    }

    /// Install the tracing subscriber the configuration asks for
    pub fn init_logging(&self) -> Result<(), TracingError> {
        let level = &self.config.service.log_level;
        if self.config.service.metrics_enabled {
            init_tracing_with_metrics(level, self.metrics.clone())
        } else {
            init_tracing(level)
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // BACKGROUND TASKS
    // ═══════════════════════════════════════════════════════════════════════

    /// Consume pushed observer messages until the sender side closes
    pub fn listen(&self, updates: mpsc::Receiver<ObserverMessage>) {
        let handle = self.tracker.clone().spawn(updates);
        self.background.lock().unwrap().push(handle);
    }

    /// Poll every registered observer for open anchors at `interval`
    pub fn poll_confirmations(&self, interval: Duration) {
        let handle = self
            .tracker
            .clone()
            .spawn_poller(self.observers.clone(), interval);
        self.background.lock().unwrap().push(handle);
    }

    /// Stop listeners and pollers started on this engine
    pub fn shutdown(&self) {
        for handle in self.background.lock().unwrap().drain(..) {
            handle.abort();
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // BATCHES AND ANCHORS
    // ═══════════════════════════════════════════════════════════════════════

    /// Close `batch_id` if still pending, then anchor its root on `chain`
    pub async fn anchor_batch(
        &self,
        batch_id: BatchId,
        chain: &TargetChain,
    ) -> Result<AnchorRecord, EngineError> {
        let batch = self.batches.get_batch(batch_id).await?;
        if batch.status == BatchStatus::Pending {
            self.batches.close(batch_id).await?;
        }
        Ok(self.submitter.submit(batch_id, chain).await?)
    }

    /// Close every pending batch over its count or age ceiling
    pub async fn close_due_batches(&self) -> Result<Vec<AnchorBatch>, EngineError> {
        Ok(self.batches.close_due(current_timestamp()).await?)
    }

    /// Feed one observer message through the tracker directly
    pub async fn observe(&self, message: ObserverMessage) -> Result<UpdateOutcome, EngineError> {
        Ok(self.tracker.apply(message).await?)
    }

    pub fn anchor_events(&self) -> broadcast::Receiver<AnchorEvent> {
        self.tracker.subscribe()
    }

    /// Wait for the batch's anchor on `chain` to finalize, then assemble a
    /// proof for each member transaction.
    pub async fn prove_batch(
        &self,
        batch_id: BatchId,
        chain: &TargetChain,
    ) -> Result<Vec<Proof>, EngineError> {
        let anchor = self
            .store
            .anchors_for_batch(batch_id)
            .await?
            .into_iter()
            .find(|a| &a.target_chain == chain && !a.reorged)
            .ok_or_else(|| EngineError::NotAnchored {
                batch_id,
                chain: chain.clone(),
            })?;

        let timeout = self.submitter.chain_policy(chain)?.confirmation_timeout;
        self.tracker
            .wait_for_finality(anchor.anchor_id, timeout)
            .await?;
        Ok(self.assembler.materialize_batch(batch_id, chain).await?)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PROOFS
    // ═══════════════════════════════════════════════════════════════════════

    /// Verify a stored proof against the live anchor and record the outcome
    pub async fn verify_proof(&self, proof_id: ProofId) -> Result<VerificationResult, EngineError> {
        Ok(self.verifier.verify_and_record(proof_id).await?)
    }

    pub async fn attest(&self, proof_id: ProofId) -> Result<ValidatorAttestation, EngineError> {
        Ok(self.attestations.attest(proof_id).await?)
    }

    pub async fn bundle(&self, proof_id: ProofId) -> Result<ProofBundle, EngineError> {
        Ok(self.query.bundle(proof_id).await?)
    }

    /// Drive one proof request to `completed`, anchoring on `chain` when no
    /// live proof exists yet. A failure fails the request.
    pub async fn fulfill_request(
        &self,
        request_id: RequestId,
        chain: &TargetChain,
    ) -> Result<ProofRequest, EngineError> {
        let request = self.requests.start_processing(request_id).await?;
        match self.request_proof(&request, chain).await {
            Ok(proof) => {
                // answered from an existing proof without batching anything
                if self.requests.get(request_id).await?.status == RequestStatus::Processing {
                    self.requests.mark_batched(request_id, proof.batch_id).await?;
                }
                Ok(self.requests.complete(request_id, proof.proof_id).await?)
            }
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Proof request failed");
                self.requests.fail(request_id, e.to_string()).await?;
                Err(e)
            }
        }
    }

    /// Fulfill every pending request, highest priority first
    pub async fn process_pending_requests(
        &self,
        chain: &TargetChain,
    ) -> Result<Vec<ProofRequest>, EngineError> {
        let mut done = Vec::new();
        for request in self.requests.pending().await? {
            match self.fulfill_request(request.request_id, chain).await {
                Ok(request) => done.push(request),
                Err(EngineError::Store(e)) => return Err(EngineError::Store(e)),
                // already recorded on the request
                Err(_) => done.push(self.requests.get(request.request_id).await?),
            }
        }
        Ok(done)
    }

    async fn request_proof(
        &self,
        request: &ProofRequest,
        chain: &TargetChain,
    ) -> Result<Proof, EngineError> {
        let unfulfillable = |reason: String| EngineError::Unfulfillable {
            request_id: request.request_id,
            reason,
        };

        let Some(tx_hash) = request.tx_hash else {
            // account requests are answered from proofs already on file
            let account = request.account_url.clone().unwrap_or_default();
            return self
                .query
                .by_account(&account)
                .await?
                .into_iter()
                .filter(|p| !p.stale)
                .max_by_key(|p| p.created_at)
                .ok_or_else(|| unfulfillable(format!("no live proofs for {account}")));
        };

        if let Some(existing) = self
            .query
            .by_tx_hash(&tx_hash)
            .await?
            .into_iter()
            .find(|p| !p.stale)
        {
            return Ok(existing);
        }

        let account = request
            .account_url
            .clone()
            .unwrap_or_else(|| format!("request:{}", request.request_id));
        let batch = self.batches.open_batch(request.request_type).await?;
        self.batches
            .add_transaction(batch.batch_id, NewTransaction::new(tx_hash, account))
            .await?;
        self.requests
            .mark_batched(request.request_id, batch.batch_id)
            .await?;

        self.anchor_batch(batch.batch_id, chain).await?;
        self.prove_batch(batch.batch_id, chain)
            .await?
            .into_iter()
            .find(|p| p.tx_hash == tx_hash)
            .ok_or_else(|| unfulfillable("transaction missing from its batch".to_string()))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn observers(&self) -> &ObserverPool {
        &self.observers
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    pub fn batches(&self) -> &Arc<BatchManager<S>> {
        &self.batches
    }

    pub fn tracker(&self) -> &Arc<ConfirmationTracker<S>> {
        &self.tracker
    }

    pub fn assembler(&self) -> &Arc<ProofAssembler<S>> {
        &self.assembler
    }

    pub fn verifier(&self) -> &ProofVerifier<S> {
        &self.verifier
    }

    pub fn attestations(&self) -> &AttestationService<S> {
        &self.attestations
    }

    pub fn query(&self) -> &ProofQuery<S> {
        &self.query
    }

    pub fn requests(&self) -> &ProofRequestService<S> {
        &self.requests
    }

    pub fn orchestrator(&self) -> &Arc<IntentOrchestrator<S>> {
        &self.orchestrator
    }
}

impl<S: LedgerStore + 'static> Drop for ProofEngine<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
