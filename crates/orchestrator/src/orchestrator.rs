use anchor_proofs_anchoring::{AnchorSubmitter, BatchManager, ConfirmationTracker};
use anchor_proofs_metrics::{intent_span, CorrelationId, MetricsCollector};
use anchor_proofs_proof::ProofAssembler;
use anchor_proofs_retry::RetryPolicy;
use anchor_proofs_store::LedgerStore;
use anchor_proofs_types::{
    current_timestamp, ChainGroup, EntityKind, Intent, IntentLeg, IntentLegProgress,
    IntentLegSummary, IntentStatus, LegDependency, LegId, LegStatus, NewDependency, NewIntent,
    NewLeg, TargetChain, TimelineEvent,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::error::OrchestratorError;
use crate::executor::LegExecutor;
use crate::graph::LegGraph;
use crate::pipeline::LegPipeline;
use crate::scheduler::{finish_intent, IntentRun};

/// Configuration for the orchestrator
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Retries for legs discovered without their own limit
    pub default_max_retries: u32,

    /// Deadline given to intents discovered without one (seconds)
    pub default_deadline_secs: Option<u64>,

    /// Backoff between leg execution attempts
    pub leg_retry: RetryPolicy,

    /// Buffered progress reports per running intent
    pub report_capacity: usize,
}

impl OrchestratorConfig {
    pub fn with_default_max_retries(mut self, retries: u32) -> Self {
        self.default_max_retries = retries;
        self
    }

    pub fn with_default_deadline(mut self, secs: Option<u64>) -> Self {
        self.default_deadline_secs = secs;
        self
    }

    pub fn with_leg_retry(mut self, policy: RetryPolicy) -> Self {
        self.leg_retry = policy;
        self
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 3,
            default_deadline_secs: Some(3600),
            leg_retry: RetryPolicy::default(),
            report_capacity: 256,
        }
    }
}

/// Builder error
#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("missing required field: {field}")]
    MissingField { field: String },
}

fn missing(field: &str) -> BuilderError {
    BuilderError::MissingField {
        field: field.to_string(),
    }
}

/// Builder for IntentOrchestrator
pub struct IntentOrchestratorBuilder<S: LedgerStore + 'static> {
    batches: Option<Arc<BatchManager<S>>>,
    submitter: Option<Arc<AnchorSubmitter<S>>>,
    tracker: Option<Arc<ConfirmationTracker<S>>>,
    assembler: Option<Arc<ProofAssembler<S>>>,
    executor: Option<Arc<dyn LegExecutor>>,
    metrics: Option<Arc<MetricsCollector>>,
    config: OrchestratorConfig,
}

impl<S: LedgerStore + 'static> IntentOrchestratorBuilder<S> {
    pub fn new() -> Self {
        Self {
            batches: None,
            submitter: None,
            tracker: None,
            assembler: None,
            executor: None,
            metrics: None,
            config: OrchestratorConfig::default(),
        }
    }

    /// Batch manager; its store also holds intents and legs
    pub fn with_batches(mut self, batches: Arc<BatchManager<S>>) -> Self {
        self.batches = Some(batches);
        self
    }

    pub fn with_submitter(mut self, submitter: Arc<AnchorSubmitter<S>>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<ConfirmationTracker<S>>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_assembler(mut self, assembler: Arc<ProofAssembler<S>>) -> Self {
        self.assembler = Some(assembler);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn LegExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the IntentOrchestrator, validating that all required fields are set
    pub fn build(self) -> Result<IntentOrchestrator<S>, BuilderError> {
        let batches = self.batches.ok_or_else(|| missing("batches"))?;
        let submitter = self.submitter.ok_or_else(|| missing("submitter"))?;
        let tracker = self.tracker.ok_or_else(|| missing("tracker"))?;
        let assembler = self.assembler.ok_or_else(|| missing("assembler"))?;
        let executor = self.executor.ok_or_else(|| missing("executor"))?;
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(MetricsCollector::new()));

        Ok(IntentOrchestrator {
            store: batches.store().clone(),
            pipeline: Arc::new(LegPipeline {
                batches,
                submitter,
                tracker,
                assembler,
                executor,
                leg_retry: self.config.leg_retry,
            }),
            config: self.config,
            metrics,
            running: Mutex::new(HashSet::new()),
        })
    }
}

impl<S: LedgerStore + 'static> Default for IntentOrchestratorBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks an intent as being run by this orchestrator until dropped
struct RunGuard<'a> {
    running: &'a Mutex<HashSet<String>>,
    intent_id: String,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.lock().unwrap().remove(&self.intent_id);
    }
}

/// Discovers multi-leg intents and drives their legs to a settled outcome
pub struct IntentOrchestrator<S: LedgerStore + 'static> {
    store: Arc<S>,
    pipeline: Arc<LegPipeline<S>>,
    config: OrchestratorConfig,
    metrics: Arc<MetricsCollector>,
    running: Mutex<HashSet<String>>,
}

impl<S: LedgerStore + 'static> IntentOrchestrator<S> {
    pub fn builder() -> IntentOrchestratorBuilder<S> {
        IntentOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validate the dependency graph and persist the intent with every leg,
    /// edge and chain group, or nothing at all.
    pub async fn discover(
        &self,
        new: NewIntent,
        legs: Vec<NewLeg>,
        dependencies: Vec<NewDependency>,
    ) -> Result<Intent, OrchestratorError> {
        let invalid = |reason| OrchestratorError::InvalidDependencyGraph {
            intent_id: new.intent_id.clone(),
            reason,
        };
        let graph = LegGraph::build(&new.intent_id, &legs, &dependencies).map_err(invalid)?;
        graph.topological_order().map_err(invalid)?;

        let now = current_timestamp();
        let leg_count = legs.len() as u32;
        let intent = Intent {
            intent_id: new.intent_id.clone(),
            operation_id: new.operation_id,
            user_id: new.user_id,
            account_url: new.account_url,
            execution_mode: new.execution_mode,
            proof_class: new.proof_class,
            status: IntentStatus::Discovered,
            leg_count,
            legs_completed: 0,
            legs_failed: 0,
            legs_pending: leg_count,
            current_leg_index: 0,
            intent_data: new.intent_data,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            expires_at: new
                .expires_at
                .or_else(|| self.config.default_deadline_secs.map(|secs| now + secs)),
        };

        let legs: Vec<IntentLeg> = legs
            .into_iter()
            .enumerate()
            .map(|(i, leg)| IntentLeg {
                leg_id: Uuid::new_v4(),
                intent_id: new.intent_id.clone(),
                key: leg.key,
                leg_index: i as u32,
                target_chain: leg.target_chain,
                role: leg.role,
                sequence_order: leg.sequence_order,
                from_address: leg.from_address,
                to_address: leg.to_address,
                amount: leg.amount,
                token_symbol: leg.token_symbol,
                payload: leg.payload,
                status: LegStatus::Pending,
                execution_tx_hash: None,
                execution_block: None,
                execution_error: None,
                batch_id: None,
                anchor_id: None,
                proof_id: None,
                retry_count: 0,
                max_retries: leg.max_retries.unwrap_or(self.config.default_max_retries),
                last_retry_at: None,
                created_at: now,
                updated_at: now,
                started_at: None,
                completed_at: None,
            })
            .collect();

        let edges: Vec<LegDependency> = graph
            .edges()
            .iter()
            .map(|edge| LegDependency {
                dependency_id: Uuid::new_v4(),
                intent_id: new.intent_id.clone(),
                leg_id: legs[edge.leg].leg_id,
                depends_on_leg_id: legs[edge.depends_on].leg_id,
                condition: edge.condition,
                is_satisfied: false,
                satisfied_at: None,
                created_at: now,
            })
            .collect();

        let mut by_chain: BTreeMap<TargetChain, Vec<LegId>> = BTreeMap::new();
        for leg in &legs {
            by_chain
                .entry(leg.target_chain.clone())
                .or_default()
                .push(leg.leg_id);
        }
        let groups: Vec<ChainGroup> = by_chain
            .into_iter()
            .map(|(target_chain, leg_ids)| ChainGroup {
                group_id: Uuid::new_v4(),
                intent_id: new.intent_id.clone(),
                target_chain,
                leg_ids,
                status: LegStatus::Pending,
                batch_id: None,
                anchor_id: None,
                anchor_tx_hash: None,
                created_at: now,
                anchored_at: None,
                completed_at: None,
            })
            .collect();

        self.store
            .create_intent_graph(&intent, &legs, &edges, &groups)
            .await?;

        self.store
            .record_event(
                &TimelineEvent::new(
                    EntityKind::Intent,
                    &intent.intent_id,
                    None,
                    intent.status.as_str(),
                    now,
                )
                .with_intent(intent.intent_id.clone())
                .with_details(format!("{} legs, {} dependencies", legs.len(), edges.len())),
            )
            .await?;
        for leg in &legs {
            self.store
                .record_event(
                    &TimelineEvent::new(
                        EntityKind::Leg,
                        leg.leg_id,
                        None,
                        leg.status.as_str(),
                        now,
                    )
                    .with_intent(leg.intent_id.clone()),
                )
                .await?;
        }
        self.metrics.record_intent_discovered();

        info!(
            intent_id = %intent.intent_id,
            mode = ?intent.execution_mode,
            legs = legs.len(),
            chain_groups = groups.len(),
            "Intent discovered"
        );
        Ok(intent)
    }

    /// Run an intent until every leg settles, rollback completes or its
    /// deadline passes. Returns the intent in its terminal status.
    pub async fn run_intent(&self, intent_id: &str) -> Result<Intent, OrchestratorError> {
        let _guard = self.claim(intent_id)?;
        let span = intent_span(intent_id, CorrelationId::new());
        async {
            let run = IntentRun::load(
                self.store.clone(),
                self.pipeline.clone(),
                self.metrics.clone(),
                intent_id,
                self.config.report_capacity,
            )
            .await?;
            run.drive().await
        }
        .instrument(span)
        .await
    }

    /// Expire every idle intent whose deadline is at or before `now`.
    ///
    /// Intents being run here are skipped; their scheduler enforces the
    /// deadline itself. Each expiry holds the intent's run claim, so a
    /// concurrent `run_intent` is refused until the row is terminal.
    pub async fn expire_overdue(&self, now: u64) -> Result<Vec<Intent>, OrchestratorError> {
        let mut expired = Vec::new();
        for listed in self.store.list_active_intents().await? {
            if !listed.is_expired(now) {
                continue;
            }
            let Ok(_guard) = self.claim(&listed.intent_id) else {
                continue;
            };
            // re-read under the claim; a run may have settled it meanwhile
            let Some(intent) = self.store.get_intent(&listed.intent_id).await? else {
                continue;
            };
            if intent.status.is_terminal() || !intent.is_expired(now) {
                continue;
            }

            warn!(intent_id = %intent.intent_id, expires_at = ?intent.expires_at, "Expiring overdue intent");
            let message = format!(
                "deadline passed with {} legs outstanding",
                intent.legs_pending
            );
            expired.push(
                finish_intent(
                    self.store.as_ref(),
                    &self.metrics,
                    intent,
                    IntentStatus::Expired,
                    Some(message),
                )
                .await?,
            );
        }
        Ok(expired)
    }

    fn claim(&self, intent_id: &str) -> Result<RunGuard<'_>, OrchestratorError> {
        if !self.running.lock().unwrap().insert(intent_id.to_string()) {
            return Err(OrchestratorError::AlreadyRunning(intent_id.to_string()));
        }
        Ok(RunGuard {
            running: &self.running,
            intent_id: intent_id.to_string(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn get_intent(&self, intent_id: &str) -> Result<Intent, OrchestratorError> {
        self.store
            .get_intent(intent_id)
            .await?
            .ok_or_else(|| OrchestratorError::IntentNotFound(intent_id.to_string()))
    }

    pub async fn legs(&self, intent_id: &str) -> Result<Vec<IntentLeg>, OrchestratorError> {
        Ok(self.store.legs_for_intent(intent_id).await?)
    }

    pub async fn leg(&self, leg_id: LegId) -> Result<IntentLeg, OrchestratorError> {
        self.store
            .get_leg(leg_id)
            .await?
            .ok_or(OrchestratorError::LegNotFound(leg_id))
    }

    pub async fn progress(&self, intent_id: &str) -> Result<IntentLegProgress, OrchestratorError> {
        Ok(IntentLegProgress::from_intent(
            &self.get_intent(intent_id).await?,
        ))
    }

    pub async fn summary(&self, intent_id: &str) -> Result<IntentLegSummary, OrchestratorError> {
        Ok(IntentLegSummary {
            intent: self.get_intent(intent_id).await?,
            legs: self.store.legs_for_intent(intent_id).await?,
            chain_groups: self.store.chain_groups_for_intent(intent_id).await?,
            dependencies: self.store.dependencies_for_intent(intent_id).await?,
        })
    }

    /// Status changes of the intent and its legs, oldest first
    pub async fn timeline(&self, intent_id: &str) -> Result<Vec<TimelineEvent>, OrchestratorError> {
        Ok(self.store.intent_timeline(intent_id).await?)
    }

    pub async fn intents_for_user(&self, user_id: &str) -> Result<Vec<Intent>, OrchestratorError> {
        Ok(self.store.list_intents_by_user(user_id).await?)
    }

    pub async fn active_intents(&self) -> Result<Vec<Intent>, OrchestratorError> {
        Ok(self.store.list_active_intents().await?)
    }
}
