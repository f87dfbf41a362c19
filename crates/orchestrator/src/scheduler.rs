use anchor_proofs_metrics::MetricsCollector;
use anchor_proofs_store::LedgerStore;
use anchor_proofs_types::{
    current_timestamp, ChainGroup, DependencyCondition, EntityKind, ExecutionMode, Intent,
    IntentLeg, IntentStatus, LegDependency, LegId, LegStatus, TargetChain, TimelineEvent,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::aggregate::{running_status, settled_status, LegCounters};
use crate::error::OrchestratorError;
use crate::pipeline::{LegPipeline, LegReport};

enum Readiness {
    Waiting,
    Satisfied,
    Unsatisfiable(String),
}

/// Single-writer run of one intent
///
/// Chain group tasks only report progress over a channel; every leg, group
/// and intent row of the intent is written from here, so the aggregate
/// counters are recomputed after each leg transition without races.
pub(crate) struct IntentRun<S: LedgerStore + 'static> {
    store: Arc<S>,
    pipeline: Arc<LegPipeline<S>>,
    metrics: Arc<MetricsCollector>,
    intent: Intent,
    legs: Vec<IntentLeg>,
    by_id: HashMap<LegId, usize>,
    dependencies: Vec<LegDependency>,
    groups: Vec<ChainGroup>,
    in_flight: usize,
    tasks: JoinSet<()>,
    report_capacity: usize,
}

impl<S: LedgerStore + 'static> IntentRun<S> {
    pub async fn load(
        store: Arc<S>,
        pipeline: Arc<LegPipeline<S>>,
        metrics: Arc<MetricsCollector>,
        intent_id: &str,
        report_capacity: usize,
    ) -> Result<Self, OrchestratorError> {
        let intent = store
            .get_intent(intent_id)
            .await?
            .ok_or_else(|| OrchestratorError::IntentNotFound(intent_id.to_string()))?;
        if intent.status.is_terminal() {
            return Err(OrchestratorError::InvalidState {
                intent_id: intent.intent_id,
                status: intent.status,
                operation: "run",
            });
        }

        let legs = store.legs_for_intent(intent_id).await?;
        let by_id = legs.iter().enumerate().map(|(i, l)| (l.leg_id, i)).collect();
        let dependencies = store.dependencies_for_intent(intent_id).await?;
        let groups = store.chain_groups_for_intent(intent_id).await?;

        Ok(Self {
            store,
            pipeline,
            metrics,
            intent,
            legs,
            by_id,
            dependencies,
            groups,
            in_flight: 0,
            tasks: JoinSet::new(),
            report_capacity: report_capacity.max(1),
        })
    }

    /// Schedule legs until every leg settles or the deadline passes
    pub async fn drive(mut self) -> Result<Intent, OrchestratorError> {
        let (reports, mut inbox) = mpsc::channel(self.report_capacity);
        self.start().await?;
        let deadline = self.deadline();

        loop {
            if self.intent.is_expired(current_timestamp()) {
                return self.expire().await;
            }
            if !self.halted() {
                self.schedule(&reports).await?;
            }
            if self.in_flight == 0 {
                break;
            }

            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, inbox.recv()).await {
                    Ok(next) => next,
                    Err(_) => return self.expire().await,
                },
                None => inbox.recv().await,
            };
            match next {
                Some(report) => self.apply(report).await?,
                None => break,
            }
        }

        self.settle().await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SCHEDULING
    // ═══════════════════════════════════════════════════════════════════════

    async fn start(&mut self) -> Result<(), OrchestratorError> {
        // legs caught mid-flight by an earlier run cannot be resumed
        for i in 0..self.legs.len() {
            if matches!(
                self.legs[i].status,
                LegStatus::Processing
                    | LegStatus::Batched
                    | LegStatus::Anchored
                    | LegStatus::Confirmed
                    | LegStatus::Executed
            ) {
                self.transition(i, LegStatus::Failed, |leg, _| {
                    leg.execution_error = Some("interrupted before completion".to_string());
                })
                .await?;
            }
        }

        if self.intent.status == IntentStatus::Discovered {
            self.set_intent_status(IntentStatus::Processing).await?;
        }
        info!(
            intent_id = %self.intent.intent_id,
            mode = ?self.intent.execution_mode,
            legs = self.legs.len(),
            "Running intent"
        );
        Ok(())
    }

    fn deadline(&self) -> Option<Instant> {
        let expires_at = self.intent.expires_at?;
        let remaining = expires_at.saturating_sub(current_timestamp());
        Some(Instant::now() + Duration::from_secs(remaining))
    }

    /// Whether a leg failure stops new legs from starting
    fn halted(&self) -> bool {
        match self.intent.execution_mode {
            ExecutionMode::Parallel => false,
            ExecutionMode::Sequential | ExecutionMode::Atomic => {
                self.legs.iter().any(|l| l.status.is_failure())
            }
        }
    }

    async fn schedule(&mut self, reports: &mpsc::Sender<LegReport>) -> Result<(), OrchestratorError> {
        // a skip can make further legs unsatisfiable; repeat until stable
        loop {
            let mut changed = false;
            for i in 0..self.legs.len() {
                if self.legs[i].status != LegStatus::Pending {
                    continue;
                }
                match self.readiness(i).await? {
                    Readiness::Waiting => {}
                    Readiness::Satisfied => {
                        self.mark_dependencies_satisfied(i).await?;
                        self.transition(i, LegStatus::Ready, |_, _| {}).await?;
                        changed = true;
                    }
                    Readiness::Unsatisfiable(reason) => {
                        self.transition(i, LegStatus::Skipped, |leg, _| {
                            leg.execution_error = Some(reason);
                        })
                        .await?;
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }

        if self.halted() {
            return Ok(());
        }

        let launch: Vec<usize> = match self.intent.execution_mode {
            ExecutionMode::Sequential => {
                if self.in_flight > 0 {
                    return Ok(());
                }
                // strictly the next leg in sequence order, once it is ready
                (0..self.legs.len())
                    .filter(|&i| !self.legs[i].status.is_terminal())
                    .min_by_key(|&i| (self.legs[i].sequence_order, self.legs[i].leg_index))
                    .filter(|&i| self.legs[i].status == LegStatus::Ready)
                    .into_iter()
                    .collect()
            }
            ExecutionMode::Parallel | ExecutionMode::Atomic => (0..self.legs.len())
                .filter(|&i| self.legs[i].status == LegStatus::Ready)
                .collect(),
        };

        if !launch.is_empty() {
            self.launch(launch, reports).await?;
        }
        Ok(())
    }

    async fn readiness(&self, i: usize) -> Result<Readiness, OrchestratorError> {
        let leg_id = self.legs[i].leg_id;
        let mut readiness = Readiness::Satisfied;

        for dep in self.dependencies.iter().filter(|d| d.leg_id == leg_id) {
            let Some(&up) = self.by_id.get(&dep.depends_on_leg_id) else {
                return Ok(Readiness::Unsatisfiable(format!(
                    "upstream leg {} is missing",
                    dep.depends_on_leg_id
                )));
            };
            match self.condition(dep.condition, &self.legs[up]).await? {
                Readiness::Satisfied => {}
                Readiness::Waiting => readiness = Readiness::Waiting,
                unsatisfiable => return Ok(unsatisfiable),
            }
        }
        Ok(readiness)
    }

    async fn condition(
        &self,
        condition: DependencyCondition,
        upstream: &IntentLeg,
    ) -> Result<Readiness, OrchestratorError> {
        let status = upstream.status;
        let blocked = || {
            Readiness::Unsatisfiable(format!("upstream leg {} ended {}", upstream.key, status))
        };

        Ok(match condition {
            DependencyCondition::Success => match status {
                LegStatus::Completed => Readiness::Satisfied,
                s if s.is_failure() => blocked(),
                _ => Readiness::Waiting,
            },
            DependencyCondition::Completion if status.is_terminal() => Readiness::Satisfied,
            DependencyCondition::Completion => Readiness::Waiting,
            DependencyCondition::Confirmation => match status {
                LegStatus::Confirmed | LegStatus::Executed | LegStatus::Completed => {
                    Readiness::Satisfied
                }
                s if s.is_terminal() => {
                    // failed after its anchor may still have reached depth
                    if self.anchor_is_final(upstream).await? {
                        Readiness::Satisfied
                    } else {
                        blocked()
                    }
                }
                _ => Readiness::Waiting,
            },
        })
    }

    async fn anchor_is_final(&self, leg: &IntentLeg) -> Result<bool, OrchestratorError> {
        let Some(anchor_id) = leg.anchor_id else {
            return Ok(false);
        };
        Ok(self
            .store
            .get_anchor(anchor_id)
            .await?
            .is_some_and(|a| a.is_final && !a.reorged))
    }

    async fn mark_dependencies_satisfied(&mut self, i: usize) -> Result<(), OrchestratorError> {
        let leg_id = self.legs[i].leg_id;
        let now = current_timestamp();
        for dep in self
            .dependencies
            .iter_mut()
            .filter(|d| d.leg_id == leg_id && !d.is_satisfied)
        {
            dep.is_satisfied = true;
            dep.satisfied_at = Some(now);
            self.store.update_dependency(dep).await?;
        }
        Ok(())
    }

    /// Start ready legs, one task per target chain
    async fn launch(
        &mut self,
        indices: Vec<usize>,
        reports: &mpsc::Sender<LegReport>,
    ) -> Result<(), OrchestratorError> {
        let mut by_chain: BTreeMap<TargetChain, Vec<usize>> = BTreeMap::new();
        for i in indices {
            by_chain
                .entry(self.legs[i].target_chain.clone())
                .or_default()
                .push(i);
        }

        for (chain, members) in by_chain {
            for &i in &members {
                self.intent.current_leg_index = self.legs[i].leg_index;
                self.transition(i, LegStatus::Processing, |leg, now| {
                    leg.started_at = Some(now);
                })
                .await?;
            }

            let legs: Vec<IntentLeg> = members.iter().map(|&i| self.legs[i].clone()).collect();
            self.in_flight += legs.len();
            info!(
                intent_id = %self.intent.intent_id,
                chain = %chain,
                legs = legs.len(),
                "Launching chain group"
            );
            self.tasks.spawn(self.pipeline.clone().run_group(
                chain,
                self.intent.proof_class,
                legs,
                reports.clone(),
            ));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // REPORTS
    // ═══════════════════════════════════════════════════════════════════════

    async fn apply(&mut self, report: LegReport) -> Result<(), OrchestratorError> {
        match report {
            LegReport::Batched { leg_ids, batch_id } => {
                for &leg_id in &leg_ids {
                    let i = self.index_of(leg_id)?;
                    self.transition(i, LegStatus::Batched, |leg, _| {
                        leg.batch_id = Some(batch_id);
                    })
                    .await?;
                }
                self.update_group(&leg_ids, |group, _| {
                    group.batch_id = Some(batch_id);
                    group.status = LegStatus::Batched;
                })
                .await?;
            }
            LegReport::Anchored { leg_ids, anchor } => {
                for &leg_id in &leg_ids {
                    let i = self.index_of(leg_id)?;
                    self.transition(i, LegStatus::Anchored, |leg, _| {
                        leg.anchor_id = Some(anchor.anchor_id);
                    })
                    .await?;
                }
                self.update_group(&leg_ids, |group, now| {
                    group.anchor_id = Some(anchor.anchor_id);
                    group.anchor_tx_hash = Some(anchor.anchor_tx_hash.clone());
                    group.anchored_at = Some(now);
                    group.status = LegStatus::Anchored;
                })
                .await?;
            }
            LegReport::Confirmed { leg_id, proof_id } => {
                let i = self.index_of(leg_id)?;
                self.transition(i, LegStatus::Confirmed, |leg, _| {
                    leg.proof_id = Some(proof_id);
                })
                .await?;
            }
            LegReport::Retrying { leg_id, attempt } => {
                let i = self.index_of(leg_id)?;
                self.record_retry(i, attempt).await?;
            }
            LegReport::Executed { leg_id, receipt } => {
                let i = self.index_of(leg_id)?;
                self.transition(i, LegStatus::Executed, |leg, _| {
                    leg.execution_tx_hash = Some(receipt.tx_hash);
                    leg.execution_block = receipt.block;
                })
                .await?;
                self.transition(i, LegStatus::Completed, |leg, now| {
                    leg.completed_at = Some(now);
                })
                .await?;
                self.in_flight = self.in_flight.saturating_sub(1);
                self.settle_group(i).await?;
            }
            LegReport::Failed { leg_ids, error } => {
                for leg_id in leg_ids {
                    let i = self.index_of(leg_id)?;
                    if self.legs[i].status.is_terminal() {
                        continue;
                    }
                    warn!(
                        intent_id = %self.intent.intent_id,
                        leg = %self.legs[i].key,
                        error = %error,
                        "Leg failed"
                    );
                    let reason = error.clone();
                    self.transition(i, LegStatus::Failed, |leg, _| {
                        leg.execution_error = Some(reason);
                    })
                    .await?;
                    self.in_flight = self.in_flight.saturating_sub(1);
                    self.settle_group(i).await?;
                }
            }
        }
        Ok(())
    }

    fn index_of(&self, leg_id: LegId) -> Result<usize, OrchestratorError> {
        self.by_id
            .get(&leg_id)
            .copied()
            .ok_or(OrchestratorError::LegNotFound(leg_id))
    }

    async fn record_retry(&mut self, i: usize, attempt: u32) -> Result<(), OrchestratorError> {
        let now = current_timestamp();
        let leg = &mut self.legs[i];
        leg.retry_count = attempt;
        leg.last_retry_at = Some(now);
        leg.updated_at = now;
        self.store.update_leg(leg).await?;

        let event = TimelineEvent::new(
            EntityKind::Leg,
            leg.leg_id,
            Some(leg.status.as_str()),
            leg.status.as_str(),
            now,
        )
        .with_intent(leg.intent_id.clone())
        .with_details(format!("retry {} of {}", attempt, leg.max_retries));
        self.store.record_event(&event).await?;
        self.metrics.record_leg_retry();

        debug!(leg_id = %leg.leg_id, attempt = attempt, "Retrying leg execution");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SETTLEMENT
    // ═══════════════════════════════════════════════════════════════════════

    async fn settle(mut self) -> Result<Intent, OrchestratorError> {
        let halted = self.halted();
        let reason = match self.intent.execution_mode {
            ExecutionMode::Sequential if halted => "an earlier leg failed",
            ExecutionMode::Atomic if halted => "atomic intent aborted",
            _ => "dependencies can never be satisfied",
        };
        for i in 0..self.legs.len() {
            if !self.legs[i].status.is_terminal() {
                self.transition(i, LegStatus::Skipped, |leg, _| {
                    leg.execution_error = Some(reason.to_string());
                })
                .await?;
                self.settle_group(i).await?;
            }
        }

        let cause = self
            .legs
            .iter()
            .filter(|l| l.status.is_failure())
            .find_map(|l| l.execution_error.clone());

        if self.intent.execution_mode == ExecutionMode::Atomic
            && self.legs.iter().any(|l| l.status.is_failure())
        {
            return self.roll_back(cause).await;
        }

        let counters = LegCounters::tally(self.legs.iter().map(|l| l.status));
        let status = settled_status(&counters).unwrap_or(IntentStatus::Failed);
        self.finish(status, cause).await
    }

    /// Compensate completed legs, most recently completed first
    async fn roll_back(mut self, cause: Option<String>) -> Result<Intent, OrchestratorError> {
        let mut completed: Vec<usize> = (0..self.legs.len())
            .filter(|&i| self.legs[i].status == LegStatus::Completed)
            .collect();
        completed.sort_by_key(|&i| (self.legs[i].completed_at, self.legs[i].leg_index));
        completed.reverse();

        let mut stuck = Vec::new();
        for i in completed {
            match self.pipeline.executor.compensate(&self.legs[i]).await {
                Ok(()) => {
                    self.transition(i, LegStatus::RolledBack, |_, _| {}).await?;
                    self.metrics.record_leg_rolled_back();
                    self.settle_group(i).await?;
                }
                Err(e) => {
                    error!(
                        intent_id = %self.intent.intent_id,
                        leg = %self.legs[i].key,
                        error = %e,
                        "Compensation failed"
                    );
                    stuck.push(format!("{}: {}", self.legs[i].key, e));
                }
            }
        }

        if stuck.is_empty() {
            self.finish(IntentStatus::RolledBack, cause).await
        } else {
            let message = format!("compensation failed for {}", stuck.join(", "));
            self.finish(IntentStatus::Failed, Some(message)).await
        }
    }

    async fn expire(mut self) -> Result<Intent, OrchestratorError> {
        self.tasks.abort_all();
        let outstanding = self.legs.iter().filter(|l| !l.status.is_terminal()).count();
        warn!(
            intent_id = %self.intent.intent_id,
            outstanding = outstanding,
            "Intent deadline passed"
        );
        let message = format!("deadline passed with {outstanding} legs outstanding");
        self.finish(IntentStatus::Expired, Some(message)).await
    }

    async fn finish(
        self,
        status: IntentStatus,
        error: Option<String>,
    ) -> Result<Intent, OrchestratorError> {
        finish_intent(
            self.store.as_ref(),
            &self.metrics,
            self.intent.clone(),
            status,
            error,
        )
        .await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // WRITES
    // ═══════════════════════════════════════════════════════════════════════

    /// Move one leg, record it, and refresh the intent's tallies
    async fn transition(
        &mut self,
        i: usize,
        next: LegStatus,
        edit: impl FnOnce(&mut IntentLeg, u64),
    ) -> Result<(), OrchestratorError> {
        let now = current_timestamp();
        {
            let leg = &mut self.legs[i];
            let from = leg.status;
            if !from.can_transition_to(next) {
                return Err(OrchestratorError::InvalidLegTransition {
                    leg_id: leg.leg_id,
                    from,
                    to: next,
                });
            }

            leg.status = next;
            leg.updated_at = now;
            edit(leg, now);
            self.store.update_leg(leg).await?;

            let mut event = TimelineEvent::new(
                EntityKind::Leg,
                leg.leg_id,
                Some(from.as_str()),
                next.as_str(),
                now,
            )
            .with_intent(leg.intent_id.clone());
            if next.is_failure() {
                if let Some(error) = &leg.execution_error {
                    event = event.with_details(error.clone());
                }
            }
            if let (LegStatus::Executed, Some(tx)) = (next, &leg.execution_tx_hash) {
                event = event.with_tx_hash(tx.clone());
            }
            self.store.record_event(&event).await?;

            debug!(leg_id = %leg.leg_id, from = %from, to = %next, "Leg transition");
        }
        self.refresh_intent(now).await
    }

    async fn refresh_intent(&mut self, now: u64) -> Result<(), OrchestratorError> {
        let counters = LegCounters::tally(self.legs.iter().map(|l| l.status));
        counters.write_to(&mut self.intent);

        let current = self.intent.status;
        if !current.is_terminal() && current != IntentStatus::Discovered {
            let next = running_status(self.legs.iter().map(|l| l.status));
            if next != current {
                self.intent.status = next;
                self.record_intent_event(current, next, now).await?;
            }
        }

        self.intent.updated_at = now;
        self.store.update_intent(&self.intent).await?;
        Ok(())
    }

    async fn set_intent_status(&mut self, status: IntentStatus) -> Result<(), OrchestratorError> {
        let now = current_timestamp();
        let from = self.intent.status;
        self.intent.status = status;
        self.intent.updated_at = now;
        self.store.update_intent(&self.intent).await?;
        self.record_intent_event(from, status, now).await
    }

    async fn record_intent_event(
        &self,
        from: IntentStatus,
        to: IntentStatus,
        now: u64,
    ) -> Result<(), OrchestratorError> {
        let event = TimelineEvent::new(
            EntityKind::Intent,
            &self.intent.intent_id,
            Some(from.as_str()),
            to.as_str(),
            now,
        )
        .with_intent(self.intent.intent_id.clone());
        self.store.record_event(&event).await?;
        Ok(())
    }

    async fn update_group(
        &mut self,
        leg_ids: &[LegId],
        edit: impl FnOnce(&mut ChainGroup, u64),
    ) -> Result<(), OrchestratorError> {
        let Some(&first) = leg_ids.first() else {
            return Ok(());
        };
        let i = self.index_of(first)?;
        let chain = self.legs[i].target_chain.clone();
        if let Some(group) = self.groups.iter_mut().find(|g| g.target_chain == chain) {
            edit(group, current_timestamp());
            self.store.update_chain_group(group).await?;
        }
        Ok(())
    }

    /// Close out a chain group once each of its legs is terminal
    async fn settle_group(&mut self, i: usize) -> Result<(), OrchestratorError> {
        let chain = self.legs[i].target_chain.clone();
        let Some(g) = self.groups.iter().position(|g| g.target_chain == chain) else {
            return Ok(());
        };

        let statuses: Vec<LegStatus> = self.groups[g]
            .leg_ids
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .map(|&i| self.legs[i].status)
            .collect();
        if !statuses.iter().all(LegStatus::is_terminal) {
            return Ok(());
        }

        let outcome = if statuses.iter().all(|s| *s == LegStatus::Completed) {
            LegStatus::Completed
        } else if statuses.contains(&LegStatus::RolledBack) {
            LegStatus::RolledBack
        } else if statuses.contains(&LegStatus::Failed) {
            LegStatus::Failed
        } else {
            LegStatus::Skipped
        };

        let group = &mut self.groups[g];
        if group.status != outcome {
            group.status = outcome;
            group.completed_at = Some(current_timestamp());
            self.store.update_chain_group(group).await?;
        }
        Ok(())
    }
}

/// Write a terminal intent status, unless the stored row already has one
pub(crate) async fn finish_intent<S: LedgerStore + ?Sized>(
    store: &S,
    metrics: &MetricsCollector,
    mut intent: Intent,
    status: IntentStatus,
    error: Option<String>,
) -> Result<Intent, OrchestratorError> {
    if let Some(stored) = store.get_intent(&intent.intent_id).await? {
        if stored.status.is_terminal() {
            return Ok(stored);
        }
    }

    let now = current_timestamp();
    let from = intent.status;
    intent.status = status;
    intent.completed_at = Some(now);
    intent.updated_at = now;
    if error.is_some() {
        intent.error_message = error;
    }
    store.update_intent(&intent).await?;

    let mut event = TimelineEvent::new(
        EntityKind::Intent,
        &intent.intent_id,
        Some(from.as_str()),
        status.as_str(),
        now,
    )
    .with_intent(intent.intent_id.clone());
    if let Some(error) = &intent.error_message {
        event = event.with_details(error.clone());
    }
    store.record_event(&event).await?;
    metrics.record_intent_status(status);

    info!(
        intent_id = %intent.intent_id,
        status = %status,
        completed = intent.legs_completed,
        failed = intent.legs_failed,
        pending = intent.legs_pending,
        "Intent settled"
    );
    Ok(intent)
}
