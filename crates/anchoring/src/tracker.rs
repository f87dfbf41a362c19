use anchor_proofs_chain::{
    ChainError, ConfirmationUpdate, ObserverMessage, ObserverPool, ReorgNotice,
};
use anchor_proofs_metrics::MetricsCollector;
use anchor_proofs_store::LedgerStore;
use anchor_proofs_types::{
    current_timestamp, AnchorId, AnchorRecord, BatchId, EntityKind, TargetChain, TimelineEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::batch::BatchManager;
use crate::error::AnchoringError;
use crate::locks::KeyedLocks;

const EVENT_CAPACITY: usize = 1024;

/// Published whenever the tracker changes an anchor record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorEvent {
    ConfirmationsAdvanced {
        anchor_id: AnchorId,
        batch_id: BatchId,
        confirmations: u64,
    },
    Finalized {
        anchor_id: AnchorId,
        batch_id: BatchId,
    },
    ReorgDetected {
        anchor_id: AnchorId,
        batch_id: BatchId,
        chain: TargetChain,
    },
}

impl AnchorEvent {
    pub fn anchor_id(&self) -> AnchorId {
        match self {
            AnchorEvent::ConfirmationsAdvanced { anchor_id, .. }
            | AnchorEvent::Finalized { anchor_id, .. }
            | AnchorEvent::ReorgDetected { anchor_id, .. } => *anchor_id,
        }
    }
}

/// What applying one observer message did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Count increased; `finalized` when it first met the threshold
    Advanced { finalized: bool },
    /// Lower or equal count, or the anchor was already invalidated
    Stale,
    /// No anchor record matches the message
    UnknownAnchor,
}

/// Consumes chain observer messages and advances anchor records
///
/// Confirmation counts only grow; stale or duplicated updates are dropped,
/// so at-least-once, out-of-order delivery is safe. Finality advances the
/// owning batch to `confirmed`; a reorg fails it and marks its proofs stale.
pub struct ConfirmationTracker<S: LedgerStore> {
    store: Arc<S>,
    batches: Arc<BatchManager<S>>,
    metrics: Arc<MetricsCollector>,
    events: broadcast::Sender<AnchorEvent>,
    locks: KeyedLocks<AnchorId>,
}

impl<S: LedgerStore + 'static> ConfirmationTracker<S> {
    pub fn new(batches: Arc<BatchManager<S>>, metrics: Arc<MetricsCollector>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store: batches.store().clone(),
            batches,
            metrics,
            events,
            locks: KeyedLocks::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnchorEvent> {
        self.events.subscribe()
    }

    pub async fn get_anchor(&self, anchor_id: AnchorId) -> Result<AnchorRecord, AnchoringError> {
        self.store
            .get_anchor(anchor_id)
            .await?
            .ok_or(AnchoringError::AnchorNotFound(anchor_id))
    }

    /// Run the consuming task until every sender is dropped
    pub fn spawn(self: Arc<Self>, mut input: mpsc::Receiver<ObserverMessage>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(message) = input.recv().await {
                if let Err(e) = self.apply(message).await {
                    error!(error = %e, "Failed to apply observer message");
                }
            }
            debug!("Observer channel closed, tracker stopping");
        })
    }

    pub async fn apply(&self, message: ObserverMessage) -> Result<UpdateOutcome, AnchoringError> {
        match message {
            ObserverMessage::Confirmation(update) => self.apply_update(update).await,
            ObserverMessage::Reorg(notice) => self.apply_reorg(notice).await,
        }
    }

    /// Apply a confirmation count, discarding anything not strictly newer
    pub async fn apply_update(
        &self,
        update: ConfirmationUpdate,
    ) -> Result<UpdateOutcome, AnchoringError> {
        let Some(found) = self
            .store
            .find_anchor(&update.chain, &update.anchor_tx_hash)
            .await?
        else {
            warn!(
                chain = %update.chain,
                anchor_tx = %update.anchor_tx_hash,
                "Confirmation update for unknown anchor"
            );
            return Ok(UpdateOutcome::UnknownAnchor);
        };

        let _guard = self.locks.lock(&found.anchor_id).await;
        let mut anchor = self.get_anchor(found.anchor_id).await?;

        if anchor.reorged || update.confirmations <= anchor.confirmations {
            self.metrics.record_stale_update();
            debug!(
                anchor_id = %anchor.anchor_id,
                stored = anchor.confirmations,
                reported = update.confirmations,
                "Discarding stale confirmation update"
            );
            return Ok(UpdateOutcome::Stale);
        }

        let now = current_timestamp();
        anchor.confirmations = update.confirmations;
        anchor.block_number = Some(update.block_height);
        anchor.updated_at = now;

        let finalized = !anchor.is_final && anchor.meets_threshold();
        if finalized {
            // batch first: until the anchor row says final, a redelivered
            // update retries the whole step
            self.batches
                .record_finality(anchor.batch_id, &anchor.anchor_tx_hash)
                .await?;
            anchor.is_final = true;
            anchor.confirmed_at = Some(now);
        }
        self.store.update_anchor(&anchor).await?;

        let _ = self.events.send(AnchorEvent::ConfirmationsAdvanced {
            anchor_id: anchor.anchor_id,
            batch_id: anchor.batch_id,
            confirmations: anchor.confirmations,
        });

        if finalized {
            self.metrics.record_anchor_finalized(&anchor.target_chain);
            info!(
                anchor_id = %anchor.anchor_id,
                batch_id = %anchor.batch_id,
                chain = %anchor.target_chain,
                confirmations = anchor.confirmations,
                "Anchor reached finality"
            );
            let _ = self.events.send(AnchorEvent::Finalized {
                anchor_id: anchor.anchor_id,
                batch_id: anchor.batch_id,
            });

            self.store
                .record_event(
                    &TimelineEvent::new(
                        EntityKind::Anchor,
                        anchor.anchor_id,
                        Some("submitted"),
                        "final",
                        now,
                    )
                    .with_details(format!(
                        "{} of {} confirmations",
                        anchor.confirmations, anchor.required_confirmations
                    ))
                    .with_tx_hash(anchor.anchor_tx_hash.clone()),
                )
                .await?;
        }

        Ok(UpdateOutcome::Advanced { finalized })
    }

    /// Invalidate an anchor that left the canonical chain.
    ///
    /// The batch is failed and its proofs are flagged stale, then the reorg
    /// is returned as an error. A repeated notice is a no-op.
    pub async fn apply_reorg(&self, notice: ReorgNotice) -> Result<UpdateOutcome, AnchoringError> {
        let Some(found) = self
            .store
            .find_anchor(&notice.chain, &notice.anchor_tx_hash)
            .await?
        else {
            warn!(
                chain = %notice.chain,
                anchor_tx = %notice.anchor_tx_hash,
                "Reorg notice for unknown anchor"
            );
            return Ok(UpdateOutcome::UnknownAnchor);
        };

        let _guard = self.locks.lock(&found.anchor_id).await;
        let mut anchor = self.get_anchor(found.anchor_id).await?;
        if anchor.reorged {
            self.metrics.record_stale_update();
            return Ok(UpdateOutcome::Stale);
        }

        let now = current_timestamp();
        let was_final = anchor.is_final;
        anchor.reorged = true;
        anchor.is_final = false;
        anchor.updated_at = now;
        self.store.update_anchor(&anchor).await?;

        let mut stale = 0usize;
        for proof in self.store.proofs_by_anchor(anchor.anchor_id).await? {
            self.store.mark_proof_stale(proof.proof_id, now).await?;
            stale += 1;
        }

        let reason = format!(
            "reorg on {} at height {} invalidated anchor {}",
            notice.chain, notice.detected_at_height, anchor.anchor_tx_hash
        );
        self.store
            .record_event(
                &TimelineEvent::new(
                    EntityKind::Anchor,
                    anchor.anchor_id,
                    Some(if was_final { "final" } else { "submitted" }),
                    "reorged",
                    now,
                )
                .with_details(reason.clone())
                .with_tx_hash(anchor.anchor_tx_hash.clone()),
            )
            .await?;
        self.batches.invalidate(anchor.batch_id, reason).await?;
        self.metrics.record_reorg(&anchor.target_chain, was_final);

        error!(
            anchor_id = %anchor.anchor_id,
            batch_id = %anchor.batch_id,
            chain = %anchor.target_chain,
            was_final = was_final,
            stale_proofs = stale,
            "Chain reorganization invalidated anchor"
        );
        let _ = self.events.send(AnchorEvent::ReorgDetected {
            anchor_id: anchor.anchor_id,
            batch_id: anchor.batch_id,
            chain: anchor.target_chain.clone(),
        });

        Err(AnchoringError::ReorgDetected {
            anchor_id: anchor.anchor_id,
            batch_id: anchor.batch_id,
            chain: anchor.target_chain,
        })
    }

    /// Run `poll_once` every `interval` until the handle is aborted
    pub fn spawn_poller(self: Arc<Self>, observers: ObserverPool, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.poll_once(&observers).await {
                    error!(error = %e, "Confirmation poll failed");
                }
            }
        })
    }

    /// Ask observers for every open anchor, for chains that cannot push.
    ///
    /// A previously included anchor the observer no longer finds is treated
    /// as reorged. Returns the number of anchors that advanced.
    pub async fn poll_once(&self, observers: &ObserverPool) -> Result<usize, AnchoringError> {
        let mut advanced = 0;

        for anchor in self.store.list_unfinalized_anchors().await? {
            let observer = match observers.get(&anchor.target_chain).await {
                Ok(observer) => observer,
                Err(e) => {
                    warn!(anchor_id = %anchor.anchor_id, error = %e, "Skipping anchor");
                    continue;
                }
            };

            match observer
                .get_confirmations(&anchor.target_chain, &anchor.anchor_tx_hash)
                .await
            {
                Ok(status) => {
                    let update = ConfirmationUpdate {
                        chain: anchor.target_chain.clone(),
                        anchor_tx_hash: anchor.anchor_tx_hash.clone(),
                        block_height: status.block_height,
                        confirmations: status.confirmations,
                    };
                    if let UpdateOutcome::Advanced { .. } = self.apply_update(update).await? {
                        advanced += 1;
                    }
                }
                Err(ChainError::TransactionNotFound { .. }) if anchor.block_number.is_some() => {
                    let height = observer.latest_height(&anchor.target_chain).await.unwrap_or(0);
                    let notice = ReorgNotice {
                        chain: anchor.target_chain.clone(),
                        anchor_tx_hash: anchor.anchor_tx_hash.clone(),
                        detected_at_height: height,
                    };
                    if let Err(e) = self.apply_reorg(notice).await {
                        warn!(error = %e, "Reorg found while polling");
                    }
                }
                Err(e) => {
                    debug!(anchor_id = %anchor.anchor_id, error = %e, "Confirmation query failed");
                }
            }
        }
        Ok(advanced)
    }

    /// Suspend until the anchor is final, it is reorged, or `timeout` passes.
    ///
    /// On timeout the owning batch is failed with a timeout reason.
    pub async fn wait_for_finality(
        &self,
        anchor_id: AnchorId,
        timeout: Duration,
    ) -> Result<AnchorRecord, AnchoringError> {
        // subscribe before the first read so no event slips in between
        let mut events = self.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let anchor = self.get_anchor(anchor_id).await?;
            if anchor.reorged {
                return Err(AnchoringError::ReorgDetected {
                    anchor_id,
                    batch_id: anchor.batch_id,
                    chain: anchor.target_chain,
                });
            }
            if anchor.is_final {
                return Ok(anchor);
            }

            loop {
                match tokio::time::timeout_at(deadline, events.recv()).await {
                    Ok(Ok(event)) if event.anchor_id() == anchor_id => match event {
                        AnchorEvent::ConfirmationsAdvanced { .. } => continue,
                        _ => break,
                    },
                    Ok(Ok(_)) => continue,
                    // missed events; re-read the record
                    Ok(Err(broadcast::error::RecvError::Lagged(_))) => break,
                    Ok(Err(broadcast::error::RecvError::Closed)) => break,
                    Err(_) => return Err(self.timed_out(anchor, timeout).await),
                }
            }
        }
    }

    async fn timed_out(&self, anchor: AnchorRecord, waited: Duration) -> AnchoringError {
        let reason = format!(
            "timed out after {}s waiting for {} confirmations of {} on {}",
            waited.as_secs(),
            anchor.required_confirmations,
            anchor.anchor_tx_hash,
            anchor.target_chain
        );
        warn!(anchor_id = %anchor.anchor_id, batch_id = %anchor.batch_id, "{}", reason);

        if let Err(e) = self.batches.mark_failed(anchor.batch_id, reason).await {
            debug!(batch_id = %anchor.batch_id, error = %e, "Batch not failed on timeout");
        }
        AnchoringError::Timeout {
            entity_id: anchor.anchor_id.to_string(),
            waited_secs: waited.as_secs(),
        }
    }
}
