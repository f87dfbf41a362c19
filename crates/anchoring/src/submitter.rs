use anchor_proofs_chain::{ChainError, ObserverPool};
use anchor_proofs_metrics::MetricsCollector;
use anchor_proofs_retry::{retry_with_backoff, RetryError, RetryPolicy};
use anchor_proofs_store::LedgerStore;
use anchor_proofs_types::{AnchorRecord, BatchId, BatchStatus, TargetChain};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::batch::BatchManager;
use crate::error::AnchoringError;

/// Per-chain anchoring settings
#[derive(Debug, Clone)]
pub struct ChainPolicy {
    pub required_confirmations: u64,
    pub confirmation_timeout: Duration,
    /// Submission retries after the first attempt
    pub submission_retries: u32,
}

impl Default for ChainPolicy {
    fn default() -> Self {
        Self {
            required_confirmations: 6,
            confirmation_timeout: Duration::from_secs(3600),
            submission_retries: 3,
        }
    }
}

/// Writes closed batch roots to their target chains
pub struct AnchorSubmitter<S: LedgerStore> {
    batches: Arc<BatchManager<S>>,
    observers: ObserverPool,
    chains: HashMap<TargetChain, ChainPolicy>,
    retry: RetryPolicy,
    metrics: Arc<MetricsCollector>,
}

impl<S: LedgerStore> AnchorSubmitter<S> {
    pub fn new(
        batches: Arc<BatchManager<S>>,
        observers: ObserverPool,
        chains: HashMap<TargetChain, ChainPolicy>,
        retry: RetryPolicy,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            batches,
            observers,
            chains,
            retry,
            metrics,
        }
    }

    pub fn chain_policy(&self, chain: &TargetChain) -> Result<&ChainPolicy, AnchoringError> {
        self.chains
            .get(chain)
            .ok_or_else(|| AnchoringError::UnconfiguredChain(chain.clone()))
    }

    /// Submit the root of a closed batch, retrying transient chain failures.
    ///
    /// When retries run out the batch is failed with the last chain error.
    pub async fn submit(
        &self,
        batch_id: BatchId,
        chain: &TargetChain,
    ) -> Result<AnchorRecord, AnchoringError> {
        let settings = self.chain_policy(chain)?.clone();
        let batch = self.batches.get_batch(batch_id).await?;

        let root = match (batch.status, batch.merkle_root) {
            (BatchStatus::Closed, Some(root)) => root,
            (status, _) => {
                return Err(AnchoringError::InvalidState {
                    batch_id,
                    status,
                    operation: "submit",
                })
            }
        };

        let observer = self.observers.get(chain).await?;
        let policy = self.retry.with_max_retries(settings.submission_retries);

        let result = retry_with_backoff(&policy, "submit_anchor", ChainError::is_transient, |_| {
            let observer = observer.clone();
            let chain = chain.clone();
            async move { observer.submit_anchor(&chain, &root).await }
        })
        .await;

        match result {
            Ok(anchor_tx_hash) => {
                self.metrics.record_anchor_submitted(chain, true);
                info!(
                    batch_id = %batch_id,
                    chain = %chain,
                    anchor_tx = %anchor_tx_hash,
                    "Anchor transaction submitted"
                );
                self.batches
                    .mark_submitted(
                        batch_id,
                        chain.clone(),
                        &anchor_tx_hash,
                        settings.required_confirmations,
                    )
                    .await
            }
            Err(e) => {
                self.metrics.record_anchor_submitted(chain, false);
                let attempts = e.attempts();
                let reason = match e {
                    RetryError::Exhausted { last_error, .. } => last_error.to_string(),
                    RetryError::Permanent { error, .. } => error.to_string(),
                };
                error!(
                    batch_id = %batch_id,
                    chain = %chain,
                    attempts = attempts,
                    reason = %reason,
                    "Anchor submission failed"
                );

                self.batches
                    .mark_failed(
                        batch_id,
                        format!("anchor submission to {chain} failed after {attempts} attempts: {reason}"),
                    )
                    .await?;

                Err(AnchoringError::SubmissionFailed {
                    batch_id,
                    chain: chain.clone(),
                    attempts,
                    reason,
                })
            }
        }
    }
}
