use anchor_proofs_anchoring::{AnchorSubmitter, BatchManager, ConfirmationTracker};
use anchor_proofs_proof::ProofAssembler;
use anchor_proofs_retry::{retry_with_backoff, RetryPolicy};
use anchor_proofs_store::LedgerStore;
use anchor_proofs_types::{
    AnchorRecord, BatchId, BatchType, IntentLeg, LegId, NewTransaction, Proof, ProofId,
    TargetChain,
};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::OrchestratorError;
use crate::executor::{ExecutionReceipt, LegExecutionError, LegExecutor};

/// Progress of in-flight legs, sent from chain group tasks to the scheduler
#[derive(Debug)]
pub(crate) enum LegReport {
    Batched {
        leg_ids: Vec<LegId>,
        batch_id: BatchId,
    },
    Anchored {
        leg_ids: Vec<LegId>,
        anchor: AnchorRecord,
    },
    Confirmed {
        leg_id: LegId,
        proof_id: ProofId,
    },
    Retrying {
        leg_id: LegId,
        attempt: u32,
    },
    Executed {
        leg_id: LegId,
        receipt: ExecutionReceipt,
    },
    Failed {
        leg_ids: Vec<LegId>,
        error: String,
    },
}

/// Drives a set of same-chain legs through batching, anchoring and execution
pub(crate) struct LegPipeline<S: LedgerStore + 'static> {
    pub batches: Arc<BatchManager<S>>,
    pub submitter: Arc<AnchorSubmitter<S>>,
    pub tracker: Arc<ConfirmationTracker<S>>,
    pub assembler: Arc<ProofAssembler<S>>,
    pub executor: Arc<dyn LegExecutor>,
    pub leg_retry: RetryPolicy,
}

impl<S: LedgerStore + 'static> LegPipeline<S> {
    /// Coalesce the legs' commitments into one batch on `chain`, then
    /// execute every leg whose commitment was proven.
    pub async fn run_group(
        self: Arc<Self>,
        chain: TargetChain,
        batch_type: BatchType,
        legs: Vec<IntentLeg>,
        reports: mpsc::Sender<LegReport>,
    ) {
        let leg_ids: Vec<LegId> = legs.iter().map(|l| l.leg_id).collect();

        let proofs = match self.anchor_group(&chain, batch_type, &legs, &reports).await {
            Ok(proofs) => proofs,
            Err(e) => {
                warn!(chain = %chain, legs = leg_ids.len(), error = %e, "Chain group anchoring failed");
                send(&reports, LegReport::Failed {
                    leg_ids,
                    error: e.to_string(),
                })
                .await;
                return;
            }
        };

        let runs = legs.into_iter().map(|leg| {
            let proof = proofs.get(&leg.leg_id).cloned();
            let reports = &reports;
            let pipeline = &self;
            async move {
                match proof {
                    Some(proof) => pipeline.execute_leg(leg, proof, reports).await,
                    None => {
                        send(reports, LegReport::Failed {
                            leg_ids: vec![leg.leg_id],
                            error: "no proof assembled for leg commitment".to_string(),
                        })
                        .await
                    }
                }
            }
        });
        join_all(runs).await;
    }

    async fn anchor_group(
        &self,
        chain: &TargetChain,
        batch_type: BatchType,
        legs: &[IntentLeg],
        reports: &mpsc::Sender<LegReport>,
    ) -> Result<HashMap<LegId, Proof>, OrchestratorError> {
        let batch = self.batches.open_batch(batch_type).await?;

        let mut leg_of_tx = HashMap::with_capacity(legs.len());
        for leg in legs {
            let account = leg
                .from_address
                .clone()
                .unwrap_or_else(|| format!("intent:{}", leg.intent_id));
            let tx = self
                .batches
                .add_transaction(
                    batch.batch_id,
                    NewTransaction::new(leg.commitment_hash(), account)
                        .with_intent(leg.intent_id.clone(), leg.leg_id),
                )
                .await?;
            leg_of_tx.insert(tx.id, leg.leg_id);
        }
        self.batches.close(batch.batch_id).await?;
        send(reports, LegReport::Batched {
            leg_ids: legs.iter().map(|l| l.leg_id).collect(),
            batch_id: batch.batch_id,
        })
        .await;

        let anchor = self.submitter.submit(batch.batch_id, chain).await?;
        send(reports, LegReport::Anchored {
            leg_ids: legs.iter().map(|l| l.leg_id).collect(),
            anchor: anchor.clone(),
        })
        .await;

        let timeout = self.submitter.chain_policy(chain)?.confirmation_timeout;
        self.tracker
            .wait_for_finality(anchor.anchor_id, timeout)
            .await?;

        let mut proofs = HashMap::with_capacity(legs.len());
        for proof in self.assembler.materialize_batch(batch.batch_id, chain).await? {
            if let Some(&leg_id) = leg_of_tx.get(&proof.transaction_id) {
                send(reports, LegReport::Confirmed {
                    leg_id,
                    proof_id: proof.proof_id,
                })
                .await;
                proofs.insert(leg_id, proof);
            }
        }
        Ok(proofs)
    }

    /// Run the executor with leg-local retries; siblings are never re-run
    async fn execute_leg(&self, leg: IntentLeg, proof: Proof, reports: &mpsc::Sender<LegReport>) {
        let policy = self.leg_retry.with_max_retries(leg.max_retries);
        let executor = self.executor.as_ref();
        let (leg_ref, proof_ref) = (&leg, &proof);

        let result = retry_with_backoff(
            &policy,
            "execute_leg",
            LegExecutionError::is_transient,
            move |attempt| async move {
                if attempt > 0 {
                    send(reports, LegReport::Retrying {
                        leg_id: leg_ref.leg_id,
                        attempt,
                    })
                    .await;
                }
                executor.execute(leg_ref, proof_ref).await
            },
        )
        .await;

        let report = match result {
            Ok(receipt) => LegReport::Executed {
                leg_id: leg.leg_id,
                receipt,
            },
            Err(e) => LegReport::Failed {
                leg_ids: vec![leg.leg_id],
                error: e.to_string(),
            },
        };
        send(reports, report).await;
    }
}

async fn send(reports: &mpsc::Sender<LegReport>, report: LegReport) {
    if reports.send(report).await.is_err() {
        // the scheduler stopped listening (deadline or shutdown)
        debug!("Leg report dropped");
    }
}
