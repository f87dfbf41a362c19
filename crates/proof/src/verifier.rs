use anchor_proofs_merkle::verify_path;
use anchor_proofs_metrics::MetricsCollector;
use anchor_proofs_store::LedgerStore;
use anchor_proofs_types::{
    current_timestamp, AnchorRecord, ComponentResult, GovernanceLevel, Proof, ProofComponent,
    ProofId, VerificationResult,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ProofError;
use crate::validators::{GovernanceValidator, StateProofValidator};

pub const REORG_DETAIL: &str = "anchor invalidated by reorg";

/// Re-checks every present component of a proof
///
/// `evaluate` is pure. `verify_and_record` additionally caches the outcome
/// on the stored proof and never touches anything else.
pub struct ProofVerifier<S: LedgerStore> {
    store: Arc<S>,
    state_validator: Arc<dyn StateProofValidator>,
    governance_validator: Arc<dyn GovernanceValidator>,
    metrics: Arc<MetricsCollector>,
}

impl<S: LedgerStore> ProofVerifier<S> {
    pub fn new(
        store: Arc<S>,
        state_validator: Arc<dyn StateProofValidator>,
        governance_validator: Arc<dyn GovernanceValidator>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            state_validator,
            governance_validator,
            metrics,
        }
    }

    /// Verify against the live anchor record, without writing anything
    pub async fn verify(&self, proof: &Proof) -> Result<VerificationResult, ProofError> {
        let anchor = self
            .store
            .get_anchor(proof.anchor_reference.anchor_id)
            .await?;
        Ok(self.evaluate(proof, anchor.as_ref()))
    }

    /// Verify a stored proof and cache the result on it
    pub async fn verify_and_record(
        &self,
        proof_id: ProofId,
    ) -> Result<VerificationResult, ProofError> {
        let proof = self
            .store
            .get_proof(proof_id)
            .await?
            .ok_or(ProofError::ProofNotFound(proof_id))?;

        let result = self.verify(&proof).await?;
        self.store
            .record_verification(proof_id, result.valid, current_timestamp(), &result)
            .await?;
        self.metrics.record_verification(&result);

        if result.valid {
            debug!(proof_id = %proof_id, "Proof verified");
        } else {
            warn!(
                proof_id = %proof_id,
                failed = ?result.failed_components(),
                "Proof failed verification"
            );
        }
        Ok(result)
    }

    /// Pure re-check of all present components
    pub fn evaluate(&self, proof: &Proof, anchor: Option<&AnchorRecord>) -> VerificationResult {
        let inclusion = check_inclusion(proof);
        let anchor_reference = check_anchor(proof, anchor);
        let base_ok = inclusion.passed && anchor_reference.passed;

        let mut components = vec![inclusion, anchor_reference];

        if let Some(state_proof) = &proof.state_proof {
            let verdict = self.state_validator.validate(&proof.tx_hash, state_proof);
            components.push(ComponentResult {
                component: ProofComponent::StateProof,
                passed: verdict.passed,
                detail: verdict.detail,
            });
        }

        if let Some(governance) = &proof.governance_proof {
            let result = match governance.level {
                GovernanceLevel::G0 if base_ok => {
                    ComponentResult::pass(ProofComponent::Governance, "G0: inclusion and finality hold")
                }
                GovernanceLevel::G0 => ComponentResult::fail(
                    ProofComponent::Governance,
                    "G0: inclusion or finality failed",
                ),
                level => {
                    let verdict = self.governance_validator.validate(&proof.tx_hash, governance);
                    ComponentResult {
                        component: ProofComponent::Governance,
                        passed: verdict.passed,
                        detail: format!("{level}: {}", verdict.detail),
                    }
                }
            };
            components.push(result);
        }

        VerificationResult::from_components(components)
    }
}

fn check_inclusion(proof: &Proof) -> ComponentResult {
    let inclusion = &proof.inclusion;
    if inclusion.leaf_hash != proof.tx_hash {
        return ComponentResult::fail(
            ProofComponent::Inclusion,
            "leaf hash is not the transaction hash",
        );
    }
    if verify_path(&inclusion.leaf_hash, &inclusion.path, &inclusion.merkle_root) {
        ComponentResult::pass(
            ProofComponent::Inclusion,
            format!("leaf {} recomputes to root", inclusion.leaf_index),
        )
    } else {
        ComponentResult::fail(
            ProofComponent::Inclusion,
            "path does not recompute to merkle root",
        )
    }
}

fn check_anchor(proof: &Proof, anchor: Option<&AnchorRecord>) -> ComponentResult {
    let reference = &proof.anchor_reference;
    if proof.stale {
        return ComponentResult::fail(ProofComponent::AnchorReference, REORG_DETAIL);
    }
    let Some(anchor) = anchor else {
        return ComponentResult::fail(
            ProofComponent::AnchorReference,
            format!("anchor record {} not found", reference.anchor_id),
        );
    };
    if anchor.reorged {
        return ComponentResult::fail(ProofComponent::AnchorReference, REORG_DETAIL);
    }
    if anchor.anchor_tx_hash != reference.anchor_tx_hash || anchor.target_chain != reference.target_chain {
        return ComponentResult::fail(
            ProofComponent::AnchorReference,
            "anchor transaction does not match record",
        );
    }
    if anchor.merkle_root != proof.inclusion.merkle_root || reference.anchored_root != anchor.merkle_root {
        return ComponentResult::fail(
            ProofComponent::AnchorReference,
            "anchored root differs from inclusion root",
        );
    }
    if !anchor.is_final || !anchor.meets_threshold() {
        return ComponentResult::fail(
            ProofComponent::AnchorReference,
            format!(
                "{} of {} confirmations on {}",
                anchor.confirmations, anchor.required_confirmations, anchor.target_chain
            ),
        );
    }
    ComponentResult::pass(
        ProofComponent::AnchorReference,
        format!(
            "final on {} with {} confirmations",
            anchor.target_chain, anchor.confirmations
        ),
    )
}
