use anchor_proofs_metrics::MetricsCollector;
use anchor_proofs_store::LedgerStore;
use anchor_proofs_types::{
    attestation_message, current_timestamp, EntityKind, Proof, ProofId, TimelineEvent,
    ValidatorAttestation,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::ProofError;

/// Signs and checks validator attestations over proof anchors
pub struct AttestationService<S: LedgerStore> {
    store: Arc<S>,
    validator_id: String,
    signing_key: SigningKey,
    metrics: Arc<MetricsCollector>,
}

impl<S: LedgerStore> AttestationService<S> {
    pub fn new(
        store: Arc<S>,
        validator_id: impl Into<String>,
        signing_key: SigningKey,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            validator_id: validator_id.into(),
            signing_key,
            metrics,
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign `SHA-256(merkle_root || anchor_tx_hash)` of a proof and store it
    pub async fn attest(&self, proof_id: ProofId) -> Result<ValidatorAttestation, ProofError> {
        let proof = self.load(proof_id).await?;
        if proof.stale {
            return Err(ProofError::StaleProof(proof_id));
        }

        let root = proof.inclusion.merkle_root;
        let anchor_tx = proof.anchor_reference.anchor_tx_hash.clone();
        let signature = self.signing_key.sign(&attestation_message(&root, &anchor_tx));

        let attestation = ValidatorAttestation {
            attestation_id: Uuid::new_v4(),
            proof_id,
            validator_id: self.validator_id.clone(),
            validator_pubkey: self.verifying_key().to_bytes(),
            signature: signature.to_bytes().to_vec(),
            attested_merkle_root: root,
            attested_anchor_tx: anchor_tx,
            attested_at: current_timestamp(),
        };
        self.store.create_attestation(&attestation).await?;
        self.store
            .record_event(
                &TimelineEvent::new(
                    EntityKind::Proof,
                    proof_id,
                    None,
                    "attested",
                    attestation.attested_at,
                )
                .with_details(format!("by {}", self.validator_id)),
            )
            .await?;
        self.metrics.record_attestation();

        info!(
            proof_id = %proof_id,
            validator_id = %self.validator_id,
            "Proof attested"
        );
        Ok(attestation)
    }

    pub async fn attestations(
        &self,
        proof_id: ProofId,
    ) -> Result<Vec<ValidatorAttestation>, ProofError> {
        Ok(self.store.attestations_for_proof(proof_id).await?)
    }

    /// Every stored attestation of a proof with whether it still holds
    pub async fn check_attestations(
        &self,
        proof_id: ProofId,
    ) -> Result<Vec<(ValidatorAttestation, bool)>, ProofError> {
        let proof = self.load(proof_id).await?;
        let attestations = self.store.attestations_for_proof(proof_id).await?;
        Ok(attestations
            .into_iter()
            .map(|a| {
                let valid = attests_to(&a, &proof) && verify_attestation(&a);
                (a, valid)
            })
            .collect())
    }

    async fn load(&self, proof_id: ProofId) -> Result<Proof, ProofError> {
        self.store
            .get_proof(proof_id)
            .await?
            .ok_or(ProofError::ProofNotFound(proof_id))
    }
}

/// Whether the attestation covers this proof's root and anchor transaction
pub fn attests_to(attestation: &ValidatorAttestation, proof: &Proof) -> bool {
    attestation.proof_id == proof.proof_id
        && attestation.attested_merkle_root == proof.inclusion.merkle_root
        && attestation.attested_anchor_tx == proof.anchor_reference.anchor_tx_hash
}

/// Check the ed25519 signature of an attestation
pub fn verify_attestation(attestation: &ValidatorAttestation) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(&attestation.validator_pubkey) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&attestation.signature) else {
        return false;
    };
    key.verify(&attestation.message(), &signature).is_ok()
}
