use anchor_proofs_store::LedgerStore;
use anchor_proofs_types::hash::{hex32, sha256};
use anchor_proofs_types::{
    current_timestamp, AnchorId, AnchorReference, BatchId, GovernanceProof, Hash32,
    InclusionProof, Proof, ProofId, ProofRequest, RequestId, StateProof, ValidatorAttestation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ProofError;

pub const BUNDLE_VERSION: &str = "1.0";

/// The four proof components as exported in a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleComponents {
    pub merkle_inclusion: InclusionProof,
    pub anchor_reference: AnchorReference,
    pub state_proof: Option<StateProof>,
    pub governance_proof: Option<GovernanceProof>,
}

impl BundleComponents {
    /// SHA-256 of the canonical JSON encoding
    pub fn artifact_hash(&self) -> Result<Hash32, ProofError> {
        Ok(sha256(&serde_json::to_vec(self)?))
    }
}

/// Self-contained export of one proof
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofBundle {
    pub bundle_id: Uuid,
    pub bundle_version: String,
    pub generated_at: u64,
    pub proof_id: ProofId,
    #[serde(with = "hex32")]
    pub tx_hash: Hash32,
    pub account_url: String,
    pub components: BundleComponents,
    pub validator_attestations: Vec<ValidatorAttestation>,
    #[serde(with = "hex32")]
    pub artifact_hash: Hash32,
}

impl ProofBundle {
    /// Whether the components still hash to the recorded artifact hash
    pub fn integrity_holds(&self) -> bool {
        self.components
            .artifact_hash()
            .map(|h| h == self.artifact_hash)
            .unwrap_or(false)
    }
}

/// Read accessors over proofs, attestations and requests
pub struct ProofQuery<S: LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore> ProofQuery<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn proof(&self, proof_id: ProofId) -> Result<Proof, ProofError> {
        self.store
            .get_proof(proof_id)
            .await?
            .ok_or(ProofError::ProofNotFound(proof_id))
    }

    pub async fn by_tx_hash(&self, tx_hash: &Hash32) -> Result<Vec<Proof>, ProofError> {
        Ok(self.store.proofs_by_tx_hash(tx_hash).await?)
    }

    pub async fn by_account(&self, account_url: &str) -> Result<Vec<Proof>, ProofError> {
        Ok(self.store.proofs_by_account(account_url).await?)
    }

    pub async fn by_batch(&self, batch_id: BatchId) -> Result<Vec<Proof>, ProofError> {
        Ok(self.store.proofs_by_batch(batch_id).await?)
    }

    pub async fn by_anchor(&self, anchor_id: AnchorId) -> Result<Vec<Proof>, ProofError> {
        Ok(self.store.proofs_by_anchor(anchor_id).await?)
    }

    pub async fn attestations(
        &self,
        proof_id: ProofId,
    ) -> Result<Vec<ValidatorAttestation>, ProofError> {
        Ok(self.store.attestations_for_proof(proof_id).await?)
    }

    pub async fn request(&self, request_id: RequestId) -> Result<ProofRequest, ProofError> {
        self.store
            .get_request(request_id)
            .await?
            .ok_or(ProofError::RequestNotFound(request_id))
    }

    pub async fn bundle(&self, proof_id: ProofId) -> Result<ProofBundle, ProofError> {
        let proof = self.proof(proof_id).await?;
        let validator_attestations = self.attestations(proof_id).await?;

        let components = BundleComponents {
            merkle_inclusion: proof.inclusion,
            anchor_reference: proof.anchor_reference,
            state_proof: proof.state_proof,
            governance_proof: proof.governance_proof,
        };
        let artifact_hash = components.artifact_hash()?;

        Ok(ProofBundle {
            bundle_id: Uuid::new_v4(),
            bundle_version: BUNDLE_VERSION.to_string(),
            generated_at: current_timestamp(),
            proof_id,
            tx_hash: proof.tx_hash,
            account_url: proof.account_url,
            components,
            validator_attestations,
            artifact_hash,
        })
    }
}
