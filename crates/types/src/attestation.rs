use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::{hex32, hex_bytes, sha256_concat, Hash32};
use crate::proof::ProofId;

/// Independent validator signature corroborating a proof's anchor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorAttestation {
    pub attestation_id: Uuid,
    pub proof_id: ProofId,
    pub validator_id: String,

    /// ed25519 public key
    #[serde(with = "hex32")]
    pub validator_pubkey: [u8; 32],
    /// ed25519 signature over [`attestation_message`]
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,

    #[serde(with = "hex32")]
    pub attested_merkle_root: Hash32,
    pub attested_anchor_tx: String,

    pub attested_at: u64,
}

impl ValidatorAttestation {
    pub fn message(&self) -> Hash32 {
        attestation_message(&self.attested_merkle_root, &self.attested_anchor_tx)
    }
}

/// Message signed by validators: SHA-256(merkle_root || anchor_tx_hash)
pub fn attestation_message(merkle_root: &Hash32, anchor_tx_hash: &str) -> Hash32 {
    sha256_concat(&[merkle_root, anchor_tx_hash.as_bytes()])
}
