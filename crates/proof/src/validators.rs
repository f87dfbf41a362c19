use anchor_proofs_merkle::{verify_receipt, ReceiptEntry};
use anchor_proofs_types::hash::{hex32, hex_bytes, sha256};
use anchor_proofs_types::{GovernanceLevel, GovernanceProof, Hash32, StateProof};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Pass/fail of one pluggable check, with a human-readable reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorVerdict {
    pub passed: bool,
    pub detail: String,
}

impl ValidatorVerdict {
    pub fn pass(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
        }
    }
}

/// Checks a ledger-internal state proof attached to a transaction
pub trait StateProofValidator: Send + Sync {
    fn validate(&self, tx_hash: &Hash32, proof: &StateProof) -> ValidatorVerdict;
}

/// Checks the level-specific claims of a governance proof
///
/// Only called for G1 and G2; G0 carries no claims beyond inclusion and
/// finality.
pub trait GovernanceValidator: Send + Sync {
    fn validate(&self, tx_hash: &Hash32, proof: &GovernanceProof) -> ValidatorVerdict;
}

// ═══════════════════════════════════════════════════════════════════════════
// CHAINED STATE PROOF
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(with = "hex32")]
    pub start: Hash32,
    #[serde(with = "hex32")]
    pub anchor: Hash32,
    #[serde(default)]
    pub entries: Vec<ReceiptEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofLayer {
    #[serde(default)]
    pub layer_name: String,
    #[serde(with = "hex32")]
    pub source_hash: Hash32,
    #[serde(with = "hex32")]
    pub target_hash: Hash32,
    pub receipt: Option<Receipt>,
}

/// Up to three layers, each committing the previous layer's target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainedProof {
    pub layer1: Option<ProofLayer>,
    pub layer2: Option<ProofLayer>,
    pub layer3: Option<ProofLayer>,
}

impl ChainedProof {
    fn layers(&self) -> Result<Vec<&ProofLayer>, String> {
        match (&self.layer1, &self.layer2, &self.layer3) {
            (None, _, _) => Err("layer1 missing".to_string()),
            (Some(_), None, Some(_)) => Err("layer3 present without layer2".to_string()),
            (Some(l1), l2, l3) => Ok([Some(l1), l2.as_ref(), l3.as_ref()]
                .into_iter()
                .flatten()
                .collect()),
        }
    }
}

/// Default state proof validator for layered receipt chains
///
/// Each layer's receipt must start at its source hash and recompute to its
/// target hash, and layer N's target must be layer N+1's source.
#[derive(Debug, Clone, Default)]
pub struct ChainedStateProofValidator {
    /// Require layer1 to start at the transaction hash itself
    pub bind_to_transaction: bool,
}

impl ChainedStateProofValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bound_to_transaction(mut self) -> Self {
        self.bind_to_transaction = true;
        self
    }
}

impl StateProofValidator for ChainedStateProofValidator {
    fn validate(&self, tx_hash: &Hash32, proof: &StateProof) -> ValidatorVerdict {
        let chained: ChainedProof = match serde_json::from_value(proof.0.clone()) {
            Ok(chained) => chained,
            Err(e) => return ValidatorVerdict::fail(format!("malformed chained proof: {e}")),
        };
        let layers = match chained.layers() {
            Ok(layers) => layers,
            Err(reason) => return ValidatorVerdict::fail(reason),
        };

        if self.bind_to_transaction && layers[0].source_hash != *tx_hash {
            return ValidatorVerdict::fail("layer1 does not start at the transaction hash");
        }

        for (i, layer) in layers.iter().enumerate() {
            let n = i + 1;
            let Some(receipt) = &layer.receipt else {
                return ValidatorVerdict::fail(format!("layer{n} has no receipt"));
            };
            if receipt.start != layer.source_hash || receipt.anchor != layer.target_hash {
                return ValidatorVerdict::fail(format!(
                    "layer{n} receipt does not span source to target"
                ));
            }
            if !verify_receipt(&receipt.start, &receipt.entries, &receipt.anchor) {
                return ValidatorVerdict::fail(format!("layer{n} receipt does not recompute"));
            }
            if let Some(next) = layers.get(i + 1) {
                if layer.target_hash != next.source_hash {
                    return ValidatorVerdict::fail(format!(
                        "layer{n} target is not layer{} source",
                        n + 1
                    ));
                }
            }
        }

        ValidatorVerdict::pass(format!("{} layer(s) verified", layers.len()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SIGNATURE GOVERNANCE
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthoritySignature {
    #[serde(with = "hex32")]
    pub pubkey: [u8; 32],
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

/// G1 claims: M of the N listed keys signed the transaction hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityClaims {
    #[serde(default)]
    pub authority_url: Option<String>,
    pub threshold_m: usize,
    pub authorized_keys: Vec<String>,
    pub signatures: Vec<AuthoritySignature>,
}

/// G2 claims: G1 plus a hash binding the operation outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeClaims {
    #[serde(flatten)]
    pub authority: AuthorityClaims,
    #[serde(default)]
    pub outcome_type: Option<String>,
    #[serde(with = "hex_bytes")]
    pub outcome: Vec<u8>,
    #[serde(with = "hex32")]
    pub outcome_hash: Hash32,
}

/// Default governance validator: ed25519 M-of-N authority, plus outcome binding at G2
#[derive(Debug, Clone, Default)]
pub struct SignatureGovernanceValidator;

impl SignatureGovernanceValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_authority(tx_hash: &Hash32, claims: &AuthorityClaims) -> ValidatorVerdict {
        let n = claims.authorized_keys.len();
        if claims.threshold_m == 0 || claims.threshold_m > n {
            return ValidatorVerdict::fail(format!(
                "invalid threshold {} of {}",
                claims.threshold_m, n
            ));
        }

        let authorized: HashSet<String> = claims
            .authorized_keys
            .iter()
            .map(|k| k.trim_start_matches("0x").to_lowercase())
            .collect();

        let mut signers = HashSet::new();
        for entry in &claims.signatures {
            let key_hex = hex::encode(entry.pubkey);
            if !authorized.contains(&key_hex) || signers.contains(&key_hex) {
                continue;
            }
            let Ok(key) = VerifyingKey::from_bytes(&entry.pubkey) else {
                continue;
            };
            let Ok(signature) = Signature::from_slice(&entry.signature) else {
                continue;
            };
            if key.verify(tx_hash, &signature).is_ok() {
                signers.insert(key_hex);
            }
        }

        if signers.len() >= claims.threshold_m {
            ValidatorVerdict::pass(format!(
                "{} of {} authority signatures valid (threshold {})",
                signers.len(),
                n,
                claims.threshold_m
            ))
        } else {
            ValidatorVerdict::fail(format!(
                "authority threshold not met: {} of {} valid, {} required",
                signers.len(),
                n,
                claims.threshold_m
            ))
        }
    }

    fn check_outcome(claims: &OutcomeClaims) -> ValidatorVerdict {
        if sha256(&claims.outcome) == claims.outcome_hash {
            ValidatorVerdict::pass("outcome binding verified")
        } else {
            ValidatorVerdict::fail("outcome binding mismatch")
        }
    }
}

impl GovernanceValidator for SignatureGovernanceValidator {
    fn validate(&self, tx_hash: &Hash32, proof: &GovernanceProof) -> ValidatorVerdict {
        match proof.level {
            GovernanceLevel::G0 => ValidatorVerdict::pass("G0 carries no authority claims"),
            GovernanceLevel::G1 => {
                match serde_json::from_value::<AuthorityClaims>(proof.payload.clone()) {
                    Ok(claims) => Self::check_authority(tx_hash, &claims),
                    Err(e) => ValidatorVerdict::fail(format!("malformed G1 claims: {e}")),
                }
            }
            GovernanceLevel::G2 => {
                let claims = match serde_json::from_value::<OutcomeClaims>(proof.payload.clone()) {
                    Ok(claims) => claims,
                    Err(e) => return ValidatorVerdict::fail(format!("malformed G2 claims: {e}")),
                };
                let authority = Self::check_authority(tx_hash, &claims.authority);
                if !authority.passed {
                    return authority;
                }
                let outcome = Self::check_outcome(&claims);
                if !outcome.passed {
                    return outcome;
                }
                ValidatorVerdict::pass(format!("{}; {}", authority.detail, outcome.detail))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_proofs_merkle::hash_pair;
    use ed25519_dalek::{Signer, SigningKey};
    use serde_json::json;

    fn layer(source: Hash32, sibling: Hash32) -> (serde_json::Value, Hash32) {
        let target = hash_pair(&source, &sibling);
        let value = json!({
            "layer_name": "bpt",
            "source_hash": hex::encode(source),
            "target_hash": hex::encode(target),
            "receipt": {
                "start": hex::encode(source),
                "anchor": hex::encode(target),
                "entries": [{ "hash": hex::encode(sibling), "right": true }],
            },
        });
        (value, target)
    }

    #[test]
    fn test_chained_layers_must_link() {
        let tx = sha256(b"tx");
        let (l1, t1) = layer(tx, [1u8; 32]);
        let (l2, _) = layer(t1, [2u8; 32]);
        let proof = StateProof(json!({ "layer1": l1, "layer2": l2 }));

        let validator = ChainedStateProofValidator::new().bound_to_transaction();
        assert!(validator.validate(&tx, &proof).passed);

        let (unlinked, _) = layer([9u8; 32], [2u8; 32]);
        let broken = StateProof(json!({ "layer1": l1, "layer2": unlinked }));
        let verdict = validator.validate(&tx, &broken);
        assert!(!verdict.passed);
        assert!(verdict.detail.contains("layer1 target"));
    }

    #[test]
    fn test_chained_rejects_gap_and_garbage() {
        let tx = sha256(b"tx");
        let (l1, _) = layer(tx, [1u8; 32]);
        let gap = StateProof(json!({ "layer1": l1.clone(), "layer3": l1 }));
        assert!(!ChainedStateProofValidator::new().validate(&tx, &gap).passed);

        let garbage = StateProof(json!({ "layer1": "nope" }));
        assert!(!ChainedStateProofValidator::new().validate(&tx, &garbage).passed);
    }

    fn g1_payload(tx: &Hash32, keys: &[SigningKey], signing: &[usize], m: usize) -> serde_json::Value {
        json!({
            "threshold_m": m,
            "authorized_keys": keys.iter().map(|k| hex::encode(k.verifying_key().to_bytes())).collect::<Vec<_>>(),
            "signatures": signing.iter().map(|&i| json!({
                "pubkey": hex::encode(keys[i].verifying_key().to_bytes()),
                "signature": hex::encode(keys[i].sign(tx).to_bytes()),
            })).collect::<Vec<_>>(),
        })
    }

    #[test]
    fn test_g1_threshold() {
        let tx = sha256(b"op");
        let keys: Vec<_> = (1..=3u8).map(|n| SigningKey::from_bytes(&[n; 32])).collect();
        let v = SignatureGovernanceValidator::new();

        let ok = GovernanceProof::new(GovernanceLevel::G1, g1_payload(&tx, &keys, &[0, 2], 2));
        assert!(v.validate(&tx, &ok).passed);

        // same signer twice does not count double
        let dup = GovernanceProof::new(GovernanceLevel::G1, g1_payload(&tx, &keys, &[1, 1], 2));
        assert!(!v.validate(&tx, &dup).passed);

        // signatures over another message are ignored
        let other = sha256(b"other");
        let wrong = GovernanceProof::new(GovernanceLevel::G1, g1_payload(&other, &keys, &[0, 1], 2));
        assert!(!v.validate(&tx, &wrong).passed);
    }

    #[test]
    fn test_g2_outcome_binding() {
        let tx = sha256(b"op");
        let keys = vec![SigningKey::from_bytes(&[5u8; 32])];
        let outcome = b"transfer settled".to_vec();

        let mut payload = g1_payload(&tx, &keys, &[0], 1);
        payload["outcome"] = json!(hex::encode(&outcome));
        payload["outcome_hash"] = json!(hex::encode(sha256(&outcome)));
        let good = GovernanceProof::new(GovernanceLevel::G2, payload.clone());
        assert!(SignatureGovernanceValidator.validate(&tx, &good).passed);

        payload["outcome_hash"] = json!(hex::encode(sha256(b"something else")));
        let bad = GovernanceProof::new(GovernanceLevel::G2, payload);
        let verdict = SignatureGovernanceValidator.validate(&tx, &bad);
        assert!(!verdict.passed);
        assert_eq!(verdict.detail, "outcome binding mismatch");
    }
}
