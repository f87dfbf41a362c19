use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::anchor::{AnchorId, TargetChain};
use crate::batch::{BatchId, MerklePathNode};
use crate::hash::{hex32, Hash32};

pub type ProofId = Uuid;

/// Current artifact format version
pub const PROOF_VERSION: &str = "1.0";

// ═══════════════════════════════════════════════════════════════════════════
// OPTIONAL COMPONENT PAYLOADS
// ═══════════════════════════════════════════════════════════════════════════

/// Ledger-internal proof chain, opaque to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateProof(pub serde_json::Value);

/// Strictness of a governance/authority proof
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GovernanceLevel {
    /// Inclusion and finality only
    G0,
    /// Authority validated
    G1,
    /// Authority plus outcome binding
    G2,
}

impl fmt::Display for GovernanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GovernanceLevel::G0 => "G0",
            GovernanceLevel::G1 => "G1",
            GovernanceLevel::G2 => "G2",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceProof {
    pub level: GovernanceLevel,
    /// Level-specific claims, interpreted by the governance validator
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl GovernanceProof {
    pub fn new(level: GovernanceLevel, payload: serde_json::Value) -> Self {
        Self { level, payload }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PROOF ARTIFACT
// ═══════════════════════════════════════════════════════════════════════════

/// Component 1: the transaction is a leaf under the batch root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    #[serde(with = "hex32")]
    pub merkle_root: Hash32,
    #[serde(with = "hex32")]
    pub leaf_hash: Hash32,
    pub leaf_index: u32,
    pub path: Vec<MerklePathNode>,
}

/// Component 2: the root was anchored on an external chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorReference {
    pub anchor_id: AnchorId,
    pub target_chain: TargetChain,
    pub anchor_tx_hash: String,
    pub block_number: Option<u64>,
    #[serde(with = "hex32")]
    pub anchored_root: Hash32,
    /// Snapshot at assembly time; verification reads the live record
    pub confirmations: u64,
    pub required_confirmations: u64,
}

/// Four-component proof for one batch transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proof {
    pub proof_id: ProofId,
    pub batch_id: BatchId,
    pub transaction_id: Uuid,
    #[serde(with = "hex32")]
    pub tx_hash: Hash32,
    pub account_url: String,

    pub inclusion: InclusionProof,
    pub anchor_reference: AnchorReference,
    pub state_proof: Option<StateProof>,
    pub governance_proof: Option<GovernanceProof>,

    // Verification output, never an input
    pub verified: bool,
    pub verification_time: Option<u64>,
    pub verification_details: Option<VerificationResult>,

    /// Set when the underlying anchor was invalidated by a reorg
    pub stale: bool,

    pub validator_id: String,
    pub proof_version: String,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Proof {
    pub fn governance_level(&self) -> Option<GovernanceLevel> {
        self.governance_proof.as_ref().map(|g| g.level)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// VERIFICATION
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofComponent {
    Inclusion,
    AnchorReference,
    StateProof,
    Governance,
}

impl fmt::Display for ProofComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProofComponent::Inclusion => "inclusion",
            ProofComponent::AnchorReference => "anchor_reference",
            ProofComponent::StateProof => "state_proof",
            ProofComponent::Governance => "governance",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentResult {
    pub component: ProofComponent,
    pub passed: bool,
    pub detail: String,
}

impl ComponentResult {
    pub fn pass(component: ProofComponent, detail: impl Into<String>) -> Self {
        Self {
            component,
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn fail(component: ProofComponent, detail: impl Into<String>) -> Self {
        Self {
            component,
            passed: false,
            detail: detail.into(),
        }
    }
}

/// Outcome of re-checking every present component of a proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub valid: bool,
    pub components: Vec<ComponentResult>,
}

impl VerificationResult {
    pub fn from_components(components: Vec<ComponentResult>) -> Self {
        let valid = components.iter().all(|c| c.passed);
        Self { valid, components }
    }

    pub fn component(&self, component: ProofComponent) -> Option<&ComponentResult> {
        self.components.iter().find(|c| c.component == component)
    }

    pub fn failed_components(&self) -> Vec<ProofComponent> {
        self.components
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.component)
            .collect()
    }
}
