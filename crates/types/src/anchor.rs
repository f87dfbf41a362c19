use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::batch::BatchId;
use crate::hash::{hex32, Hash32};

pub type AnchorId = Uuid;

/// Identifier of an external chain an anchor is written to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetChain(String);

impl TargetChain {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn ethereum() -> Self {
        Self::new("ethereum")
    }

    pub fn bitcoin() -> Self {
        Self::new("bitcoin")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetChain {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// On-chain footprint of one batch's Merkle root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub anchor_id: AnchorId,
    pub batch_id: BatchId,
    pub target_chain: TargetChain,
    pub anchor_tx_hash: String,

    #[serde(with = "hex32")]
    pub merkle_root: Hash32,

    pub block_number: Option<u64>,
    pub confirmations: u64,
    pub required_confirmations: u64,

    /// Once true this only reverts through a reorg
    pub is_final: bool,
    pub reorged: bool,
    pub confirmed_at: Option<u64>,

    pub validator_id: String,
    pub created_at: u64,
    pub updated_at: u64,
}

impl AnchorRecord {
    pub fn new(
        batch_id: BatchId,
        target_chain: TargetChain,
        anchor_tx_hash: impl Into<String>,
        merkle_root: Hash32,
        required_confirmations: u64,
        validator_id: impl Into<String>,
        now: u64,
    ) -> Self {
        Self {
            anchor_id: Uuid::new_v4(),
            batch_id,
            target_chain,
            anchor_tx_hash: anchor_tx_hash.into(),
            merkle_root,
            block_number: None,
            confirmations: 0,
            required_confirmations,
            is_final: false,
            reorged: false,
            confirmed_at: None,
            validator_id: validator_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn meets_threshold(&self) -> bool {
        self.confirmations >= self.required_confirmations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold() {
        let mut anchor = AnchorRecord::new(
            Uuid::new_v4(),
            TargetChain::ethereum(),
            "0xabc",
            [1u8; 32],
            12,
            "validator-1",
            0,
        );
        assert!(!anchor.meets_threshold());
        anchor.confirmations = 12;
        assert!(anchor.meets_threshold());
    }

    #[test]
    fn test_target_chain_is_transparent() {
        let json = serde_json::to_string(&TargetChain::bitcoin()).unwrap();
        assert_eq!(json, "\"bitcoin\"");
    }
}
