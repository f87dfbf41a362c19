//! Merkle engine for anchor batches
//!
//! Builds the commitment tree over a batch's transaction hashes, hands out
//! per-leaf inclusion paths and re-checks them against a claimed root.

pub mod tree;
pub mod verify;

pub use tree::{build_tree, hash_pair, MerkleTree};
pub use verify::{compute_root, verify_path, verify_receipt, ReceiptEntry};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MerkleError {
    #[error("cannot build a merkle tree from zero leaves")]
    EmptyInput,

    #[error("leaf index {index} out of range for {leaf_count} leaves")]
    IndexOutOfRange { index: usize, leaf_count: usize },
}
