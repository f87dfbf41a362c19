use anchor_proofs_types::{Hash32, MerklePathNode, PathSide};
use serde::{Deserialize, Serialize};

use crate::tree::hash_pair;

/// Fold `leaf` through `path` and return the resulting root.
pub fn compute_root(leaf: &Hash32, path: &[MerklePathNode]) -> Hash32 {
    path.iter().fold(*leaf, |acc, node| match node.position {
        PathSide::Left => hash_pair(&node.hash, &acc),
        PathSide::Right => hash_pair(&acc, &node.hash),
    })
}

/// True iff `path` leads from `leaf` to exactly `root`.
pub fn verify_path(leaf: &Hash32, path: &[MerklePathNode], root: &Hash32) -> bool {
    compute_root(leaf, path) == *root
}

/// One entry of a receipt chain. `right` means the entry hash sits on the right.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptEntry {
    #[serde(with = "anchor_proofs_types::hash::hex32")]
    pub hash: Hash32,
    #[serde(default)]
    pub right: bool,
}

/// Recompute a receipt from `start` and compare against `anchor`.
pub fn verify_receipt(start: &Hash32, entries: &[ReceiptEntry], anchor: &Hash32) -> bool {
    let path: Vec<MerklePathNode> = entries
        .iter()
        .map(|e| {
            let side = if e.right {
                PathSide::Right
            } else {
                PathSide::Left
            };
            MerklePathNode::new(e.hash, side)
        })
        .collect();
    verify_path(start, &path, anchor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_tree;

    #[test]
    fn test_tampered_root_fails() {
        let leaves = [[1u8; 32], [2u8; 32], [3u8; 32]];
        let (root, paths) = build_tree(&leaves).unwrap();
        assert!(verify_path(&leaves[0], &paths[0], &root));

        let mut bad_root = root;
        bad_root[31] ^= 1;
        assert!(!verify_path(&leaves[0], &paths[0], &bad_root));
    }

    #[test]
    fn test_flipped_side_fails() {
        let leaves = [[1u8; 32], [2u8; 32]];
        let (root, mut paths) = build_tree(&leaves).unwrap();
        paths[0][0].position = PathSide::Left;
        assert!(!verify_path(&leaves[0], &paths[0], &root));
    }

    #[test]
    fn test_receipt_matches_path_semantics() {
        let start = [9u8; 32];
        let sibling = [4u8; 32];
        let anchor = hash_pair(&start, &sibling);
        let entries = vec![ReceiptEntry {
            hash: sibling,
            right: true,
        }];
        assert!(verify_receipt(&start, &entries, &anchor));
        assert!(!verify_receipt(&sibling, &entries, &anchor));
        assert!(verify_receipt(&start, &[], &start));
    }
}
