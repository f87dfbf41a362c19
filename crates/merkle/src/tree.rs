//! Binary SHA-256 Merkle tree over pre-hashed leaves.
//!
//! internal(l, r) = SHA-256(l || r). Leaves are taken as supplied. When a
//! level has an odd number of nodes the last node is paired with itself,
//! so the tree shape depends only on the leaf count.

use anchor_proofs_types::{Hash32, MerklePathNode, PathSide};
use sha2::{Digest, Sha256};

use crate::MerkleError;

/// Hash two child nodes into their parent.
pub fn hash_pair(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    /// levels[0] = leaves, levels[last] = [root]
    levels: Vec<Vec<Hash32>>,
}

impl MerkleTree {
    pub fn from_leaves(leaves: &[Hash32]) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyInput);
        }

        let mut levels = vec![leaves.to_vec()];
        loop {
            let current = &levels[levels.len() - 1];
            if current.len() == 1 {
                break;
            }
            let next: Vec<Hash32> = current
                .chunks(2)
                .map(|pair| match pair {
                    [l, r] => hash_pair(l, r),
                    [only] => hash_pair(only, only),
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            levels.push(next);
        }

        Ok(Self { levels })
    }

    pub fn root(&self) -> Hash32 {
        // from_leaves guarantees a non-empty top level
        self.levels[self.levels.len() - 1][0]
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    pub fn leaves(&self) -> &[Hash32] {
        &self.levels[0]
    }

    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Inclusion path for the leaf at `index`, ordered leaf to root.
    pub fn path(&self, index: usize) -> Result<Vec<MerklePathNode>, MerkleError> {
        if index >= self.leaf_count() {
            return Err(MerkleError::IndexOutOfRange {
                index,
                leaf_count: self.leaf_count(),
            });
        }

        let mut path = Vec::with_capacity(self.depth());
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let node = if idx % 2 == 0 {
                // Odd tail pairs with itself
                let sibling = level.get(idx + 1).unwrap_or(&level[idx]);
                MerklePathNode::new(*sibling, PathSide::Right)
            } else {
                MerklePathNode::new(level[idx - 1], PathSide::Left)
            };
            path.push(node);
            idx /= 2;
        }
        Ok(path)
    }

    pub fn paths(&self) -> Vec<Vec<MerklePathNode>> {
        (0..self.leaf_count())
            .filter_map(|i| self.path(i).ok())
            .collect()
    }
}

/// Build a tree and return its root together with every leaf's path.
pub fn build_tree(leaves: &[Hash32]) -> Result<(Hash32, Vec<Vec<MerklePathNode>>), MerkleError> {
    let tree = MerkleTree::from_leaves(leaves)?;
    Ok((tree.root(), tree.paths()))
}
