//! Append-only keccak merkle tree of fixed depth, as used by the exit trees
//! and the l1 info tree.

use crate::SourceError;
use aggsender_agglayer::{Proof, TREE_DEPTH};
use alloy_primitives::{keccak256, B256};
use lazy_static::lazy_static;

lazy_static! {
    /// Root of an empty subtree at every height.
    pub static ref ZERO_HASHES: [B256; TREE_DEPTH + 1] = {
        let mut hashes = [B256::ZERO; TREE_DEPTH + 1];
        for height in 1..=TREE_DEPTH {
            hashes[height] = hash_pair(&hashes[height - 1], &hashes[height - 1]);
        }
        hashes
    };
}

fn hash_pair(left: &B256, right: &B256) -> B256 {
    keccak256([left.as_slice(), right.as_slice()].concat())
}

/// Hashes one level up, padding an odd level with the empty subtree root.
fn next_layer(mut layer: Vec<B256>, height: usize) -> Vec<B256> {
    if layer.len() % 2 == 1 {
        layer.push(ZERO_HASHES[height]);
    }
    layer
        .chunks(2)
        .map(|pair| hash_pair(&pair[0], &pair[1]))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendOnlyTree {
    leaves: Vec<B256>,
}

impl AppendOnlyTree {
    pub fn new(leaves: Vec<B256>) -> Self {
        Self { leaves }
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Appends `leaf`, which must land exactly at `index`.
    pub fn add_leaf(&mut self, index: u32, leaf: B256) -> Result<(), SourceError> {
        if index as usize != self.leaves.len() {
            return Err(SourceError::Backend(format!(
                "leaf index {index} out of order, next index is {}",
                self.leaves.len()
            )));
        }
        self.leaves.push(leaf);
        Ok(())
    }

    /// Root of the tree holding the leaves up to and including `index`.
    pub fn root_at_index(&self, index: u32) -> Result<B256, SourceError> {
        let count = index as usize + 1;
        if count > self.leaves.len() {
            return Err(SourceError::NotFound(format!("exit tree root at index {index}")));
        }
        Ok(self.root_of(count))
    }

    /// Root of the tree holding the first `count` leaves.
    pub fn root_of(&self, count: usize) -> B256 {
        let mut layer = self.leaves[..count.min(self.leaves.len())].to_vec();
        if layer.is_empty() {
            return ZERO_HASHES[TREE_DEPTH];
        }
        for height in 0..TREE_DEPTH {
            layer = next_layer(layer, height);
        }
        layer[0]
    }

    /// Sibling path of the leaf at `index` in the tree holding the first `count` leaves.
    pub fn proof(&self, index: u32, count: usize) -> Result<Proof, SourceError> {
        if index as usize >= count || count > self.leaves.len() {
            return Err(SourceError::NotFound(format!(
                "proof for leaf {index} in a tree of {count} leaves"
            )));
        }
        let mut proof = [B256::ZERO; TREE_DEPTH];
        let mut layer = self.leaves[..count].to_vec();
        let mut position = index as usize;
        for (height, sibling) in proof.iter_mut().enumerate() {
            *sibling = layer
                .get(position ^ 1)
                .copied()
                .unwrap_or(ZERO_HASHES[height]);
            layer = next_layer(layer, height);
            position /= 2;
        }
        Ok(proof)
    }

    /// Number of leaves the tree held when its root was `root`.
    pub fn count_for_root(&self, root: B256) -> Option<usize> {
        (1..=self.leaves.len()).find(|count| self.root_of(*count) == root)
    }
}
