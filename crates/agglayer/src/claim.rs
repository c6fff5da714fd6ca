//! Proof bundles attached to imported bridge exits.

use alloy_primitives::{keccak256, B256};
use serde::{Deserialize, Serialize};

/// Depth of the exit trees and of the l1 info tree.
pub const TREE_DEPTH: usize = 32;

/// Sibling path from a leaf up to the root.
pub type Proof = [B256; TREE_DEPTH];

/// Computes the root reached by walking `siblings` up from `leaf` at position `index`.
pub fn calculate_root(leaf: B256, siblings: &Proof, index: u32) -> B256 {
    let mut node = leaf;
    for (height, sibling) in siblings.iter().enumerate() {
        node = if (index >> height) & 1 == 1 {
            keccak256([sibling.as_slice(), node.as_slice()].concat())
        } else {
            keccak256([node.as_slice(), sibling.as_slice()].concat())
        };
    }
    node
}

/// A root together with the sibling path that proves a leaf against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub root: B256,
    pub proof: Proof,
}

impl MerkleProof {
    pub fn hash(&self) -> B256 {
        let mut buf = Vec::with_capacity((TREE_DEPTH + 1) * 32);
        buf.extend_from_slice(self.root.as_slice());
        for sibling in &self.proof {
            buf.extend_from_slice(sibling.as_slice());
        }
        keccak256(buf)
    }

    /// true when `leaf` at `index` hashes up to `self.root`
    pub fn verify(&self, leaf: B256, index: u32) -> bool {
        calculate_root(leaf, &self.proof, index) == self.root
    }
}

/// The part of an l1 info tree leaf that is hashed into the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct L1InfoTreeLeafInner {
    pub global_exit_root: B256,
    /// hash of the l1 block preceding the one that updated the global exit root
    pub block_hash: B256,
    pub timestamp: u64,
}

impl L1InfoTreeLeafInner {
    pub fn hash(&self) -> B256 {
        let mut buf = Vec::with_capacity(72);
        buf.extend_from_slice(self.global_exit_root.as_slice());
        buf.extend_from_slice(self.block_hash.as_slice());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        keccak256(buf)
    }
}

/// A leaf of the l1 info tree and the exit roots that produced its global exit root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct L1InfoTreeLeaf {
    pub l1_info_tree_index: u32,
    pub rer: B256,
    pub mer: B256,
    pub inner: L1InfoTreeLeafInner,
}

impl L1InfoTreeLeaf {
    pub fn hash(&self) -> B256 {
        let mut buf = Vec::with_capacity(100);
        buf.extend_from_slice(&self.l1_info_tree_index.to_be_bytes());
        buf.extend_from_slice(self.rer.as_slice());
        buf.extend_from_slice(self.mer.as_slice());
        buf.extend_from_slice(self.inner.hash().as_slice());
        keccak256(buf)
    }
}

/// Inclusion proofs for a claim. The shape depends on whether the claimed exit
/// originated on mainnet or on another rollup, as told by the global index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimData {
    Mainnet {
        /// exit leaf against the mainnet exit root
        proof_leaf_mer: MerkleProof,
        /// global exit root against the l1 info root
        proof_ger_l1root: MerkleProof,
        l1_leaf: L1InfoTreeLeaf,
    },
    Rollup {
        /// exit leaf against the origin rollup's local exit root
        proof_leaf_ler: MerkleProof,
        /// local exit root against the rollup exit root
        proof_ler_rer: MerkleProof,
        /// global exit root against the l1 info root
        proof_ger_l1root: MerkleProof,
        l1_leaf: L1InfoTreeLeaf,
    },
}

impl ClaimData {
    pub fn is_mainnet(&self) -> bool {
        matches!(self, ClaimData::Mainnet { .. })
    }

    pub fn l1_leaf(&self) -> &L1InfoTreeLeaf {
        match self {
            ClaimData::Mainnet { l1_leaf, .. } | ClaimData::Rollup { l1_leaf, .. } => l1_leaf,
        }
    }

    pub fn hash(&self) -> B256 {
        let parts = match self {
            ClaimData::Mainnet {
                proof_leaf_mer,
                proof_ger_l1root,
                l1_leaf,
            } => vec![proof_leaf_mer.hash(), proof_ger_l1root.hash(), l1_leaf.hash()],
            ClaimData::Rollup {
                proof_leaf_ler,
                proof_ler_rer,
                proof_ger_l1root,
                l1_leaf,
            } => vec![
                proof_leaf_ler.hash(),
                proof_ler_rer.hash(),
                proof_ger_l1root.hash(),
                l1_leaf.hash(),
            ],
        };
        keccak256(parts.iter().flat_map(|part| part.0).collect::<Vec<u8>>())
    }
}
