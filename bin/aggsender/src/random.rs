//! Certificates with random content, for probing agglayer validation.

use aggsender_agglayer::{
    BridgeExit, Certificate, CertificateMetadata, ClaimData, GlobalIndex, ImportedBridgeExit,
    L1InfoTreeLeaf, L1InfoTreeLeafInner, LeafType, MerkleProof, Signature, TokenInfo,
};
use aggsender_core::now_unix;
use alloy_primitives::{Address, Bytes, B256, U256};
use rand::Rng;

/// At most this many bridge exits and as many imported exits.
const MAX_EXITS: u32 = 8;
const MAX_AMOUNT: u64 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCertificateOptions {
    pub empty_cert: bool,
    /// draw a rollup index for mainnet claims as well
    pub random_global_index: bool,
    pub network_id: Option<u32>,
    pub height: Option<u64>,
}

fn random_hash(rng: &mut impl Rng) -> B256 {
    B256::from(rng.random::<[u8; 32]>())
}

fn random_address(rng: &mut impl Rng) -> Address {
    Address::from(rng.random::<[u8; 20]>())
}

fn random_proof(rng: &mut impl Rng) -> MerkleProof {
    MerkleProof {
        root: random_hash(rng),
        proof: std::array::from_fn(|_| random_hash(rng)),
    }
}

fn random_bridge_exit(rng: &mut impl Rng, amount: U256) -> BridgeExit {
    BridgeExit {
        leaf_type: if rng.random() {
            LeafType::Message
        } else {
            LeafType::Transfer
        },
        token_info: TokenInfo {
            origin_network: rng.random(),
            origin_token_address: random_address(rng),
        },
        dest_network: rng.random(),
        dest_address: random_address(rng),
        amount,
        is_metadata_hashed: true,
        metadata: Bytes::from(random_hash(rng).to_vec()),
    }
}

fn random_l1_leaf(rng: &mut impl Rng) -> L1InfoTreeLeaf {
    L1InfoTreeLeaf {
        l1_info_tree_index: rng.random(),
        rer: random_hash(rng),
        mer: random_hash(rng),
        inner: L1InfoTreeLeafInner {
            global_exit_root: random_hash(rng),
            block_hash: random_hash(rng),
            timestamp: rng.random(),
        },
    }
}

fn random_claim_data(rng: &mut impl Rng) -> ClaimData {
    if rng.random() {
        ClaimData::Rollup {
            proof_leaf_ler: random_proof(rng),
            proof_ler_rer: random_proof(rng),
            proof_ger_l1root: random_proof(rng),
            l1_leaf: random_l1_leaf(rng),
        }
    } else {
        ClaimData::Mainnet {
            proof_leaf_mer: random_proof(rng),
            proof_ger_l1root: random_proof(rng),
            l1_leaf: random_l1_leaf(rng),
        }
    }
}

fn random_global_index(rng: &mut impl Rng, random_rollup_index: bool) -> GlobalIndex {
    let mainnet_flag: bool = rng.random();
    let rollup_index = if random_rollup_index || !mainnet_flag {
        rng.random()
    } else {
        0
    };
    GlobalIndex::new(mainnet_flag, rollup_index, rng.random())
}

/// A certificate with random roots and metadata, and unless `empty_cert` is
/// set the same random number (below 8) of bridge exits and imported exits.
pub fn random_certificate(rng: &mut impl Rng, options: &RandomCertificateOptions) -> Certificate {
    let (bridge_exits, imported_bridge_exits) = if options.empty_cert {
        (Vec::new(), Vec::new())
    } else {
        let count = rng.random_range(0..MAX_EXITS);
        let amount = U256::from(rng.random_range(0..MAX_AMOUNT));
        let bridge_exits = (0..count)
            .map(|_| random_bridge_exit(rng, amount))
            .collect();
        let imported_bridge_exits = (0..count)
            .map(|_| ImportedBridgeExit {
                bridge_exit: random_bridge_exit(rng, amount),
                claim_data: random_claim_data(rng),
                global_index: random_global_index(rng, options.random_global_index),
            })
            .collect();
        (bridge_exits, imported_bridge_exits)
    };

    Certificate {
        network_id: options.network_id.unwrap_or_else(|| rng.random()),
        height: options.height.unwrap_or_else(|| rng.random()),
        prev_local_exit_root: random_hash(rng),
        new_local_exit_root: random_hash(rng),
        bridge_exits,
        imported_bridge_exits,
        metadata: CertificateMetadata::new(rng.random(), rng.random(), now_unix()).to_hash(),
    }
}

/// Random signature bytes, which recover to no meaningful address.
pub fn random_signature(rng: &mut impl Rng) -> Signature {
    Signature {
        r: random_hash(rng),
        s: random_hash(rng),
        odd_y_parity: rng.random(),
    }
}
