//! The composite key locating a claimed exit.

use alloy_primitives::{keccak256, B256, U256};
use serde::{Deserialize, Serialize};

const MAINNET_FLAG_BIT: usize = 64;
const ROLLUP_INDEX_SHIFT: usize = 32;

/// Position of a claimed exit: the mainnet flag at bit 64, the rollup index in
/// bits 32..64 and the leaf index in bits 0..32 of the packed integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GlobalIndex {
    pub mainnet_flag: bool,
    pub rollup_index: u32,
    pub leaf_index: u32,
}

impl GlobalIndex {
    pub fn new(mainnet_flag: bool, rollup_index: u32, leaf_index: u32) -> Self {
        Self {
            mainnet_flag,
            rollup_index,
            leaf_index,
        }
    }

    /// Unpacks a global index. Bits above the mainnet flag are ignored.
    pub fn decode(packed: U256) -> Self {
        let low = packed.as_limbs()[0];
        Self {
            mainnet_flag: packed.bit(MAINNET_FLAG_BIT),
            rollup_index: (low >> ROLLUP_INDEX_SHIFT) as u32,
            leaf_index: low as u32,
        }
    }

    pub fn encode(&self) -> U256 {
        let mut packed = U256::from(self.leaf_index)
            | (U256::from(self.rollup_index) << ROLLUP_INDEX_SHIFT);
        if self.mainnet_flag {
            packed.set_bit(MAINNET_FLAG_BIT, true);
        }
        packed
    }

    /// keccak of the packed index in little-endian order
    pub fn hash(&self) -> B256 {
        keccak256(self.encode().to_le_bytes::<32>())
    }
}
