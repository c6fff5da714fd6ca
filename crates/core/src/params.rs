//! Input of a certificate build: the events of a block range.

use crate::{Bridge, BuildError, Claim};
use std::fmt;

const ESTIMATED_SIZE_BRIDGE_EXIT: u64 = 230;
const ESTIMATED_SIZE_IMPORTED_BRIDGE_EXIT: u64 = 8_000;

/// Bridges and claims of the blocks `[from_block, to_block]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateBuildParams {
    pub from_block: u64,
    pub to_block: u64,
    pub bridges: Vec<Bridge>,
    pub claims: Vec<Claim>,
    pub created_at: u32,
}

impl CertificateBuildParams {
    /// Narrows the params to a sub-range, keeping only the events inside it.
    pub fn range(&self, from_block: u64, to_block: u64) -> Result<Self, BuildError> {
        if self.from_block == from_block && self.to_block == to_block {
            return Ok(self.clone());
        }
        if from_block < self.from_block || to_block > self.to_block || from_block > to_block {
            return Err(BuildError::RangeOutOfBounds {
                from: from_block,
                to: to_block,
                min: self.from_block,
                max: self.to_block,
            });
        }
        let in_range = |block: u64| block >= from_block && block <= to_block;
        Ok(Self {
            from_block,
            to_block,
            bridges: self
                .bridges
                .iter()
                .filter(|bridge| in_range(bridge.block_num))
                .cloned()
                .collect(),
            claims: self
                .claims
                .iter()
                .filter(|claim| in_range(claim.block_num))
                .cloned()
                .collect(),
            created_at: self.created_at,
        })
    }

    pub fn number_of_blocks(&self) -> u64 {
        self.to_block - self.from_block + 1
    }

    /// Rough encoded size of the certificate these params produce. Never
    /// decreases when events are added.
    pub fn estimated_size(&self) -> u64 {
        let metadata: u64 = self
            .bridges
            .iter()
            .map(|bridge| bridge.metadata.len() as u64)
            .chain(self.claims.iter().map(|claim| claim.metadata.len() as u64))
            .sum();
        self.bridges.len() as u64 * ESTIMATED_SIZE_BRIDGE_EXIT
            + self.claims.len() as u64 * ESTIMATED_SIZE_IMPORTED_BRIDGE_EXIT
            + metadata * 3 / 2
    }

    /// highest exit tree index written in the range
    pub fn max_deposit_count(&self) -> u32 {
        self.bridges
            .iter()
            .map(|bridge| bridge.deposit_count)
            .max()
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty() && self.claims.is_empty()
    }
}

impl fmt::Display for CertificateBuildParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "blocks: [{}, {}], bridges: {}, claims: {}, created_at: {}",
            self.from_block,
            self.to_block,
            self.bridges.len(),
            self.claims.len(),
            self.created_at
        )
    }
}
