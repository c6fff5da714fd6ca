//! Codec for the 32 byte metadata carried by every certificate.
//!
//! Version 1 layout: byte 0 version, bytes 1..9 first block (big endian),
//! bytes 9..13 block offset to the last block, bytes 13..17 creation time,
//! remaining bytes zero. Later versions are read with the version 1 layout.
//! Certificates built before versioning carried the last block number as a big
//! endian integer filling the whole word.

use crate::MetadataError;
use alloy_primitives::{B256, U256};

/// Current metadata layout version.
pub const METADATA_VERSION: u8 = 1;

/// Decoded certificate metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateMetadata {
    /// pre-versioned metadata, only the last block is known
    Legacy { to_block: u64 },
    V1 {
        from_block: u64,
        /// number of blocks after `from_block` covered by the certificate
        offset: u32,
        created_at: u32,
    },
}

impl CertificateMetadata {
    pub fn new(from_block: u64, offset: u32, created_at: u32) -> Self {
        CertificateMetadata::V1 {
            from_block,
            offset,
            created_at,
        }
    }

    pub fn decode(hash: &B256) -> Result<Self, MetadataError> {
        match hash[0] {
            0 => {
                let to_block = U256::from_be_bytes(hash.0);
                let to_block =
                    u64::try_from(to_block).map_err(|_| MetadataError::LegacyOverflow)?;
                Ok(CertificateMetadata::Legacy { to_block })
            }
            _ => {
                let mut from_block = [0u8; 8];
                from_block.copy_from_slice(&hash[1..9]);
                let mut offset = [0u8; 4];
                offset.copy_from_slice(&hash[9..13]);
                let mut created_at = [0u8; 4];
                created_at.copy_from_slice(&hash[13..17]);
                let from_block = u64::from_be_bytes(from_block);
                let offset = u32::from_be_bytes(offset);
                if from_block.checked_add(u64::from(offset)).is_none() {
                    return Err(MetadataError::BlockRangeOverflow { from_block, offset });
                }
                Ok(CertificateMetadata::V1 {
                    from_block,
                    offset,
                    created_at: u32::from_be_bytes(created_at),
                })
            }
        }
    }

    pub fn to_hash(&self) -> B256 {
        match self {
            CertificateMetadata::Legacy { to_block } => U256::from(*to_block).into(),
            CertificateMetadata::V1 {
                from_block,
                offset,
                created_at,
            } => {
                let mut value = [0u8; 32];
                value[0] = METADATA_VERSION;
                value[1..9].copy_from_slice(&from_block.to_be_bytes());
                value[9..13].copy_from_slice(&offset.to_be_bytes());
                value[13..17].copy_from_slice(&created_at.to_be_bytes());
                B256::from(value)
            }
        }
    }

    /// first block covered, unknown for legacy metadata
    pub fn from_block(&self) -> Option<u64> {
        match self {
            CertificateMetadata::Legacy { .. } => None,
            CertificateMetadata::V1 { from_block, .. } => Some(*from_block),
        }
    }

    pub fn to_block(&self) -> u64 {
        match self {
            CertificateMetadata::Legacy { to_block } => *to_block,
            CertificateMetadata::V1 {
                from_block, offset, ..
            } => from_block.saturating_add(u64::from(*offset)),
        }
    }

    pub fn created_at(&self) -> Option<u32> {
        match self {
            CertificateMetadata::Legacy { .. } => None,
            CertificateMetadata::V1 { created_at, .. } => Some(*created_at),
        }
    }
}
