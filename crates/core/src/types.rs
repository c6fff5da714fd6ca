//! Bridge events read from the l2 and the persisted record of a sent certificate.

use aggsender_agglayer::{
    BridgeExit, CertificateHeader, CertificateMetadata, CertificateStatus, GlobalIndex, LeafType,
    MetadataError, Proof, TokenInfo,
};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder kept as raw certificate for records rebuilt from an agglayer header.
pub const CERTIFICATE_FROM_HEADER: &str = "na/agglayer header";

/// Returns the metadata an exit carries and whether it was hashed.
pub fn convert_bridge_metadata(metadata: &Bytes, as_hash: bool) -> (Bytes, bool) {
    if as_hash && !metadata.is_empty() {
        (Bytes::from(keccak256(metadata).to_vec()), true)
    } else {
        (metadata.clone(), false)
    }
}

/// An outbound bridge event emitted on the l2.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bridge {
    pub block_num: u64,
    pub block_pos: u64,
    pub leaf_type: LeafType,
    pub origin_network: u32,
    pub origin_address: Address,
    pub destination_network: u32,
    pub destination_address: Address,
    pub amount: U256,
    #[serde(default)]
    pub metadata: Bytes,
    /// index of the leaf in the local exit tree
    pub deposit_count: u32,
}

impl Bridge {
    pub fn to_bridge_exit(&self, metadata_as_hash: bool) -> BridgeExit {
        let (metadata, is_metadata_hashed) =
            convert_bridge_metadata(&self.metadata, metadata_as_hash);
        BridgeExit {
            leaf_type: self.leaf_type,
            token_info: TokenInfo {
                origin_network: self.origin_network,
                origin_token_address: self.origin_address,
            },
            dest_network: self.destination_network,
            dest_address: self.destination_address,
            amount: self.amount,
            is_metadata_hashed,
            metadata,
        }
    }

    /// leaf appended to the local exit tree for this event
    pub fn leaf_hash(&self) -> B256 {
        self.to_bridge_exit(false).hash()
    }
}

/// An inbound claim event executed on the l2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub block_num: u64,
    pub block_pos: u64,
    pub global_index: U256,
    pub origin_network: u32,
    pub origin_address: Address,
    pub destination_network: u32,
    pub destination_address: Address,
    pub amount: U256,
    #[serde(default)]
    pub metadata: Bytes,
    #[serde(default)]
    pub is_message: bool,
    pub global_exit_root: B256,
    pub mainnet_exit_root: B256,
    pub rollup_exit_root: B256,
    pub proof_local_exit_root: Proof,
    pub proof_rollup_exit_root: Proof,
}

impl Claim {
    pub fn global_index(&self) -> GlobalIndex {
        GlobalIndex::decode(self.global_index)
    }

    pub fn to_bridge_exit(&self, metadata_as_hash: bool) -> BridgeExit {
        let (metadata, is_metadata_hashed) =
            convert_bridge_metadata(&self.metadata, metadata_as_hash);
        let leaf_type = if self.is_message {
            LeafType::Message
        } else {
            LeafType::Transfer
        };
        BridgeExit {
            leaf_type,
            token_info: TokenInfo {
                origin_network: self.origin_network,
                origin_token_address: self.origin_address,
            },
            dest_network: self.destination_network,
            dest_address: self.destination_address,
            amount: self.amount,
            is_metadata_hashed,
            metadata,
        }
    }
}

/// Outcome of applying a status reported by the agglayer to a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Unchanged,
    Updated {
        from: CertificateStatus,
        to: CertificateStatus,
    },
    /// a closed certificate was reported open again
    Reopened {
        from: CertificateStatus,
        to: CertificateStatus,
    },
}

/// The stored record of a sent certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub height: u64,
    pub retry_count: u32,
    pub certificate_id: B256,
    pub new_local_exit_root: B256,
    pub previous_local_exit_root: Option<B256>,
    pub from_block: u64,
    pub to_block: u64,
    pub status: CertificateStatus,
    pub created_at: u32,
    pub updated_at: u32,
    /// json of the signed certificate as sent
    pub signed_certificate: String,
}

impl CertificateInfo {
    /// Rebuilds a record from what the agglayer reports, for certificates the
    /// local store never recorded.
    pub fn from_agglayer_header(
        header: &CertificateHeader,
        now: u32,
    ) -> Result<Self, MetadataError> {
        let metadata = CertificateMetadata::decode(&header.metadata)?;
        Ok(Self {
            height: header.height,
            retry_count: 0,
            certificate_id: header.certificate_id,
            new_local_exit_root: header.new_local_exit_root,
            previous_local_exit_root: header.prev_local_exit_root,
            from_block: metadata.from_block().unwrap_or_default(),
            to_block: metadata.to_block(),
            status: header.status,
            created_at: metadata.created_at().unwrap_or(now),
            updated_at: now,
            signed_certificate: CERTIFICATE_FROM_HEADER.to_string(),
        })
    }

    /// Takes the status reported by the agglayer, touching `updated_at` when it changed.
    pub fn apply_status(&mut self, status: CertificateStatus, now: u32) -> StatusChange {
        if self.status == status {
            return StatusChange::Unchanged;
        }
        let from = self.status;
        self.status = status;
        self.updated_at = now;
        if from.is_closed() && status.is_open() {
            StatusChange::Reopened { from, to: status }
        } else {
            StatusChange::Updated { from, to: status }
        }
    }
}

impl fmt::Display for CertificateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "height: {}, retry: {}, certificate_id: {}, blocks: [{}, {}], status: {}",
            self.height,
            self.retry_count,
            self.certificate_id,
            self.from_block,
            self.to_block,
            self.status
        )
    }
}
