//! The certificate submitted to the agglayer and its canonical hashes.

use crate::{ClaimData, GlobalIndex};
use alloy_primitives::{keccak256, Address, Bytes, SignatureError, B256, U256};
use serde::{Deserialize, Serialize};

/// Kind of exit recorded by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LeafType {
    #[default]
    Transfer = 0,
    Message = 1,
}

/// Token identity on its origin network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TokenInfo {
    pub origin_network: u32,
    pub origin_token_address: Address,
}

/// An outbound exit leaving the network.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BridgeExit {
    pub leaf_type: LeafType,
    pub token_info: TokenInfo,
    pub dest_network: u32,
    pub dest_address: Address,
    pub amount: U256,
    /// when set `metadata` already holds the 32 byte keccak of the original payload
    #[serde(default)]
    pub is_metadata_hashed: bool,
    pub metadata: Bytes,
}

impl BridgeExit {
    /// Leaf hash of the exit, as appended to the local exit tree.
    pub fn hash(&self) -> B256 {
        let metadata_hash = match B256::try_from(self.metadata.as_ref()) {
            Ok(hash) if self.is_metadata_hashed => hash,
            _ => keccak256(&self.metadata),
        };
        let mut buf = Vec::with_capacity(113);
        buf.push(self.leaf_type as u8);
        buf.extend_from_slice(&self.token_info.origin_network.to_be_bytes());
        buf.extend_from_slice(self.token_info.origin_token_address.as_slice());
        buf.extend_from_slice(&self.dest_network.to_be_bytes());
        buf.extend_from_slice(self.dest_address.as_slice());
        buf.extend_from_slice(&self.amount.to_be_bytes::<32>());
        buf.extend_from_slice(metadata_hash.as_slice());
        keccak256(buf)
    }
}

/// An inbound exit claimed on this network, with the proofs of its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedBridgeExit {
    pub bridge_exit: BridgeExit,
    pub claim_data: ClaimData,
    pub global_index: GlobalIndex,
}

impl ImportedBridgeExit {
    pub fn hash(&self) -> B256 {
        let mut buf = Vec::with_capacity(96);
        buf.extend_from_slice(self.bridge_exit.hash().as_slice());
        buf.extend_from_slice(self.claim_data.hash().as_slice());
        buf.extend_from_slice(self.global_index.hash().as_slice());
        keccak256(buf)
    }
}

/// Summary of the bridge activity of a network over a block range.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Certificate {
    pub network_id: u32,
    pub height: u64,
    pub prev_local_exit_root: B256,
    pub new_local_exit_root: B256,
    pub bridge_exits: Vec<BridgeExit>,
    pub imported_bridge_exits: Vec<ImportedBridgeExit>,
    pub metadata: B256,
}

impl Certificate {
    /// Identity hash of the certificate content.
    pub fn hash(&self) -> B256 {
        let bridge_exits = keccak256(
            self.bridge_exits
                .iter()
                .flat_map(|exit| exit.hash().0)
                .collect::<Vec<u8>>(),
        );
        let imported_bridge_exits = keccak256(
            self.imported_bridge_exits
                .iter()
                .flat_map(|exit| exit.hash().0)
                .collect::<Vec<u8>>(),
        );

        let mut buf = Vec::with_capacity(172);
        buf.extend_from_slice(&self.network_id.to_be_bytes());
        buf.extend_from_slice(&self.height.to_be_bytes());
        buf.extend_from_slice(self.prev_local_exit_root.as_slice());
        buf.extend_from_slice(self.new_local_exit_root.as_slice());
        buf.extend_from_slice(bridge_exits.as_slice());
        buf.extend_from_slice(imported_bridge_exits.as_slice());
        buf.extend_from_slice(self.metadata.as_slice());
        keccak256(buf)
    }

    /// The digest the network operator signs: the new local exit root bound to
    /// the claims the certificate imports.
    pub fn hash_to_sign(&self) -> B256 {
        let claims = keccak256(
            self.imported_bridge_exits
                .iter()
                .flat_map(|exit| exit.global_index.hash().0)
                .collect::<Vec<u8>>(),
        );
        keccak256([self.new_local_exit_root.as_slice(), claims.as_slice()].concat())
    }
}

/// ECDSA signature in the agglayer wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Signature {
    pub r: B256,
    pub s: B256,
    pub odd_y_parity: bool,
}

impl From<alloy_primitives::Signature> for Signature {
    fn from(signature: alloy_primitives::Signature) -> Self {
        Self {
            r: signature.r().into(),
            s: signature.s().into(),
            odd_y_parity: signature.v(),
        }
    }
}

impl From<Signature> for alloy_primitives::Signature {
    fn from(signature: Signature) -> Self {
        alloy_primitives::Signature::new(
            signature.r.into(),
            signature.s.into(),
            signature.odd_y_parity,
        )
    }
}

/// A certificate together with the signature over [Certificate::hash_to_sign].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCertificate {
    #[serde(flatten)]
    pub certificate: Certificate,
    pub signature: Signature,
}

impl SignedCertificate {
    /// Recovers the address that produced the signature.
    pub fn signer(&self) -> Result<Address, SignatureError> {
        alloy_primitives::Signature::from(self.signature)
            .recover_address_from_prehash(&self.certificate.hash_to_sign())
    }
}
