//! Data model, canonical hashing and client for the agglayer certificate interop API.

pub mod certificate;
pub use certificate::{
    BridgeExit, Certificate, ImportedBridgeExit, LeafType, Signature, SignedCertificate,
    TokenInfo,
};

pub mod claim;
pub use claim::{
    calculate_root, ClaimData, L1InfoTreeLeaf, L1InfoTreeLeafInner, MerkleProof, Proof, TREE_DEPTH,
};

pub mod global_index;
pub use global_index::GlobalIndex;

pub mod metadata;
pub use metadata::{CertificateMetadata, METADATA_VERSION};

pub mod status;
pub use status::{CertificateHeader, CertificateStatus};

pub mod client;
pub use client::{AgglayerClient, HttpAgglayerClient};

pub mod errors;
pub use errors::{AgglayerError, MetadataError};
