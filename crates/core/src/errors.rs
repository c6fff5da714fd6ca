//! Error taxonomy of the sender.

use aggsender_agglayer::{AgglayerError, CertificateStatus, MetadataError};
use alloy_primitives::B256;

/// Failures of the event sources and trees the sender reads from.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// the requested item is not known to the source
    #[error("not found: {0}")]
    NotFound(String),
    /// the source failed to answer
    #[error("source backend error: {0}")]
    Backend(String),
}

/// Failures of the lifecycle store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("certificate encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    /// no stored certificate has this id
    #[error("certificate {0} not found")]
    NotFound(B256),
    #[error("missing column family {0}")]
    MissingColumnFamily(&'static str),
}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::Backend(e.to_string())
    }
}

/// Failures resolving the height and previous local exit root of the next certificate.
#[derive(Debug, thiserror::Error)]
pub enum HeightError {
    /// one certificate in flight at a time
    #[error("last sent certificate at height {height} is {status}, it must be closed before building a new one")]
    LastCertificateNotClosed {
        height: u64,
        status: CertificateStatus,
    },
    #[error("previous certificate at height {0} not found")]
    PreviousNotFound(u64),
    #[error("previous certificate at height {height} is {status}, expected Settled")]
    PreviousNotSettled {
        height: u64,
        status: CertificateStatus,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failures building a certificate. The whole build is aborted.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no bridges and claims to build certificate")]
    NoBridgesOrClaims,
    #[error("block range [{from}, {to}] is outside [{min}, {max}]")]
    RangeOutOfBounds { from: u64, to: u64, min: u64, max: u64 },
    #[error("block range [{from}, {to}] is too wide for certificate metadata")]
    RangeTooWide { from: u64, to: u64 },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Height(#[from] HeightError),
}

/// Failures producing a signature.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("invalid signature size {0}, expected 65 bytes")]
    InvalidSignatureSize(usize),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("invalid private key: {0}")]
    InvalidKey(String),
}

/// Failures aligning the local store with the agglayer at startup.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("local certificate at height {0} is unknown to the agglayer")]
    MissingOnAgglayer(u64),
    #[error("agglayer is at height {remote}, behind the local height {local}")]
    AgglayerBehind { remote: u64, local: u64 },
    #[error("certificate id mismatch at height {height}: local {local}, agglayer {remote}")]
    DivergentCertificate {
        height: u64,
        local: B256,
        remote: B256,
    },
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Agglayer(#[from] AgglayerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RecoveryError {
    /// Local and agglayer histories disagree, or the agglayer data cannot be
    /// read. Retrying does not help.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RecoveryError::MissingOnAgglayer(_)
                | RecoveryError::AgglayerBehind { .. }
                | RecoveryError::DivergentCertificate { .. }
                | RecoveryError::Metadata(_)
        )
    }
}

/// Top level error of the sender.
#[derive(Debug, thiserror::Error)]
pub enum AggSenderError {
    #[error("build error: {0}")]
    Build(#[from] BuildError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error(transparent)]
    Agglayer(#[from] AgglayerError),
    #[error("recovery error: {0}")]
    Recovery(#[from] RecoveryError),
    #[error("certificate encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    /// the agglayer holds the certificate but the local store does not
    #[error("certificate {certificate_id} at height {height} was accepted by the agglayer but not stored after {attempts} attempts: {source}")]
    StoreExhausted {
        height: u64,
        certificate_id: B256,
        attempts: u32,
        source: StorageError,
    },
    #[error("cancelled")]
    Cancelled,
}
