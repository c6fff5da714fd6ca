//! Builds, signs, submits and reconciles agglayer certificates for a l2 network.

pub mod config;
pub use config::{AggSenderConfig, ConfigError};

pub mod errors;
pub use errors::{
    AggSenderError, BuildError, HeightError, RecoveryError, SignerError, SourceError,
    StorageError,
};

pub mod types;
pub use types::{Bridge, CertificateInfo, Claim, StatusChange};

pub mod params;
pub use params::CertificateBuildParams;

pub mod ports;
pub use ports::{ExitTree, ExitTreeTx, L1InfoTreeSyncer, L2BridgeSyncer};

pub mod merkle;

pub mod builder;
pub use builder::CertificateBuilder;

pub mod size_governor;
pub use size_governor::limit_certificate_size;

pub mod height;
pub use height::{next_height_and_previous_ler, ZERO_LER};

pub mod signer;
pub use signer::{sign_certificate, split_signature, CertificateSigner, LocalCertificateSigner};

pub mod storage;
pub use storage::{CertificateStore, MemoryCertificateStore, RocksCertificateStore};

pub mod recovery;
pub use recovery::{ReconcileOutcome, Reconciler};

pub mod sender;
pub use sender::{AggSender, AggSenderDeps, RunOutcome};

pub mod status;
pub use status::{AggSenderStatus, SenderStage};

pub mod audit;

pub mod memory;

/// Seconds since the unix epoch, truncated to the width certificates carry.
pub fn now_unix() -> u32 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as u32)
}
