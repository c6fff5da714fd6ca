//! Durable record of the certificates sent for one network.
//!
//! One store holds one network stream. The last sent certificate is the record
//! with the greatest height; sending again at a height replaces its record.

use crate::{CertificateInfo, StorageError};
use aggsender_agglayer::CertificateStatus;

mod memory;
pub use memory::MemoryCertificateStore;

mod rocks;
pub use rocks::RocksCertificateStore;

/// Port for certificate persistence.
pub trait CertificateStore: Send + Sync {
    /// The certificate with the greatest height, reflecting every write made
    /// through this store.
    fn get_last_sent_certificate(&self) -> Result<Option<CertificateInfo>, StorageError>;

    /// Records a sent certificate, replacing any record at the same height.
    fn save_last_sent_certificate(&self, certificate: &CertificateInfo)
        -> Result<(), StorageError>;

    fn get_certificate_by_height(&self, height: u64)
        -> Result<Option<CertificateInfo>, StorageError>;

    /// Certificates whose status is one of `statuses`, by ascending height.
    fn get_certificates_by_status(
        &self,
        statuses: &[CertificateStatus],
    ) -> Result<Vec<CertificateInfo>, StorageError>;

    /// Writes the status and update time of a stored certificate.
    fn update_certificate(&self, certificate: &CertificateInfo) -> Result<(), StorageError>;

    /// Records replaced at `height`, oldest first. Empty unless history is kept.
    fn get_certificate_history(&self, height: u64)
        -> Result<Vec<CertificateInfo>, StorageError>;
}
