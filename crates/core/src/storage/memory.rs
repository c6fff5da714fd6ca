//! In-memory certificate store.

use super::CertificateStore;
use crate::{CertificateInfo, StorageError};
use aggsender_agglayer::CertificateStatus;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        RwLock,
    },
};

/// Store kept in memory, for tests and dry runs. Saves can be made to fail on
/// purpose to exercise the retry path of the sender.
#[derive(Debug, Default)]
pub struct MemoryCertificateStore {
    keep_history: bool,
    certificates: RwLock<BTreeMap<u64, CertificateInfo>>,
    history: RwLock<Vec<CertificateInfo>>,
    failing_saves: AtomicU32,
}

impl MemoryCertificateStore {
    pub fn new(keep_history: bool) -> Self {
        Self {
            keep_history,
            ..Default::default()
        }
    }

    /// Makes the next `count` saves fail.
    pub fn fail_next_saves(&self, count: u32) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }
}

impl CertificateStore for MemoryCertificateStore {
    fn get_last_sent_certificate(&self) -> Result<Option<CertificateInfo>, StorageError> {
        let certificates = self
            .certificates
            .read()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(certificates.values().next_back().cloned())
    }

    fn save_last_sent_certificate(
        &self,
        certificate: &CertificateInfo,
    ) -> Result<(), StorageError> {
        let injected = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if injected.is_ok() {
            return Err(StorageError::Backend("injected save failure".to_string()));
        }

        let mut certificates = self
            .certificates
            .write()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if let Some(replaced) = certificates.insert(certificate.height, certificate.clone()) {
            if self.keep_history {
                self.history
                    .write()
                    .map_err(|e| StorageError::Backend(e.to_string()))?
                    .push(replaced);
            }
        }
        Ok(())
    }

    fn get_certificate_by_height(
        &self,
        height: u64,
    ) -> Result<Option<CertificateInfo>, StorageError> {
        let certificates = self
            .certificates
            .read()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(certificates.get(&height).cloned())
    }

    fn get_certificates_by_status(
        &self,
        statuses: &[CertificateStatus],
    ) -> Result<Vec<CertificateInfo>, StorageError> {
        let certificates = self
            .certificates
            .read()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(certificates
            .values()
            .filter(|certificate| statuses.contains(&certificate.status))
            .cloned()
            .collect())
    }

    fn update_certificate(&self, certificate: &CertificateInfo) -> Result<(), StorageError> {
        let mut certificates = self
            .certificates
            .write()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let stored = certificates
            .get_mut(&certificate.height)
            .filter(|stored| stored.certificate_id == certificate.certificate_id)
            .ok_or(StorageError::NotFound(certificate.certificate_id))?;
        stored.status = certificate.status;
        stored.updated_at = certificate.updated_at;
        Ok(())
    }

    fn get_certificate_history(
        &self,
        height: u64,
    ) -> Result<Vec<CertificateInfo>, StorageError> {
        let history = self
            .history
            .read()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(history
            .iter()
            .filter(|certificate| certificate.height == height)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::*;

    #[test]
    fn test_last_sent_and_by_height() {
        check_last_sent_and_by_height(&MemoryCertificateStore::new(false));
    }

    #[test]
    fn test_replace_same_height() {
        check_replace_same_height(&MemoryCertificateStore::new(false), false);
        check_replace_same_height(&MemoryCertificateStore::new(true), true);
    }

    #[test]
    fn test_status_queries_and_updates() {
        check_status_queries_and_updates(&MemoryCertificateStore::new(false));
    }

    #[test]
    fn test_injected_failures() {
        let store = MemoryCertificateStore::new(false);
        store.fail_next_saves(2);
        let info = certificate(0, 0, CertificateStatus::Pending);
        assert!(store.save_last_sent_certificate(&info).is_err());
        assert!(store.save_last_sent_certificate(&info).is_err());
        assert!(store.save_last_sent_certificate(&info).is_ok());
        assert_eq!(store.get_last_sent_certificate().unwrap(), Some(info));
    }
}
