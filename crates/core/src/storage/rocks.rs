//! Certificate store backed by RocksDB.
//!
//! Records live in the `certificate_info` column family keyed by the big endian
//! height, so the last entry is the last sent certificate. Replaced records move
//! to `certificate_info_history`, keyed by height, retry count and id.

use super::CertificateStore;
use crate::{CertificateInfo, StorageError};
use aggsender_agglayer::CertificateStatus;
use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use std::{path::Path, sync::Mutex};
use tracing::debug;

const CF_CERTIFICATES: &str = "certificate_info";
const CF_HISTORY: &str = "certificate_info_history";

fn height_key(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

fn history_key(certificate: &CertificateInfo) -> Vec<u8> {
    let mut key = Vec::with_capacity(44);
    key.extend_from_slice(&certificate.height.to_be_bytes());
    key.extend_from_slice(&certificate.retry_count.to_be_bytes());
    key.extend_from_slice(certificate.certificate_id.as_slice());
    key
}

fn decode(value: &[u8]) -> Result<CertificateInfo, StorageError> {
    Ok(serde_json::from_slice(value)?)
}

pub struct RocksCertificateStore {
    db: DB,
    keep_history: bool,
    /// serializes read-modify-write sequences
    write_lock: Mutex<()>,
}

impl RocksCertificateStore {
    pub fn open(path: impl AsRef<Path>, keep_history: bool) -> Result<Self, StorageError> {
        let db = DB::open_cf(&Self::get_db_options(), path, [CF_CERTIFICATES, CF_HISTORY])?;
        Ok(Self {
            db,
            keep_history,
            write_lock: Mutex::new(()),
        })
    }

    fn get_db_options() -> Options {
        let mut options = Options::default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);
        options
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or(StorageError::MissingColumnFamily(name))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, StorageError> {
        self.write_lock
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn read_all(&self) -> Result<Vec<CertificateInfo>, StorageError> {
        self.db
            .iterator_cf(self.cf(CF_CERTIFICATES)?, IteratorMode::Start)
            .map(|entry| decode(&entry?.1))
            .collect()
    }
}

impl CertificateStore for RocksCertificateStore {
    fn get_last_sent_certificate(&self) -> Result<Option<CertificateInfo>, StorageError> {
        self.db
            .iterator_cf(self.cf(CF_CERTIFICATES)?, IteratorMode::End)
            .next()
            .map(|entry| decode(&entry?.1))
            .transpose()
    }

    fn save_last_sent_certificate(
        &self,
        certificate: &CertificateInfo,
    ) -> Result<(), StorageError> {
        let _guard = self.lock()?;
        let certificates = self.cf(CF_CERTIFICATES)?;
        let key = height_key(certificate.height);

        let mut batch = WriteBatch::default();
        if let Some(replaced) = self.db.get_cf(certificates, key)? {
            let replaced = decode(&replaced)?;
            debug!(target: "aggsender", %replaced, "replacing stored certificate");
            if self.keep_history {
                batch.put_cf(
                    self.cf(CF_HISTORY)?,
                    history_key(&replaced),
                    serde_json::to_vec(&replaced)?,
                );
            }
        }
        batch.put_cf(certificates, key, serde_json::to_vec(certificate)?);
        self.db.write(batch)?;
        Ok(())
    }

    fn get_certificate_by_height(
        &self,
        height: u64,
    ) -> Result<Option<CertificateInfo>, StorageError> {
        self.db
            .get_cf(self.cf(CF_CERTIFICATES)?, height_key(height))?
            .map(|value| decode(&value))
            .transpose()
    }

    fn get_certificates_by_status(
        &self,
        statuses: &[CertificateStatus],
    ) -> Result<Vec<CertificateInfo>, StorageError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|certificate| statuses.contains(&certificate.status))
            .collect())
    }

    fn update_certificate(&self, certificate: &CertificateInfo) -> Result<(), StorageError> {
        let _guard = self.lock()?;
        let mut stored = self
            .get_certificate_by_height(certificate.height)?
            .filter(|stored| stored.certificate_id == certificate.certificate_id)
            .ok_or(StorageError::NotFound(certificate.certificate_id))?;
        stored.status = certificate.status;
        stored.updated_at = certificate.updated_at;
        self.db.put_cf(
            self.cf(CF_CERTIFICATES)?,
            height_key(stored.height),
            serde_json::to_vec(&stored)?,
        )?;
        Ok(())
    }

    fn get_certificate_history(
        &self,
        height: u64,
    ) -> Result<Vec<CertificateInfo>, StorageError> {
        let prefix = height_key(height);
        let mut history = Vec::new();
        let iter = self.db.iterator_cf(
            self.cf(CF_HISTORY)?,
            IteratorMode::From(&prefix, Direction::Forward),
        );
        for entry in iter {
            let (key, value) = entry?;
            if !key.starts_with(&prefix) {
                break;
            }
            history.push(decode(&value)?);
        }
        Ok(history)
    }
}
