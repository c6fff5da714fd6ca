//! Startup reconciliation of the local store with the agglayer.

use crate::{now_unix, CertificateInfo, CertificateStore, RecoveryError, StatusChange, StorageError};
use aggsender_agglayer::{AgglayerClient, CertificateHeader};
use tracing::{info, warn};

/// What reconciliation did to the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// neither side knows a certificate
    NothingToDo,
    /// the store was empty and now holds the agglayer certificate
    AdoptedRemote { height: u64 },
    /// the agglayer held the next certificate, sent but never stored locally
    RecoveredUnstored { height: u64 },
    /// both sides agree on the last certificate
    InSync { height: u64, change: StatusChange },
}

/// Copies the agglayer status of `header` into `certificate` and the store.
pub(crate) fn refresh_certificate_status(
    store: &dyn CertificateStore,
    certificate: &mut CertificateInfo,
    header: &CertificateHeader,
) -> Result<StatusChange, StorageError> {
    let change = certificate.apply_status(header.status, now_unix());
    match change {
        StatusChange::Unchanged => return Ok(change),
        StatusChange::Updated { from, to } => {
            info!(target: "aggsender", certificate_id = %certificate.certificate_id, height = certificate.height, %from, %to, "certificate changed status");
        }
        StatusChange::Reopened { from, to } => {
            warn!(target: "aggsender", certificate_id = %certificate.certificate_id, height = certificate.height, %from, %to, "certificate is reopened");
        }
    }
    store.update_certificate(certificate)?;
    Ok(change)
}

/// Compares the last certificate stored locally with the last one the
/// agglayer knows for the network and aligns the store with it.
pub struct Reconciler<'a> {
    agglayer: &'a dyn AgglayerClient,
    store: &'a dyn CertificateStore,
    network_id: u32,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        agglayer: &'a dyn AgglayerClient,
        store: &'a dyn CertificateStore,
        network_id: u32,
    ) -> Self {
        Self {
            agglayer,
            store,
            network_id,
        }
    }

    /// Runs one reconciliation pass. Errors for which [RecoveryError::is_fatal]
    /// holds mean the histories diverged and the sender must not start.
    pub async fn reconcile(&self) -> Result<ReconcileOutcome, RecoveryError> {
        info!(target: "aggsender", network_id = self.network_id, "recovery: checking last certificate from agglayer");
        let remote = self
            .agglayer
            .get_latest_known_certificate_header(self.network_id)
            .await?;
        let local = self.store.get_last_sent_certificate()?;

        let (mut local, remote) = match (local, remote) {
            (None, None) => {
                info!(target: "aggsender", "recovery: no certificates in local storage and agglayer, initial state");
                return Ok(ReconcileOutcome::NothingToDo);
            }
            (None, Some(remote)) => {
                info!(target: "aggsender", %remote, "recovery: adopting the agglayer certificate, local storage is empty");
                self.store_remote(&remote)?;
                return Ok(ReconcileOutcome::AdoptedRemote {
                    height: remote.height,
                });
            }
            (Some(local), None) => return Err(RecoveryError::MissingOnAgglayer(local.height)),
            (Some(local), Some(remote)) => (local, remote),
        };

        if remote.height < local.height {
            return Err(RecoveryError::AgglayerBehind {
                remote: remote.height,
                local: local.height,
            });
        }

        let mut recovered = false;
        if remote.height == local.height + 1 {
            info!(target: "aggsender", %remote, "recovery: agglayer holds the next certificate, storing it");
            local = self.store_remote(&remote)?;
            recovered = true;
        }

        if local.certificate_id != remote.certificate_id {
            warn!(target: "aggsender", %local, %remote, "recovery: local certificate differs from the agglayer one");
            return Err(RecoveryError::DivergentCertificate {
                height: local.height,
                local: local.certificate_id,
                remote: remote.certificate_id,
            });
        }

        let change = refresh_certificate_status(self.store, &mut local, &remote)?;
        info!(target: "aggsender", network_id = self.network_id, height = local.height, "recovery: last certificate checked");
        Ok(if recovered {
            ReconcileOutcome::RecoveredUnstored {
                height: local.height,
            }
        } else {
            ReconcileOutcome::InSync {
                height: local.height,
                change,
            }
        })
    }

    fn store_remote(&self, remote: &CertificateHeader) -> Result<CertificateInfo, RecoveryError> {
        let certificate = CertificateInfo::from_agglayer_header(remote, now_unix())?;
        info!(target: "aggsender", %certificate, "setting certificate from agglayer");
        self.store.save_last_sent_certificate(&certificate)?;
        Ok(certificate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{memory::MemoryAgglayer, storage::tests::certificate, MemoryCertificateStore};
    use aggsender_agglayer::{AgglayerError, CertificateMetadata, CertificateStatus, MetadataError};
    use alloy_primitives::B256;

    const NETWORK_ID: u32 = 1;

    fn header(info: &CertificateInfo, status: CertificateStatus) -> CertificateHeader {
        CertificateHeader {
            network_id: NETWORK_ID,
            height: info.height,
            epoch_number: None,
            certificate_index: None,
            certificate_id: info.certificate_id,
            prev_local_exit_root: info.previous_local_exit_root,
            new_local_exit_root: info.new_local_exit_root,
            metadata: CertificateMetadata::new(info.from_block, 9, 77).to_hash(),
            status,
            error: None,
        }
    }

    struct Fixture {
        agglayer: MemoryAgglayer,
        store: MemoryCertificateStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                agglayer: MemoryAgglayer::new(),
                store: MemoryCertificateStore::new(false),
            }
        }

        fn reconciler(&self) -> Reconciler<'_> {
            Reconciler::new(&self.agglayer, &self.store, NETWORK_ID)
        }
    }

    #[tokio::test]
    async fn test_initial_state() {
        let fixture = Fixture::new();
        assert_eq!(
            fixture.reconciler().reconcile().await.unwrap(),
            ReconcileOutcome::NothingToDo
        );
        assert!(fixture.store.get_last_sent_certificate().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_adopts_agglayer_certificate() {
        let fixture = Fixture::new();
        let remote = certificate(5, 0, CertificateStatus::Settled);
        fixture
            .agglayer
            .insert_header(header(&remote, CertificateStatus::Settled));

        assert_eq!(
            fixture.reconciler().reconcile().await.unwrap(),
            ReconcileOutcome::AdoptedRemote { height: 5 }
        );
        let stored = fixture.store.get_last_sent_certificate().unwrap().unwrap();
        assert_eq!(stored.height, 5);
        assert_eq!(stored.certificate_id, remote.certificate_id);
        assert_eq!(stored.status, CertificateStatus::Settled);
        assert_eq!(stored.from_block, 50);
        assert_eq!(stored.to_block, 59);
        assert_eq!(stored.created_at, 77);
        assert_eq!(
            fixture.store.get_certificates_by_status(&CertificateStatus::OPEN).unwrap(),
            vec![]
        );
    }

    #[tokio::test]
    async fn test_adopts_legacy_metadata() {
        let fixture = Fixture::new();
        let remote = certificate(2, 0, CertificateStatus::Pending);
        let mut header = header(&remote, CertificateStatus::Pending);
        header.metadata = B256::left_padding_from(&321u64.to_be_bytes());
        fixture.agglayer.insert_header(header);

        fixture.reconciler().reconcile().await.unwrap();
        let stored = fixture.store.get_last_sent_certificate().unwrap().unwrap();
        assert_eq!(stored.from_block, 0);
        assert_eq!(stored.to_block, 321);
        assert_eq!(stored.status, CertificateStatus::Pending);
    }

    #[tokio::test]
    async fn test_unreadable_metadata_is_fatal() {
        let fixture = Fixture::new();
        let remote = certificate(2, 0, CertificateStatus::Pending);
        let mut header = header(&remote, CertificateStatus::Pending);
        header.metadata = B256::repeat_byte(0xff);
        fixture.agglayer.insert_header(header);

        let err = fixture.reconciler().reconcile().await.unwrap_err();
        assert!(matches!(
            err,
            RecoveryError::Metadata(MetadataError::BlockRangeOverflow { .. })
        ));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_local_without_agglayer_is_fatal() {
        let fixture = Fixture::new();
        fixture
            .store
            .save_last_sent_certificate(&certificate(1, 0, CertificateStatus::Pending))
            .unwrap();
        let err = fixture.reconciler().reconcile().await.unwrap_err();
        assert!(matches!(err, RecoveryError::MissingOnAgglayer(1)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_agglayer_behind_is_fatal() {
        let fixture = Fixture::new();
        let local = certificate(4, 0, CertificateStatus::Pending);
        fixture.store.save_last_sent_certificate(&local).unwrap();
        fixture.agglayer.insert_header(header(
            &certificate(3, 0, CertificateStatus::Settled),
            CertificateStatus::Settled,
        ));
        let err = fixture.reconciler().reconcile().await.unwrap_err();
        assert!(matches!(
            err,
            RecoveryError::AgglayerBehind { remote: 3, local: 4 }
        ));
    }

    #[tokio::test]
    async fn test_recovers_unstored_certificate() {
        let fixture = Fixture::new();
        fixture
            .store
            .save_last_sent_certificate(&certificate(4, 0, CertificateStatus::Settled))
            .unwrap();
        let next = certificate(5, 0, CertificateStatus::Pending);
        fixture
            .agglayer
            .insert_header(header(&next, CertificateStatus::Pending));

        assert_eq!(
            fixture.reconciler().reconcile().await.unwrap(),
            ReconcileOutcome::RecoveredUnstored { height: 5 }
        );
        let stored = fixture.store.get_last_sent_certificate().unwrap().unwrap();
        assert_eq!(stored.height, 5);
        assert_eq!(stored.certificate_id, next.certificate_id);
        assert!(fixture.store.get_certificate_by_height(4).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_divergent_certificate_is_fatal() {
        let fixture = Fixture::new();
        let local = certificate(4, 0, CertificateStatus::Pending);
        fixture.store.save_last_sent_certificate(&local).unwrap();
        let mut remote = header(&local, CertificateStatus::Pending);
        remote.certificate_id = B256::repeat_byte(0xff);
        fixture.agglayer.insert_header(remote);

        let err = fixture.reconciler().reconcile().await.unwrap_err();
        assert!(matches!(
            err,
            RecoveryError::DivergentCertificate { height: 4, .. }
        ));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_refreshes_status_and_is_idempotent() {
        let fixture = Fixture::new();
        let local = certificate(4, 0, CertificateStatus::Pending);
        fixture.store.save_last_sent_certificate(&local).unwrap();
        fixture
            .agglayer
            .insert_header(header(&local, CertificateStatus::InError));

        assert_eq!(
            fixture.reconciler().reconcile().await.unwrap(),
            ReconcileOutcome::InSync {
                height: 4,
                change: StatusChange::Updated {
                    from: CertificateStatus::Pending,
                    to: CertificateStatus::InError
                }
            }
        );
        let after_first = fixture.store.get_last_sent_certificate().unwrap();
        assert_eq!(
            after_first.as_ref().map(|certificate| certificate.status),
            Some(CertificateStatus::InError)
        );

        assert_eq!(
            fixture.reconciler().reconcile().await.unwrap(),
            ReconcileOutcome::InSync {
                height: 4,
                change: StatusChange::Unchanged
            }
        );
        assert_eq!(fixture.store.get_last_sent_certificate().unwrap(), after_first);
    }

    #[tokio::test]
    async fn test_unreachable_agglayer_is_retryable() {
        let fixture = Fixture::new();
        fixture.agglayer.set_unavailable(true);
        let err = fixture.reconciler().reconcile().await.unwrap_err();
        assert!(matches!(
            err,
            RecoveryError::Agglayer(AgglayerError::Unavailable(_))
        ));
        assert!(!err.is_fatal());
    }
}
