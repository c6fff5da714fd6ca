//! The submission loop: reconciles with the agglayer once, then builds, signs
//! and submits a certificate per tick while none is in flight.

use crate::{
    audit::save_certificate_to_file,
    limit_certificate_size, now_unix,
    recovery::{refresh_certificate_status, ReconcileOutcome, Reconciler},
    sign_certificate, AggSenderConfig, AggSenderError, AggSenderStatus, BuildError,
    CertificateBuildParams, CertificateBuilder, CertificateInfo, CertificateSigner,
    CertificateStore, ExitTree, L1InfoTreeSyncer, L2BridgeSyncer, RecoveryError, SenderStage,
};
use aggsender_agglayer::{AgglayerClient, CertificateStatus, SignedCertificate};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Collaborators of the sender.
#[derive(Clone)]
pub struct AggSenderDeps {
    pub l2_syncer: Arc<dyn L2BridgeSyncer>,
    pub l1_info_tree: Arc<dyn L1InfoTreeSyncer>,
    pub exit_tree: Arc<dyn ExitTree>,
    pub agglayer: Arc<dyn AgglayerClient>,
    pub store: Arc<dyn CertificateStore>,
    pub signer: Arc<dyn CertificateSigner>,
}

/// Why [AggSender::start] returned without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Cancelled,
    /// single certificate mode submitted its certificate
    SingleCertificateSent,
}

/// Last block covered by certificates that need no resend, and the retry count
/// of the next certificate. A certificate in error is sent again from its
/// first block. Above height 0 a first block of 0 comes from legacy metadata
/// and is unknown, so the range resumes after its last block.
fn last_sent_block_and_retry_count(last_sent: Option<&CertificateInfo>) -> (Option<u64>, u32) {
    let Some(last_sent) = last_sent else {
        return (None, 0);
    };
    if last_sent.status.is_in_error() {
        let last_block = match last_sent.from_block.checked_sub(1) {
            None if last_sent.height > 0 => Some(last_sent.to_block),
            last_block => last_block,
        };
        (last_block, last_sent.retry_count + 1)
    } else {
        (Some(last_sent.to_block), 0)
    }
}

pub struct AggSender {
    config: AggSenderConfig,
    deps: AggSenderDeps,
    status: watch::Sender<AggSenderStatus>,
}

impl AggSender {
    pub fn new(config: AggSenderConfig, deps: AggSenderDeps) -> Self {
        let (status, _) = watch::channel(AggSenderStatus::new(now_unix()));
        Self {
            config,
            deps,
            status,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AggSenderStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> AggSenderStatus {
        self.status.borrow().clone()
    }

    fn set_stage(&self, stage: SenderStage) {
        self.status.send_modify(|status| status.stage = stage);
    }

    fn set_last_error(&self, error: Option<String>) {
        self.status.send_modify(|status| status.last_error = error);
    }

    /// Reconciles with the agglayer, then runs the submission loop until
    /// `cancel` fires. Inconsistent histories stop the sender before anything
    /// is sent.
    pub async fn start(&self, cancel: CancellationToken) -> Result<RunOutcome, AggSenderError> {
        info!(target: "aggsender", network_id = self.deps.l2_syncer.origin_network(), "AggSender started");
        self.status.send_modify(|status| status.started_at = now_unix());

        self.set_stage(SenderStage::Reconciling);
        let outcome = match self.reconcile_with_retry(&cancel).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return Ok(self.stopped()),
            Err(err) => {
                self.set_stage(SenderStage::Stopped);
                return Err(err.into());
            }
        };
        info!(target: "aggsender", ?outcome, "initial status checked successfully");

        self.set_stage(SenderStage::Sending);
        let mut ticker = tokio::time::interval(self.config.check_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(self.stopped()),
                _ = ticker.tick() => {}
            }

            if self.check_pending_certificates().await {
                info!(target: "aggsender", "Skipping because there are pending certificates");
                continue;
            }

            match self.send_certificate(&cancel).await {
                Ok(sent) => {
                    self.set_last_error(None);
                    if sent.is_some() && self.config.single_cert && !self.config.dry_run {
                        info!(target: "aggsender", "single certificate mode enabled, exiting");
                        self.set_stage(SenderStage::Stopped);
                        return Ok(RunOutcome::SingleCertificateSent);
                    }
                }
                Err(AggSenderError::Cancelled) => return Ok(self.stopped()),
                Err(err) => {
                    error!(target: "aggsender", %err, "error sending certificate");
                    self.set_last_error(Some(err.to_string()));
                }
            }
        }
    }

    fn stopped(&self) -> RunOutcome {
        info!(target: "aggsender", "AggSender stopped");
        self.set_stage(SenderStage::Stopped);
        RunOutcome::Cancelled
    }

    /// Retries reconciliation on the configured delay until it succeeds, fails
    /// fatally, or `cancel` fires (`Ok(None)`).
    async fn reconcile_with_retry(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<ReconcileOutcome>, RecoveryError> {
        let reconciler = Reconciler::new(
            self.deps.agglayer.as_ref(),
            self.deps.store.as_ref(),
            self.deps.l2_syncer.origin_network(),
        );
        let delay = self.config.delay_between_retries();
        loop {
            match reconciler.reconcile().await {
                Ok(outcome) => {
                    self.set_last_error(None);
                    return Ok(Some(outcome));
                }
                Err(err) => {
                    self.set_last_error(Some(err.to_string()));
                    if err.is_fatal() {
                        error!(target: "aggsender", %err, "inconsistent state with the agglayer");
                        return Err(err);
                    }
                    error!(target: "aggsender", %err, ?delay, "error checking initial status, retrying");
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Polls the agglayer for every open certificate and stores status changes.
    /// Returns whether a certificate is still open. Any failure counts as open,
    /// so nothing new is sent on incomplete information.
    pub async fn check_pending_certificates(&self) -> bool {
        let pending = match self
            .deps
            .store
            .get_certificates_by_status(&CertificateStatus::OPEN)
        {
            Ok(pending) => pending,
            Err(err) => {
                error!(target: "aggsender", %err, "error getting pending certificates");
                return true;
            }
        };
        debug!(target: "aggsender", pending = pending.len(), "checking pending certificates");

        let mut still_pending = false;
        for mut certificate in pending {
            let header = match self
                .deps
                .agglayer
                .get_certificate_header(certificate.certificate_id)
                .await
            {
                Ok(header) => header,
                Err(err) => {
                    error!(target: "aggsender", %err, certificate_id = %certificate.certificate_id, "error getting certificate header from agglayer");
                    return true;
                }
            };

            if let Err(err) =
                refresh_certificate_status(self.deps.store.as_ref(), &mut certificate, &header)
            {
                error!(target: "aggsender", %err, %header, "error updating certificate status in storage");
                return true;
            }

            if certificate.status.is_open() {
                let elapsed = now_unix().saturating_sub(certificate.created_at);
                info!(target: "aggsender", certificate_id = %certificate.certificate_id, height = certificate.height, elapsed, "certificate is still pending");
                still_pending = true;
            }
        }
        still_pending
    }

    /// Builds, signs and submits a certificate for the blocks not certified
    /// yet. Returns `None` when there is nothing to certify.
    pub async fn send_certificate(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<SignedCertificate>, AggSenderError> {
        info!(target: "aggsender", "trying to send a new certificate...");

        let last_processed_block = self.deps.l2_syncer.last_processed_block().await?;
        let last_sent = self.deps.store.get_last_sent_certificate()?;
        let (last_sent_block, retry_count) = last_sent_block_and_retry_count(last_sent.as_ref());

        let from_block = match last_sent_block {
            Some(last_sent_block) if last_sent_block >= last_processed_block => {
                info!(target: "aggsender", last_sent_block, last_processed_block, "no new blocks to send a certificate");
                return Ok(None);
            }
            Some(last_sent_block) => last_sent_block + 1,
            None => 0,
        };
        let to_block = last_processed_block;

        let bridges = self
            .deps
            .l2_syncer
            .bridges_in_range(from_block, to_block)
            .await?;
        if bridges.is_empty() {
            info!(target: "aggsender", from_block, to_block, "no bridges consumed, no need to send a certificate");
            return Ok(None);
        }
        let claims = self
            .deps
            .l2_syncer
            .claims_in_range(from_block, to_block)
            .await?;

        let params = CertificateBuildParams {
            from_block,
            to_block,
            bridges,
            claims,
            created_at: now_unix(),
        };
        let params = limit_certificate_size(params, self.config.max_cert_size)?;
        info!(target: "aggsender", %params, estimated_size = params.estimated_size(), "building certificate");

        let builder = CertificateBuilder::new(
            self.deps.l2_syncer.as_ref(),
            self.deps.l1_info_tree.as_ref(),
            self.deps.exit_tree.as_ref(),
            self.deps.store.as_ref(),
            self.config.bridge_metadata_as_hash,
        );
        let mut certificate = match builder
            .build(&params, last_sent.as_ref(), self.config.add_fake_bridge)
            .await
        {
            Ok(certificate) => certificate,
            Err(BuildError::NoBridgesOrClaims) => {
                info!(target: "aggsender", %params, "no bridges and claims to build certificate");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        if self.config.empty_cert {
            info!(target: "aggsender", "removing bridges and claims from certificate to send the empty certificate");
            certificate.bridge_exits.clear();
            certificate.imported_bridge_exits.clear();
        }

        let signed = sign_certificate(self.deps.signer.as_ref(), certificate).await?;
        save_certificate_to_file(
            self.config.save_certificates_to_files_path.as_deref(),
            &signed,
        );
        info!(
            target: "aggsender",
            height = signed.certificate.height,
            bridge_exits = signed.certificate.bridge_exits.len(),
            imported_bridge_exits = signed.certificate.imported_bridge_exits.len(),
            "certificate ready to be sent to agglayer"
        );
        if self.config.dry_run {
            warn!(target: "aggsender", "dry run mode enabled, skipping sending certificate");
            return Ok(Some(signed));
        }

        let certificate_id = self.deps.agglayer.send_certificate(&signed).await?;
        debug!(target: "aggsender", %certificate_id, height = signed.certificate.height, "certificate sent");

        if !self.config.store_certificate {
            info!(target: "aggsender", "storing certificates is disabled, skipping the database");
            return Ok(Some(signed));
        }

        let info = CertificateInfo {
            height: signed.certificate.height,
            retry_count,
            certificate_id,
            new_local_exit_root: signed.certificate.new_local_exit_root,
            previous_local_exit_root: Some(signed.certificate.prev_local_exit_root),
            from_block: params.from_block,
            to_block: params.to_block,
            status: CertificateStatus::Pending,
            created_at: params.created_at,
            updated_at: params.created_at,
            signed_certificate: serde_json::to_string(&signed)?,
        };
        self.save_with_retries(&info, cancel).await?;

        info!(
            target: "aggsender",
            %certificate_id,
            height = info.height,
            from_block = info.from_block,
            to_block = info.to_block,
            "certificate sent successfully"
        );
        Ok(Some(signed))
    }

    /// Stores a submitted certificate. The agglayer already holds it, so the
    /// save is retried on the configured delay up to the configured number of
    /// attempts, forever when that number is 0.
    async fn save_with_retries(
        &self,
        info: &CertificateInfo,
        cancel: &CancellationToken,
    ) -> Result<(), AggSenderError> {
        let max_attempts = self.config.max_retries_store_certificate;
        let delay = self.config.delay_between_retries();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let err = match self.deps.store.save_last_sent_certificate(info) {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            error!(target: "aggsender", %err, attempts, certificate = %info, "error saving last sent certificate in db");
            if max_attempts != 0 && attempts >= max_attempts {
                return Err(AggSenderError::StoreExhausted {
                    height: info.height,
                    certificate_id: info.certificate_id,
                    attempts,
                    source: err,
                });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AggSenderError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        memory::{MemoryAgglayer, MemoryBridgeSyncer, MemoryL1InfoTree},
        params::tests::bridge_at,
        storage::tests::certificate,
        LocalCertificateSigner, MemoryCertificateStore, ZERO_LER,
    };
    use aggsender_agglayer::{CertificateHeader, CertificateMetadata};
    use alloy_primitives::B256;
    use rstest::rstest;
    use std::time::Duration;

    const NETWORK_ID: u32 = 3;

    struct Fixture {
        l2: Arc<MemoryBridgeSyncer>,
        agglayer: Arc<MemoryAgglayer>,
        store: Arc<MemoryCertificateStore>,
        signer: Arc<LocalCertificateSigner>,
    }

    impl Fixture {
        /// one bridge per block in `1..=blocks`
        fn new(blocks: u64) -> Self {
            let fixture = Self {
                l2: Arc::new(MemoryBridgeSyncer::new(NETWORK_ID)),
                agglayer: Arc::new(MemoryAgglayer::new()),
                store: Arc::new(MemoryCertificateStore::new(true)),
                signer: Arc::new(LocalCertificateSigner::random()),
            };
            fixture.add_blocks(1, blocks);
            fixture
        }

        fn add_blocks(&self, from: u64, to: u64) {
            for block in from..=to {
                self.l2.add_bridge(bridge_at(block, block as u32 - 1)).unwrap();
            }
            self.l2.set_last_processed_block(to).unwrap();
        }

        fn sender(&self, config: AggSenderConfig) -> AggSender {
            AggSender::new(
                config,
                AggSenderDeps {
                    l2_syncer: self.l2.clone(),
                    l1_info_tree: Arc::new(MemoryL1InfoTree::default()),
                    exit_tree: self.l2.clone(),
                    agglayer: self.agglayer.clone(),
                    store: self.store.clone(),
                    signer: self.signer.clone(),
                },
            )
        }

        fn last_sent(&self) -> CertificateInfo {
            self.store.get_last_sent_certificate().unwrap().unwrap()
        }

        fn settle_last(&self, status: CertificateStatus) {
            assert!(self.agglayer.set_status(self.last_sent().certificate_id, status));
        }
    }

    fn config() -> AggSenderConfig {
        AggSenderConfig {
            check_interval_ms: 10,
            delay_between_retries_ms: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_last_sent_block_and_retry_count() {
        assert_eq!(last_sent_block_and_retry_count(None), (None, 0));

        let settled = certificate(2, 4, CertificateStatus::Settled);
        assert_eq!(last_sent_block_and_retry_count(Some(&settled)), (Some(29), 0));
        let pending = certificate(2, 4, CertificateStatus::Pending);
        assert_eq!(last_sent_block_and_retry_count(Some(&pending)), (Some(29), 0));

        let in_error = certificate(2, 4, CertificateStatus::InError);
        assert_eq!(last_sent_block_and_retry_count(Some(&in_error)), (Some(19), 5));
        let first_in_error = certificate(0, 0, CertificateStatus::InError);
        assert_eq!(last_sent_block_and_retry_count(Some(&first_in_error)), (None, 1));

        let mut legacy_in_error = certificate(2, 0, CertificateStatus::InError);
        legacy_in_error.from_block = 0;
        legacy_in_error.to_block = 50;
        assert_eq!(last_sent_block_and_retry_count(Some(&legacy_in_error)), (Some(50), 1));
    }

    #[tokio::test]
    async fn test_sends_first_certificate() {
        let fixture = Fixture::new(3);
        let sender = fixture.sender(config());
        let signed = sender
            .send_certificate(&CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(signed.certificate.network_id, NETWORK_ID);
        assert_eq!(signed.certificate.height, 0);
        assert_eq!(signed.certificate.prev_local_exit_root, ZERO_LER);
        assert_eq!(signed.certificate.bridge_exits.len(), 3);
        assert_eq!(
            signed.certificate.new_local_exit_root,
            fixture.l2.exit_root_at_index(2).await.unwrap()
        );
        assert_eq!(signed.signer().unwrap(), fixture.signer.address());
        assert_eq!(fixture.agglayer.received(), vec![signed.clone()]);

        let stored = fixture.last_sent();
        assert_eq!(stored.certificate_id, signed.certificate.hash());
        assert_eq!(stored.status, CertificateStatus::Pending);
        assert_eq!(stored.retry_count, 0);
        assert_eq!((stored.from_block, stored.to_block), (0, 3));
        assert_eq!(stored.previous_local_exit_root, Some(ZERO_LER));
        let raw: SignedCertificate = serde_json::from_str(&stored.signed_certificate).unwrap();
        assert_eq!(raw.certificate.hash(), stored.certificate_id);

        let metadata = CertificateMetadata::decode(&signed.certificate.metadata).unwrap();
        assert_eq!(metadata.from_block(), Some(0));
        assert_eq!(metadata.to_block(), 3);
    }

    #[tokio::test]
    async fn test_certificates_chain() {
        let fixture = Fixture::new(3);
        let sender = fixture.sender(config());
        let cancel = CancellationToken::new();
        let first = sender.send_certificate(&cancel).await.unwrap().unwrap();

        assert!(sender.check_pending_certificates().await);
        fixture.settle_last(CertificateStatus::Settled);
        assert!(!sender.check_pending_certificates().await);
        assert_eq!(fixture.last_sent().status, CertificateStatus::Settled);

        assert!(sender.send_certificate(&cancel).await.unwrap().is_none());

        fixture.add_blocks(4, 5);
        let second = sender.send_certificate(&cancel).await.unwrap().unwrap();
        assert_eq!(second.certificate.height, 1);
        assert_eq!(
            second.certificate.prev_local_exit_root,
            first.certificate.new_local_exit_root
        );
        assert_eq!(second.certificate.bridge_exits.len(), 2);
        let stored = fixture.last_sent();
        assert_eq!((stored.height, stored.from_block, stored.to_block), (1, 4, 5));
    }

    #[tokio::test]
    async fn test_resends_certificate_in_error() {
        let fixture = Fixture::new(3);
        let sender = fixture.sender(config());
        let cancel = CancellationToken::new();
        let first = sender.send_certificate(&cancel).await.unwrap().unwrap();
        fixture.settle_last(CertificateStatus::Settled);
        assert!(!sender.check_pending_certificates().await);

        fixture.add_blocks(4, 6);
        sender.send_certificate(&cancel).await.unwrap().unwrap();
        fixture.settle_last(CertificateStatus::InError);
        assert!(!sender.check_pending_certificates().await);

        fixture.add_blocks(7, 7);
        let retried = sender.send_certificate(&cancel).await.unwrap().unwrap();
        assert_eq!(retried.certificate.height, 1);
        assert_eq!(
            retried.certificate.prev_local_exit_root,
            first.certificate.new_local_exit_root
        );
        assert_eq!(retried.certificate.bridge_exits.len(), 4);

        let stored = fixture.last_sent();
        assert_eq!(stored.retry_count, 1);
        assert_eq!((stored.from_block, stored.to_block), (4, 7));
        assert_eq!(fixture.store.get_certificate_history(1).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_legacy_certificate_in_error_resumes_after_last_block() {
        let fixture = Fixture::new(55);
        let mut first = certificate(0, 0, CertificateStatus::Settled);
        (first.from_block, first.to_block) = (1, 30);
        let mut second = certificate(1, 0, CertificateStatus::Settled);
        (second.from_block, second.to_block) = (31, 40);
        let mut legacy = certificate(2, 0, CertificateStatus::InError);
        (legacy.from_block, legacy.to_block) = (0, 50);
        for info in [&first, &second, &legacy] {
            fixture.store.save_last_sent_certificate(info).unwrap();
        }

        let sender = fixture.sender(config());
        let signed = sender
            .send_certificate(&CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signed.certificate.height, 2);
        assert_eq!(
            signed.certificate.prev_local_exit_root,
            second.new_local_exit_root
        );
        assert_eq!(signed.certificate.bridge_exits.len(), 5);

        let stored = fixture.last_sent();
        assert_eq!(stored.retry_count, 1);
        assert_eq!((stored.from_block, stored.to_block), (51, 55));
    }

    #[tokio::test]
    async fn test_nothing_to_send() {
        let fixture = Fixture::new(0);
        fixture.l2.set_last_processed_block(10).unwrap();
        let sender = fixture.sender(config());
        assert!(sender
            .send_certificate(&CancellationToken::new())
            .await
            .unwrap()
            .is_none());
        assert!(fixture.agglayer.received().is_empty());
    }

    #[rstest]
    #[case::dry_run(true, true, 0, 0)]
    #[case::not_stored(false, false, 1, 0)]
    #[case::stored(false, true, 1, 1)]
    #[tokio::test]
    async fn test_send_modes(
        #[case] dry_run: bool,
        #[case] store_certificate: bool,
        #[case] received: usize,
        #[case] stored: usize,
    ) {
        let fixture = Fixture::new(2);
        let sender = fixture.sender(AggSenderConfig {
            dry_run,
            store_certificate,
            ..config()
        });
        assert!(sender
            .send_certificate(&CancellationToken::new())
            .await
            .unwrap()
            .is_some());
        assert_eq!(fixture.agglayer.received().len(), received);
        assert_eq!(
            fixture
                .store
                .get_certificates_by_status(&[CertificateStatus::Pending])
                .unwrap()
                .len(),
            stored
        );
    }

    #[tokio::test]
    async fn test_empty_certificate() {
        let fixture = Fixture::new(2);
        let sender = fixture.sender(AggSenderConfig {
            empty_cert: true,
            ..config()
        });
        let signed = sender
            .send_certificate(&CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert!(signed.certificate.bridge_exits.is_empty());
        assert!(signed.certificate.imported_bridge_exits.is_empty());
        assert_eq!(
            signed.certificate.new_local_exit_root,
            fixture.l2.exit_root_at_index(1).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_fake_bridge_leaves_exit_tree_untouched() {
        let fixture = Fixture::new(2);
        let sender = fixture.sender(AggSenderConfig {
            add_fake_bridge: true,
            ..config()
        });
        let signed = sender
            .send_certificate(&CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signed.certificate.bridge_exits.len(), 3);
        assert_eq!(fixture.l2.rollbacks(), 1);
        assert!(fixture.l2.exit_root_at_index(2).await.is_err());
    }

    #[tokio::test]
    async fn test_size_limit_narrows_stored_range() {
        let fixture = Fixture::new(5);
        let sender = fixture.sender(AggSenderConfig {
            max_cert_size: 2 * 230,
            ..config()
        });
        let signed = sender
            .send_certificate(&CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        // block 0 holds no bridge, so blocks 0..=2 carry two of them
        assert_eq!(signed.certificate.bridge_exits.len(), 2);
        let stored = fixture.last_sent();
        assert_eq!((stored.from_block, stored.to_block), (0, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_is_retried() {
        let fixture = Fixture::new(1);
        fixture.store.fail_next_saves(2);
        let sender = fixture.sender(AggSenderConfig {
            max_retries_store_certificate: 3,
            ..config()
        });
        sender
            .send_certificate(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fixture.last_sent().height, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_attempts_are_bounded() {
        let fixture = Fixture::new(1);
        fixture.store.fail_next_saves(3);
        let sender = fixture.sender(AggSenderConfig {
            max_retries_store_certificate: 3,
            ..config()
        });
        let err = sender
            .send_certificate(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AggSenderError::StoreExhausted { height: 0, attempts: 3, .. }
        ));
        assert_eq!(fixture.agglayer.received().len(), 1);
        assert!(fixture.store.get_last_sent_certificate().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_save_retries() {
        let fixture = Fixture::new(1);
        fixture.store.fail_next_saves(20);
        let sender = fixture.sender(AggSenderConfig {
            max_retries_store_certificate: 0,
            ..config()
        });
        sender
            .send_certificate(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fixture.last_sent().height, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_retry_is_cancelled() {
        let fixture = Fixture::new(1);
        fixture.store.fail_next_saves(u32::MAX);
        let sender = fixture.sender(AggSenderConfig {
            max_retries_store_certificate: 0,
            delay_between_retries_ms: 60_000,
            ..config()
        });
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = sender.send_certificate(&cancel).await.unwrap_err();
        assert!(matches!(err, AggSenderError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_certificate_mode() {
        let fixture = Fixture::new(2);
        let sender = fixture.sender(AggSenderConfig {
            single_cert: true,
            ..config()
        });
        let outcome = sender.start(CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, RunOutcome::SingleCertificateSent);
        assert_eq!(fixture.agglayer.received().len(), 1);
        assert_eq!(sender.status().stage, SenderStage::Stopped);
        assert_eq!(sender.status().last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_certificate_in_flight() {
        let fixture = Fixture::new(2);
        let sender = Arc::new(fixture.sender(config()));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let sender = sender.clone();
            let cancel = cancel.clone();
            async move { sender.start(cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        fixture.add_blocks(3, 4);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fixture.agglayer.received().len(), 1);
        assert_eq!(sender.status().stage, SenderStage::Sending);

        fixture.settle_last(CertificateStatus::Settled);
        tokio::time::sleep(Duration::from_millis(100)).await;
        let received = fixture.agglayer.received();
        assert_eq!(received.len(), 2);
        assert_eq!(received[1].certificate.height, 1);

        cancel.cancel();
        assert_eq!(handle.await.unwrap().unwrap(), RunOutcome::Cancelled);
        assert_eq!(sender.status().stage, SenderStage::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconciliation_waits_for_agglayer() {
        // height 5 failed and the agglayer went away
        let fixture = Fixture::new(2);
        let mut local = certificate(5, 0, CertificateStatus::InError);
        local.previous_local_exit_root = Some(B256::repeat_byte(0xaa));
        fixture.store.save_last_sent_certificate(&local).unwrap();
        fixture.agglayer.insert_header(CertificateHeader {
            network_id: NETWORK_ID,
            height: 5,
            epoch_number: None,
            certificate_index: None,
            certificate_id: local.certificate_id,
            prev_local_exit_root: local.previous_local_exit_root,
            new_local_exit_root: local.new_local_exit_root,
            metadata: CertificateMetadata::new(50, 9, 0).to_hash(),
            status: CertificateStatus::InError,
            error: None,
        });
        fixture.agglayer.set_unavailable(true);

        let sender = Arc::new(fixture.sender(AggSenderConfig {
            delay_between_retries_ms: 1_000,
            ..config()
        }));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let sender = sender.clone();
            let cancel = cancel.clone();
            async move { sender.start(cancel).await }
        });

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!handle.is_finished());
        let status = sender.status();
        assert_eq!(status.stage, SenderStage::Reconciling);
        assert!(status.last_error.is_some());
        assert_eq!(fixture.last_sent(), local);

        fixture.agglayer.set_unavailable(false);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(sender.status().stage, SenderStage::Sending);

        cancel.cancel();
        assert_eq!(handle.await.unwrap().unwrap(), RunOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_reconciliation() {
        let fixture = Fixture::new(0);
        fixture.agglayer.set_unavailable(true);
        let sender = fixture.sender(config());
        let cancel = CancellationToken::new();
        let start = sender.start(cancel.clone());
        cancel.cancel();
        assert_eq!(start.await.unwrap(), RunOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_divergent_history_stops_sender() {
        let fixture = Fixture::new(2);
        fixture
            .store
            .save_last_sent_certificate(&certificate(1, 0, CertificateStatus::Settled))
            .unwrap();
        let sender = fixture.sender(config());
        let err = sender.start(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            AggSenderError::Recovery(RecoveryError::MissingOnAgglayer(1))
        ));
        assert!(fixture.agglayer.received().is_empty());
        assert_eq!(sender.status().stage, SenderStage::Stopped);
    }
}
