//! Command line arguments and the subcommands they run.

use crate::random::{random_certificate, random_signature, RandomCertificateOptions};
use aggsender_agglayer::{AgglayerClient, HttpAgglayerClient, SignedCertificate};
use aggsender_core::{
    memory::{BridgeEvents, MemoryBridgeSyncer, MemoryL1InfoTree},
    sign_certificate, AggSender, AggSenderConfig, AggSenderDeps, CertificateSigner,
    LocalCertificateSigner, RocksCertificateStore, RunOutcome,
};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "aggsender", version, about = "Agglayer certificate sender")]
pub struct Cli {
    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Certify the replayed bridge events, signing with the sequencer key
    Run(RunArgs),
    /// Certify the replayed bridge events, signing with a random key
    InvalidSignature(SenderArgs),
    /// Send a single certificate with random content
    RandomCert(RandomCertArgs),
}

impl Command {
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        match self {
            Command::Run(args) => {
                let signer = LocalCertificateSigner::from_hex(&args.private_key)?;
                info!(address = %signer.address(), "imported sequencer key");
                args.sender.run(signer, cancel).await
            }
            Command::InvalidSignature(args) => {
                let signer = LocalCertificateSigner::random();
                warn!(address = %signer.address(), "signing certificates with a random key");
                args.run(signer, cancel).await
            }
            Command::RandomCert(args) => args.run().await,
        }
    }
}

/// Options shared by the commands running the sender.
#[derive(Args, Debug)]
pub struct SenderArgs {
    /// TOML configuration file, defaults apply when missing
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// JSON file with the bridge events and l1 info tree leaves to certify
    #[arg(long)]
    pub events: PathBuf,

    /// Strip bridges and claims from every certificate
    #[arg(long)]
    pub empty_cert: bool,

    /// Add a synthetic bridge to every certificate
    #[arg(long)]
    pub add_fake_bridge: bool,

    /// Do not record sent certificates in the store
    #[arg(long)]
    pub no_store_certificate: bool,

    /// Exit after the first certificate is sent
    #[arg(long)]
    pub single_cert: bool,
}

impl SenderArgs {
    /// The configuration file with the command line flags applied.
    pub fn config(&self) -> anyhow::Result<AggSenderConfig> {
        let mut config = match &self.config {
            Some(path) => AggSenderConfig::load(path)?,
            None => AggSenderConfig::default(),
        };
        config.empty_cert |= self.empty_cert;
        config.add_fake_bridge |= self.add_fake_bridge;
        config.single_cert |= self.single_cert;
        if self.no_store_certificate {
            config.store_certificate = false;
        }
        Ok(config)
    }

    pub async fn run(
        &self,
        signer: LocalCertificateSigner,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let config = self.config()?;
        debug!(?config, "loaded configuration");

        let events = BridgeEvents::load(&self.events)?;
        let l2_syncer = Arc::new(MemoryBridgeSyncer::from_events(&events)?);
        let l1_info_tree = Arc::new(MemoryL1InfoTree::new(events.l1_info_tree.iter().copied())?);
        let store = Arc::new(RocksCertificateStore::open(
            &config.storage_path,
            config.keep_certificates_history,
        )?);
        let agglayer = Arc::new(HttpAgglayerClient::new_http(Url::parse(&config.agglayer_url)?));

        let sender = AggSender::new(
            config,
            AggSenderDeps {
                l2_syncer: l2_syncer.clone(),
                l1_info_tree,
                exit_tree: l2_syncer,
                agglayer,
                store,
                signer: Arc::new(signer),
            },
        );
        match sender.start(cancel).await? {
            RunOutcome::Cancelled => info!("sender cancelled"),
            RunOutcome::SingleCertificateSent => info!("single certificate sent"),
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub sender: SenderArgs,

    /// Hex encoded sequencer private key
    #[arg(long, env = "AGGSENDER_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: String,
}

#[derive(Args, Debug)]
pub struct RandomCertArgs {
    /// Agglayer JSON-RPC url
    #[arg(long, default_value = aggsender_core::config::DEFAULT_AGGLAYER_URL)]
    pub url: Url,

    /// Hex encoded private key, a random one is generated when missing
    #[arg(long, env = "AGGSENDER_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Attach random signature bytes instead of signing
    #[arg(long)]
    pub invalid_signature: bool,

    /// Send no bridges and no claims
    #[arg(long)]
    pub empty_cert: bool,

    /// Network id, random when missing
    #[arg(long)]
    pub network_id: Option<u32>,

    /// Certificate height, random when missing
    #[arg(long)]
    pub height: Option<u64>,

    /// Random rollup index on mainnet claims too
    #[arg(long)]
    pub random_global_index: bool,
}

impl RandomCertArgs {
    pub fn options(&self) -> RandomCertificateOptions {
        RandomCertificateOptions {
            empty_cert: self.empty_cert,
            random_global_index: self.random_global_index,
            network_id: self.network_id,
            height: self.height,
        }
    }

    /// Builds the random certificate and signs it as requested.
    pub async fn signed_certificate(&self) -> anyhow::Result<SignedCertificate> {
        let (certificate, signature) = {
            let mut rng = rand::rng();
            let certificate = random_certificate(&mut rng, &self.options());
            let signature = self.invalid_signature.then(|| random_signature(&mut rng));
            (certificate, signature)
        };
        if let Some(signature) = signature {
            info!("attaching random signature");
            return Ok(SignedCertificate {
                certificate,
                signature,
            });
        }

        let signer = match &self.private_key {
            Some(key) => {
                let signer = LocalCertificateSigner::from_hex(key)?;
                info!(address = %signer.address(), "imported wallet");
                signer
            }
            None => {
                let signer = LocalCertificateSigner::random();
                info!(address = %signer.address(), "generated wallet");
                signer
            }
        };
        let signed = sign_certificate(&signer, certificate).await?;
        let recovered = signed.signer()?;
        info!(address = %recovered, "address from signature");
        anyhow::ensure!(
            recovered == signer.address(),
            "signature recovers {recovered}, expected {}",
            signer.address()
        );
        Ok(signed)
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let signed = self.signed_certificate().await?;
        debug!(certificate = %serde_json::to_string(&signed)?, "random certificate");

        let client = HttpAgglayerClient::new_http(self.url.clone());
        let certificate_id = client.send_certificate(&signed).await?;
        info!(%certificate_id, height = signed.certificate.height, "certificate sent");
        Ok(())
    }
}
