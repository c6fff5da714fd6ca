//! Main entrypoint for the aggsender binary.

use aggsender_bin::{cli::Cli, init_tracing_subscriber};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::try_parse()?;
    init_tracing_subscriber(cli.verbose)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(%err, "cannot listen for interrupts");
                return;
            }
            info!("interrupt received, stopping");
            cancel.cancel();
        }
    });

    cli.command.run(cancel).await?;

    info!("Exiting aggsender.");
    Ok(())
}
