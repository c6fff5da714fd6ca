//! Command line entrypoint of the aggsender.

use tracing_subscriber::EnvFilter;

pub mod cli;
pub mod random;

/// Installs the global fmt subscriber. `RUST_LOG` wins over `verbosity`
/// (0 info, 1 debug, 2 or more trace).
pub fn init_tracing_subscriber(verbosity: u8) -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => {
            let level = match verbosity {
                0 => "info",
                1 => "debug",
                _ => "trace",
            };
            EnvFilter::new(level)
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}
