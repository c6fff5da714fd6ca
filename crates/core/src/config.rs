//! Sender configuration from TOML.

use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_DELAY_BETWEEN_RETRIES_MS: u64 = 1_000;
pub const DEFAULT_MAX_RETRIES_STORE_CERTIFICATE: u32 = 3;
pub const DEFAULT_STORAGE_PATH: &str = "aggsender.db";
pub const DEFAULT_AGGLAYER_URL: &str = "http://localhost:4443";

/// Failures loading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Sender configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggSenderConfig {
    /// Directory of the certificate store
    pub storage_path: PathBuf,

    /// Keep certificates replaced at the same height in a history table
    pub keep_certificates_history: bool,

    /// Agglayer json-rpc endpoint
    pub agglayer_url: String,

    /// Carry the keccak of bridge metadata in exits instead of the raw bytes
    pub bridge_metadata_as_hash: bool,

    /// Ceiling on the estimated certificate size in bytes, 0 disables it
    pub max_cert_size: u64,

    /// Interval between submission ticks
    pub check_interval_ms: u64,

    /// Delay between store retries and between startup reconciliation attempts
    pub delay_between_retries_ms: u64,

    /// Total attempts to store a sent certificate, 0 retries until it succeeds
    pub max_retries_store_certificate: u32,

    /// Directory receiving a json copy of every signed certificate
    pub save_certificates_to_files_path: Option<PathBuf>,

    /// Build and sign certificates without sending them
    pub dry_run: bool,

    /// Strip bridge exits and imported exits before signing
    pub empty_cert: bool,

    /// Add a synthetic bridge exit to every certificate
    pub add_fake_bridge: bool,

    /// Record sent certificates in the store
    pub store_certificate: bool,

    /// Stop after the first certificate is sent
    pub single_cert: bool,
}

impl Default for AggSenderConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            keep_certificates_history: false,
            agglayer_url: DEFAULT_AGGLAYER_URL.to_string(),
            bridge_metadata_as_hash: false,
            max_cert_size: 0,
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            delay_between_retries_ms: DEFAULT_DELAY_BETWEEN_RETRIES_MS,
            max_retries_store_certificate: DEFAULT_MAX_RETRIES_STORE_CERTIFICATE,
            save_certificates_to_files_path: None,
            dry_run: false,
            empty_cert: false,
            add_fake_bridge: false,
            store_certificate: true,
            single_cert: false,
        }
    }
}

impl AggSenderConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn delay_between_retries(&self) -> Duration {
        Duration::from_millis(self.delay_between_retries_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AggSenderConfig = toml::from_str("").unwrap();
        assert_eq!(config, AggSenderConfig::default());
        assert!(config.store_certificate);
        assert_eq!(config.check_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
            storage_path = "/var/lib/aggsender"
            keep_certificates_history = true
            agglayer_url = "http://agglayer:4443"
            max_cert_size = 8192
            delay_between_retries_ms = 250
            max_retries_store_certificate = 0
            save_certificates_to_files_path = "/tmp/certs"
            single_cert = true
        "#;

        let config: AggSenderConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.storage_path, PathBuf::from("/var/lib/aggsender"));
        assert!(config.keep_certificates_history);
        assert_eq!(config.agglayer_url, "http://agglayer:4443");
        assert_eq!(config.max_cert_size, 8192);
        assert_eq!(config.delay_between_retries(), Duration::from_millis(250));
        assert_eq!(config.max_retries_store_certificate, 0);
        assert_eq!(
            config.save_certificates_to_files_path,
            Some(PathBuf::from("/tmp/certs"))
        );
        assert!(config.single_cert);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_load_missing_file() {
        let result = AggSenderConfig::load("/definitely/not/here.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
