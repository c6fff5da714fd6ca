//! Optional export of signed certificates to json files.

use aggsender_agglayer::SignedCertificate;
use std::{
    io,
    path::{Path, PathBuf},
};
use tracing::{error, info};

/// Name of the file a certificate at `height` exported at `timestamp` is written to.
pub fn certificate_file_name(height: u64, timestamp: u64) -> String {
    format!("certificate_{height:04}-{timestamp:07}.json")
}

/// Writes `certificate` as indented json into `dir`, returning the file path.
pub fn write_certificate_file(
    dir: &Path,
    certificate: &SignedCertificate,
    timestamp: u64,
) -> io::Result<PathBuf> {
    let path = dir.join(certificate_file_name(
        certificate.certificate.height,
        timestamp,
    ));
    let json = serde_json::to_vec_pretty(certificate)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

/// Best effort export: failures are logged and never reach the caller.
pub fn save_certificate_to_file(dir: Option<&Path>, certificate: &SignedCertificate) {
    let Some(dir) = dir else {
        return;
    };
    match write_certificate_file(dir, certificate, crate::now_unix() as u64) {
        Ok(path) => info!(target: "aggsender", path = %path.display(), "saved certificate to file"),
        Err(err) => error!(target: "aggsender", %err, "error saving certificate to file"),
    }
}
