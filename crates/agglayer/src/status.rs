//! Certificate status taxonomy and the header the agglayer reports for a certificate.

use crate::AgglayerError;
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Settlement status of a submitted certificate.
///
/// `Pending` is open: the agglayer has not decided yet. `Settled` and `InError`
/// are closed; `InError` may be retried with a new certificate at the same height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificateStatus {
    Pending,
    Settled,
    InError,
}

impl CertificateStatus {
    /// statuses that still wait for an agglayer decision
    pub const OPEN: [CertificateStatus; 1] = [CertificateStatus::Pending];

    pub fn is_open(&self) -> bool {
        !self.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, CertificateStatus::Settled | CertificateStatus::InError)
    }

    pub fn is_settled(&self) -> bool {
        *self == CertificateStatus::Settled
    }

    pub fn is_in_error(&self) -> bool {
        *self == CertificateStatus::InError
    }

    /// Maps a status as reported by the agglayer. Intermediate proving stages
    /// are folded into `Pending`; errors may be reported as an object.
    pub fn from_remote(value: &Value) -> Result<Self, AgglayerError> {
        let name = match value {
            Value::String(name) => name.as_str(),
            Value::Object(map) if map.contains_key("InError") => "InError",
            other => return Err(AgglayerError::UnknownStatus(other.to_string())),
        };
        match name {
            "Pending" | "Proven" | "Candidate" => Ok(CertificateStatus::Pending),
            "Settled" => Ok(CertificateStatus::Settled),
            "InError" => Ok(CertificateStatus::InError),
            other => Err(AgglayerError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CertificateStatus::Pending => "Pending",
            CertificateStatus::Settled => "Settled",
            CertificateStatus::InError => "InError",
        };
        f.write_str(name)
    }
}

/// What the agglayer knows about a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCertificateHeader")]
pub struct CertificateHeader {
    pub network_id: u32,
    pub height: u64,
    pub epoch_number: Option<u64>,
    pub certificate_index: Option<u64>,
    pub certificate_id: B256,
    pub prev_local_exit_root: Option<B256>,
    pub new_local_exit_root: B256,
    pub metadata: B256,
    pub status: CertificateStatus,
    /// error details when the status is `InError`
    pub error: Option<String>,
}

impl fmt::Display for CertificateHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "height: {}, certificate_id: {}, status: {}",
            self.height, self.certificate_id, self.status
        )
    }
}

#[derive(Deserialize)]
struct RawCertificateHeader {
    network_id: u32,
    height: u64,
    #[serde(default)]
    epoch_number: Option<u64>,
    #[serde(default)]
    certificate_index: Option<u64>,
    certificate_id: B256,
    #[serde(default)]
    prev_local_exit_root: Option<B256>,
    new_local_exit_root: B256,
    metadata: B256,
    status: Value,
    #[serde(default)]
    error: Option<String>,
}

impl TryFrom<RawCertificateHeader> for CertificateHeader {
    type Error = AgglayerError;

    fn try_from(raw: RawCertificateHeader) -> Result<Self, Self::Error> {
        let status = CertificateStatus::from_remote(&raw.status)?;
        let error = match (&raw.status, raw.error) {
            (Value::Object(map), None) => map.get("InError").map(|details| details.to_string()),
            (_, error) => error,
        };
        Ok(Self {
            network_id: raw.network_id,
            height: raw.height,
            epoch_number: raw.epoch_number,
            certificate_index: raw.certificate_index,
            certificate_id: raw.certificate_id,
            prev_local_exit_root: raw.prev_local_exit_root,
            new_local_exit_root: raw.new_local_exit_root,
            metadata: raw.metadata,
            status,
            error,
        })
    }
}
