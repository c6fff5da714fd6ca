//! Errors surfaced by the agglayer data model and RPC client.

use alloy_primitives::B256;
use alloy_json_rpc::RpcError;
use alloy_transport::TransportErrorKind;

/// Failures talking to the agglayer interop API.
#[derive(Debug, thiserror::Error)]
pub enum AgglayerError {
    /// the http round trip failed or the body could not be decoded
    #[error("agglayer transport error: {0}")]
    Transport(RpcError<TransportErrorKind>),
    /// the endpoint answered with a json-rpc error object
    #[error("agglayer rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// the endpoint answered without a result for a call that requires one
    #[error("agglayer returned no result for {0}")]
    MissingResult(&'static str),
    /// the certificate id is not known to the agglayer
    #[error("certificate {0} not found")]
    CertificateNotFound(B256),
    /// the status reported by the agglayer does not map onto the local taxonomy
    #[error("unknown certificate status {0}")]
    UnknownStatus(String),
    /// the agglayer could not be reached
    #[error("agglayer unavailable: {0}")]
    Unavailable(String),
}

impl From<RpcError<TransportErrorKind>> for AgglayerError {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        match err {
            RpcError::ErrorResp(payload) => AgglayerError::Rpc {
                code: payload.code,
                message: payload.message.to_string(),
            },
            other => AgglayerError::Transport(other),
        }
    }
}

/// Failures decoding the metadata hash carried by a certificate.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum MetadataError {
    /// the covered range ends past the last representable block
    #[error("certificate metadata range {from_block}+{offset} overflows a block number")]
    BlockRangeOverflow { from_block: u64, offset: u32 },
    /// a legacy metadata hash must fit a block number
    #[error("legacy certificate metadata does not fit a block number")]
    LegacyOverflow,
}
