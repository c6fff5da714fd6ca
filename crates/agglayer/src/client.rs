//! Access to the agglayer certificate interop API.

use crate::{AgglayerError, CertificateHeader, SignedCertificate};
use alloy_primitives::B256;
use alloy_rpc_client::{ClientBuilder, RpcClient};
use async_trait::async_trait;
use tracing::debug;
use url::Url;

const SEND_CERTIFICATE_METHOD: &str = "interop_sendCertificate";
const GET_CERTIFICATE_HEADER_METHOD: &str = "interop_getCertificateHeader";
const GET_LATEST_KNOWN_CERTIFICATE_HEADER_METHOD: &str = "interop_getLatestKnownCertificateHeader";

/// The operations the sender needs from the agglayer.
#[async_trait]
pub trait AgglayerClient: Send + Sync {
    /// Submits a signed certificate, returning the id the agglayer assigned to it.
    async fn send_certificate(
        &self,
        certificate: &SignedCertificate,
    ) -> Result<B256, AgglayerError>;

    /// Fetches the current header of a previously submitted certificate.
    async fn get_certificate_header(
        &self,
        certificate_id: B256,
    ) -> Result<CertificateHeader, AgglayerError>;

    /// Fetches the header of the last certificate the agglayer knows for a network,
    /// `None` when the network never submitted one.
    async fn get_latest_known_certificate_header(
        &self,
        network_id: u32,
    ) -> Result<Option<CertificateHeader>, AgglayerError>;
}

/// Talks json-rpc over http to an agglayer node.
#[derive(Debug, Clone)]
pub struct HttpAgglayerClient {
    /// The agglayer endpoint.
    base: Url,
    /// The inner rpc client.
    inner: RpcClient,
}

impl HttpAgglayerClient {
    pub fn new_http(base: Url) -> Self {
        let inner = ClientBuilder::default().http(base.clone());
        Self { base, inner }
    }
}

#[async_trait]
impl AgglayerClient for HttpAgglayerClient {
    async fn send_certificate(
        &self,
        certificate: &SignedCertificate,
    ) -> Result<B256, AgglayerError> {
        debug!(target: "agglayer", url = %self.base, height = certificate.certificate.height, "sending certificate");
        let certificate_id: Option<B256> = self
            .inner
            .request(SEND_CERTIFICATE_METHOD, (certificate.clone(),))
            .await?;
        certificate_id.ok_or(AgglayerError::MissingResult(SEND_CERTIFICATE_METHOD))
    }

    async fn get_certificate_header(
        &self,
        certificate_id: B256,
    ) -> Result<CertificateHeader, AgglayerError> {
        debug!(target: "agglayer", %certificate_id, "fetching certificate header");
        let header: Option<CertificateHeader> = self
            .inner
            .request(GET_CERTIFICATE_HEADER_METHOD, (certificate_id,))
            .await?;
        header.ok_or(AgglayerError::CertificateNotFound(certificate_id))
    }

    async fn get_latest_known_certificate_header(
        &self,
        network_id: u32,
    ) -> Result<Option<CertificateHeader>, AgglayerError> {
        debug!(target: "agglayer", network_id, "fetching latest known certificate header");
        Ok(self
            .inner
            .request(GET_LATEST_KNOWN_CERTIFICATE_HEADER_METHOD, (network_id,))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_json_rpc::{ErrorPayload, RpcError};
    use alloy_transport::TransportErrorKind;

    #[test]
    fn test_error_response_maps_to_rpc_error() {
        let error: RpcError<TransportErrorKind> = RpcError::ErrorResp(ErrorPayload {
            code: -32000,
            message: "invalid signature".into(),
            data: None,
        });
        let AgglayerError::Rpc { code, message } = AgglayerError::from(error) else {
            panic!("expected an rpc error");
        };
        assert_eq!(code, -32000);
        assert_eq!(message, "invalid signature");
    }

    #[test]
    fn test_other_failures_are_transport_errors() {
        let error: RpcError<TransportErrorKind> = RpcError::NullResp;
        assert!(matches!(
            AgglayerError::from(error),
            AgglayerError::Transport(RpcError::NullResp)
        ));
    }

    #[test]
    fn test_new_http_keeps_endpoint() {
        let url: Url = "http://localhost:4443".parse().unwrap();
        let client = HttpAgglayerClient::new_http(url.clone());
        assert_eq!(client.base, url);
    }
}
