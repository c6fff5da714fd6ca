//! Signature generation for certificates.

use crate::SignerError;
use aggsender_agglayer::{Certificate, Signature, SignedCertificate};
use alloy_primitives::{Address, B256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;

/// Size of a recoverable ecdsa signature: r, s and the recovery byte.
pub const SIGNATURE_SIZE: usize = 65;

/// Produces raw `r || s || v` signatures over certificate hashes.
#[async_trait]
pub trait CertificateSigner: Send + Sync {
    /// Address whose key produces the signatures.
    fn address(&self) -> Address;

    async fn sign_hash(&self, hash: &B256) -> Result<Vec<u8>, SignerError>;
}

/// Signer holding the private key in memory.
#[derive(Debug, Clone)]
pub struct LocalCertificateSigner {
    signer: PrivateKeySigner,
}

impl LocalCertificateSigner {
    /// Create from private key bytes
    pub fn from_bytes(key_bytes: &B256) -> Result<Self, SignerError> {
        let signer = PrivateKeySigner::from_bytes(key_bytes)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self { signer })
    }

    /// Create from a hex encoded private key, with or without `0x`
    pub fn from_hex(key: &str) -> Result<Self, SignerError> {
        let signer = key
            .trim()
            .parse::<PrivateKeySigner>()
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self { signer })
    }

    /// Create with a freshly generated key
    pub fn random() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }
}

#[async_trait]
impl CertificateSigner for LocalCertificateSigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_hash(&self, hash: &B256) -> Result<Vec<u8>, SignerError> {
        let signature = self
            .signer
            .sign_hash(hash)
            .await
            .map_err(|e| SignerError::Signing(e.to_string()))?;

        let mut raw = Vec::with_capacity(SIGNATURE_SIZE);
        raw.extend_from_slice(&signature.r().to_be_bytes::<32>());
        raw.extend_from_slice(&signature.s().to_be_bytes::<32>());
        raw.push(signature.v() as u8);
        Ok(raw)
    }
}

/// Splits a raw 65 byte signature into its wire parts. The parity is read
/// from the low bit of the last byte.
pub fn split_signature(raw: &[u8]) -> Result<Signature, SignerError> {
    if raw.len() != SIGNATURE_SIZE {
        return Err(SignerError::InvalidSignatureSize(raw.len()));
    }
    Ok(Signature {
        r: B256::from_slice(&raw[0..32]),
        s: B256::from_slice(&raw[32..64]),
        odd_y_parity: raw[64] % 2 == 1,
    })
}

/// Signs [Certificate::hash_to_sign] and attaches the signature.
pub async fn sign_certificate(
    signer: &dyn CertificateSigner,
    certificate: Certificate,
) -> Result<SignedCertificate, SignerError> {
    let raw = signer.sign_hash(&certificate.hash_to_sign()).await?;
    let signature = split_signature(&raw)?;
    Ok(SignedCertificate {
        certificate,
        signature,
    })
}
