//! PEM envelopes and RSA key encodings
//!
//! Pure functions with no state. Certificates and CSRs leave this module as raw
//! DER; turning DER into owned details is the job of [`crate::parse`].

use crate::error::{CertError, CertResult};
use pem::{EncodeConfig, LineEnding, Pem};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use serde::Serialize;
use std::fmt;

pub const CERTIFICATE_TAG: &str = "CERTIFICATE";
pub const CERTIFICATE_REQUEST_TAG: &str = "CERTIFICATE REQUEST";
/// Label written by older OpenSSL/Netscape tooling for the same PKCS#10 payload
pub const LEGACY_CERTIFICATE_REQUEST_TAG: &str = "NEW CERTIFICATE REQUEST";
pub const RSA_PRIVATE_KEY_TAG: &str = "RSA PRIVATE KEY";
pub const PRIVATE_KEY_TAG: &str = "PRIVATE KEY";

/// Type label of a PEM block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Certificate,
    CertificateRequest,
    RsaPrivateKey,
    PrivateKey,
    Other(String),
}

impl BlockKind {
    fn from_tag(tag: &str) -> Self {
        match tag {
            CERTIFICATE_TAG => Self::Certificate,
            CERTIFICATE_REQUEST_TAG | LEGACY_CERTIFICATE_REQUEST_TAG => Self::CertificateRequest,
            RSA_PRIVATE_KEY_TAG => Self::RsaPrivateKey,
            PRIVATE_KEY_TAG => Self::PrivateKey,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_private_key(&self) -> bool {
        matches!(self, Self::RsaPrivateKey | Self::PrivateKey)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Certificate => f.write_str(CERTIFICATE_TAG),
            Self::CertificateRequest => f.write_str(CERTIFICATE_REQUEST_TAG),
            Self::RsaPrivateKey => f.write_str(RSA_PRIVATE_KEY_TAG),
            Self::PrivateKey => f.write_str(PRIVATE_KEY_TAG),
            Self::Other(tag) => f.write_str(tag),
        }
    }
}

fn parse_block(text: &str, what: &str) -> CertResult<Pem> {
    pem::parse(text.as_bytes()).map_err(|e| CertError::decode(what, e))
}

fn encode_block(tag: &str, der: Vec<u8>) -> String {
    let block = Pem::new(tag, der);
    pem::encode_config(&block, EncodeConfig::new().set_line_ending(LineEnding::LF))
}

/// Type of the first PEM block in `text`
pub fn block_kind(text: &str) -> CertResult<BlockKind> {
    let block = parse_block(text, "PEM block")?;
    Ok(BlockKind::from_tag(block.tag()))
}

/// Wrap certificate DER in a `CERTIFICATE` block
pub fn encode_certificate(der: &[u8]) -> String {
    encode_block(CERTIFICATE_TAG, der.to_vec())
}

/// Extract the DER payload of a `CERTIFICATE` block
pub fn decode_certificate(text: &str) -> CertResult<Vec<u8>> {
    let block = parse_block(text, "certificate PEM")?;
    match BlockKind::from_tag(block.tag()) {
        BlockKind::Certificate => Ok(block.into_contents()),
        other => Err(CertError::DecodeError(format!(
            "expected a {} block, found {}",
            CERTIFICATE_TAG, other
        ))),
    }
}

/// Extract the DER payload of a `CERTIFICATE REQUEST` block
pub fn decode_certificate_request(text: &str) -> CertResult<Vec<u8>> {
    let block = parse_block(text, "CSR PEM")?;
    match BlockKind::from_tag(block.tag()) {
        BlockKind::CertificateRequest => Ok(block.into_contents()),
        other => Err(CertError::DecodeError(format!(
            "expected a {} block, found {}",
            CERTIFICATE_REQUEST_TAG, other
        ))),
    }
}

/// Serialize an RSA private key as a PKCS#1 `RSA PRIVATE KEY` block
pub fn encode_private_key(key: &RsaPrivateKey) -> CertResult<String> {
    let der = key
        .to_pkcs1_der()
        .map_err(|e| CertError::crypto("encode private key", e))?;
    Ok(encode_block(RSA_PRIVATE_KEY_TAG, der.as_bytes().to_vec()))
}

/// Parse an RSA private key from a PKCS#1 or PKCS#8 PEM block
pub fn decode_private_key(text: &str) -> CertResult<RsaPrivateKey> {
    let block = parse_block(text, "private key PEM")?;
    match BlockKind::from_tag(block.tag()) {
        BlockKind::RsaPrivateKey => RsaPrivateKey::from_pkcs1_der(block.contents())
            .map_err(|e| CertError::decode("PKCS#1 private key", e)),
        BlockKind::PrivateKey => RsaPrivateKey::from_pkcs8_der(block.contents())
            .map_err(|e| CertError::decode("PKCS#8 private key", e)),
        other => Err(CertError::DecodeError(format!(
            "expected a private key block, found {}",
            other
        ))),
    }
}
