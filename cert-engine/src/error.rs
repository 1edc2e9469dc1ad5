use crate::models::CertificateId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CertError {
    #[error("Certificate record {0} not found")]
    NotFound(CertificateId),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Record {id} cannot sign certificates: {reason}")]
    InvalidSigner { id: CertificateId, reason: String },

    #[error("Record {0} has no private key to export")]
    InvalidExport(CertificateId),

    #[error("Cryptographic operation failed: {0}")]
    CryptoFailure(String),

    #[error("Invalid subject: {0}")]
    InvalidSubject(String),

    #[error("Private key does not match the certificate public key")]
    KeyMismatch,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CertError {
    pub(crate) fn decode(context: &str, error: impl std::fmt::Display) -> Self {
        Self::DecodeError(format!("{}: {}", context, error))
    }

    pub(crate) fn crypto(context: &str, error: impl std::fmt::Display) -> Self {
        Self::CryptoFailure(format!("{}: {}", context, error))
    }

    /// Stable machine-readable code, for callers that map errors onto a transport status.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::DecodeError(_) => "decode_error",
            Self::InvalidSigner { .. } => "invalid_signer",
            Self::InvalidExport(_) => "invalid_export",
            Self::CryptoFailure(_) => "crypto_failure",
            Self::InvalidSubject(_) => "invalid_subject",
            Self::KeyMismatch => "key_mismatch",
            Self::Configuration(_) => "configuration",
        }
    }
}

pub type CertResult<T> = Result<T, CertError>;
