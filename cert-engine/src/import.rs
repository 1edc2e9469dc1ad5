use crate::codec;
use crate::config::{EngineConfig, MIN_RSA_KEY_BITS};
use crate::error::{CertError, CertResult};
use crate::issuance::{subject_template, ValidityWindow};
use crate::models::{
    CertificateId, CertificateMaterial, RecordOrigin, RecordPrivateKey, RecordPublicKey,
};
use crate::parse;
use crate::serial::SerialNumberGenerator;
use crate::store::CertificateStore;
use rcgen::CertificateParams;
use rsa::traits::PublicKeyParts;
use std::sync::Arc;
use tracing::{info, warn};

/// Ingests externally produced certificates, optionally with their private key
pub struct Importer {
    store: Arc<dyn CertificateStore>,
    serials: Arc<SerialNumberGenerator>,
    config: Arc<EngineConfig>,
}

impl Importer {
    pub fn new(
        store: Arc<dyn CertificateStore>,
        serials: Arc<SerialNumberGenerator>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            serials,
            config,
        }
    }

    /// Parse a `CERTIFICATE` PEM and an optional RSA private key PEM and store them.
    ///
    /// Unreadable input is `DecodeError`. A readable key the signer cannot use
    /// (under 2048 bits) is `CryptoFailure` with an "unsupported key size" message.
    pub async fn import(&self, cert_pem: &str, key_pem: Option<&str>) -> CertResult<CertificateId> {
        let der = codec::decode_certificate(cert_pem)?;
        let parsed = parse::parse_certificate(&der)?;

        let private_key = match key_pem {
            Some(text) => {
                let key = codec::decode_private_key(text)?;
                if key.size() * 8 < MIN_RSA_KEY_BITS {
                    return Err(CertError::CryptoFailure(format!(
                        "unsupported key size: RSA private key is {} bits, at least {} required",
                        key.size() * 8,
                        MIN_RSA_KEY_BITS
                    )));
                }
                if key.n() != parsed.public_key.n() || key.e() != parsed.public_key.e() {
                    if self.config.verify_imported_key_pairs {
                        return Err(CertError::KeyMismatch);
                    }
                    warn!("Imported private key does not match the certificate public key");
                }
                Some(RecordPrivateKey::from_rsa(key)?)
            }
            None => None,
        };

        let template = imported_template(&parsed)?;
        if !self.serials.reserve(&parsed.serial) {
            warn!(serial = %hex::encode(&parsed.serial), "Imported certificate reuses a known serial");
        }

        let has_private_key = private_key.is_some();
        let id = self
            .store
            .put(CertificateMaterial {
                template,
                info: parsed.info,
                is_ca: parsed.is_ca,
                serial: parsed.serial,
                not_before: parsed.not_before,
                not_after: parsed.not_after,
                public_key: RecordPublicKey::from_rsa(parsed.public_key)?,
                private_key,
                origin: RecordOrigin::Imported,
            })
            .await;

        info!(id = %id, is_ca = parsed.is_ca, has_private_key, "Imported certificate");
        Ok(id)
    }
}

/// Template rebuilt from the parsed certificate, with serial, validity and CA
/// flag pinned to the parsed values. Subject attributes outside the known set
/// and extensions other than SANs are not carried over.
fn imported_template(parsed: &parse::ParsedCertificate) -> CertResult<CertificateParams> {
    let window = ValidityWindow {
        not_before: parsed.not_before,
        not_after: parsed.not_after,
    };
    subject_template(
        &parsed.info.subject,
        parsed.alt_names.clone(),
        parsed.is_ca,
        &parsed.serial,
        &window,
    )
}
