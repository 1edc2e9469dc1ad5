use crate::codec;
use crate::config::EngineConfig;
use crate::error::{CertError, CertResult};
use crate::issuance::{subject_template, ValidityWindow};
use crate::models::{
    CertificateId, CertificateMaterial, CertificateRecord, RecordOrigin, RecordPublicKey,
    SignedCertificate,
};
use crate::parse;
use crate::serial::SerialNumberGenerator;
use crate::store::CertificateStore;
use rcgen::{CertificateParams, Issuer};
use std::sync::Arc;
use tracing::{debug, info};

/// Sign `template` for `public_key` with the key of `authority`.
///
/// The issuer name is taken from the authority's own template, so the result
/// chains to whatever the authority exports.
pub(crate) fn sign_with_authority(
    template: &CertificateParams,
    public_key: &RecordPublicKey,
    authority: &CertificateRecord,
) -> CertResult<SignedCertificate> {
    let signing_key = authority
        .private_key()
        .ok_or_else(|| CertError::InvalidSigner {
            id: authority.id(),
            reason: "record has no private key".to_string(),
        })?;

    let issuer = Issuer::new(authority.template().clone(), signing_key.signer());
    let certificate = template
        .signed_by(public_key, &issuer)
        .map_err(|e| CertError::crypto("sign certificate", e))?;

    Ok(SignedCertificate::from_der(certificate.der().to_vec()))
}

/// Signs stored templates and external CSRs with a CA record's key.
/// Signed output is returned to the caller and never cached on a record.
pub struct SigningEngine {
    store: Arc<dyn CertificateStore>,
    serials: Arc<SerialNumberGenerator>,
    config: Arc<EngineConfig>,
}

impl SigningEngine {
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

    /// Sign the template of `cert_id` with the CA `ca_id`
    pub async fn sign_with_ca(
        &self,
        ca_id: CertificateId,
        cert_id: CertificateId,
    ) -> CertResult<SignedCertificate> {
        let authority = self.authority(ca_id).await?;
        let target = self.store.get(cert_id).await?;

        let signed = sign_with_authority(target.template(), target.public_key(), &authority)?;
        debug!(ca_id = %ca_id, cert_id = %cert_id, "Signed stored template");
        Ok(signed)
    }

    /// Build a one-year leaf from a PEM CSR, sign it with `ca_id` and store it
    /// without a private key.
    pub async fn sign_from_csr(
        &self,
        ca_id: CertificateId,
        csr_pem: &str,
    ) -> CertResult<(CertificateId, SignedCertificate)> {
        let der = codec::decode_certificate_request(csr_pem)?;
        let request = parse::parse_certificate_request(&der, self.config.verify_csr_signatures)?;

        let authority = self.authority(ca_id).await?;

        let window = ValidityWindow::starting_now(&self.config, false)?;
        let serial = self.serials.next_serial();
        let template =
            subject_template(&request.info.subject, request.alt_names, false, &serial, &window)?;
        let public_key = RecordPublicKey::from_rsa(request.public_key)?;

        let signed = sign_with_authority(&template, &public_key, &authority)?;

        let id = self
            .store
            .put(CertificateMaterial {
                template,
                info: request.info,
                is_ca: false,
                serial,
                not_before: window.not_before,
                not_after: window.not_after,
                public_key,
                private_key: None,
                origin: RecordOrigin::CsrSigned,
            })
            .await;

        info!(id = %id, ca_id = %ca_id, "Signed certificate from CSR");
        Ok((id, signed))
    }

    /// Load a record and check it may act as a signing authority
    async fn authority(&self, id: CertificateId) -> CertResult<Arc<CertificateRecord>> {
        let record = self.store.get(id).await?;

        if !record.is_ca() {
            return Err(CertError::InvalidSigner {
                id,
                reason: "record is not a CA".to_string(),
            });
        }
        if record.private_key().is_none() {
            return Err(CertError::InvalidSigner {
                id,
                reason: "record has no private key".to_string(),
            });
        }

        Ok(record)
    }
}
