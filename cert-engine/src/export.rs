use crate::error::{CertError, CertResult};
use crate::models::{CertificateId, RecordSummary, RecordView, SignedCertificate};
use crate::store::CertificateStore;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

/// File name of the certificate inside a CA package
pub const CA_CERT_FILE_NAME: &str = "caCert.pem";

/// File name of the private key inside a CA package
pub const CA_KEY_FILE_NAME: &str = "privKey.key";

/// Self-signed certificate and its PKCS#1 private key
#[derive(Clone, PartialEq, Eq)]
pub struct CaPackage {
    pub cert_pem: String,
    pub key_pem: String,
}

impl CaPackage {
    /// `(file name, contents)` pairs in package order
    pub fn entries(&self) -> [(&'static str, &str); 2] {
        [
            (CA_CERT_FILE_NAME, self.cert_pem.as_str()),
            (CA_KEY_FILE_NAME, self.key_pem.as_str()),
        ]
    }

    /// Write both entries into `dir`, which must exist
    pub fn write_to_dir(&self, dir: &Path) -> std::io::Result<()> {
        for (name, contents) in self.entries() {
            std::fs::write(dir.join(name), contents)?;
        }
        Ok(())
    }
}

impl Drop for CaPackage {
    fn drop(&mut self) {
        self.key_pem.zeroize();
    }
}

impl std::fmt::Debug for CaPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaPackage")
            .field("cert_pem", &self.cert_pem)
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

/// Read side of the store: packages, keys and views
pub struct Exporter {
    store: Arc<dyn CertificateStore>,
}

impl Exporter {
    pub fn new(store: Arc<dyn CertificateStore>) -> Self {
        Self { store }
    }

    /// Self-sign the record's template with its own key. Signs again on every call.
    pub async fn export_ca_package(&self, id: CertificateId) -> CertResult<CaPackage> {
        let record = self.store.get(id).await?;
        let key = record.private_key().ok_or(CertError::InvalidExport(id))?;

        let certificate = record
            .template()
            .self_signed(key.signer())
            .map_err(|e| CertError::crypto("self-sign certificate", e))?;
        let signed = SignedCertificate::from_der(certificate.der().to_vec());

        debug!(id = %id, "Exported self-signed package");
        Ok(CaPackage {
            cert_pem: signed.pem,
            key_pem: key.to_pem()?,
        })
    }

    /// PKCS#1 PEM of the record's private key
    pub async fn export_private_key(&self, id: CertificateId) -> CertResult<Zeroizing<String>> {
        let record = self.store.get(id).await?;
        let key = record.private_key().ok_or(CertError::InvalidExport(id))?;
        Ok(Zeroizing::new(key.to_pem()?))
    }

    pub async fn record_view(&self, id: CertificateId) -> CertResult<RecordView> {
        Ok(self.store.get(id).await?.view())
    }

    pub async fn list(&self) -> Vec<RecordSummary> {
        self.store.list().await
    }
}
