use crate::config::EngineConfig;
use crate::error::CertResult;
use crate::export::{CaPackage, Exporter};
use crate::import::Importer;
use crate::issuance::IssuanceEngine;
use crate::models::{
    CertificateId, CertificateInfo, RecordSummary, RecordView, SignedCertificate,
};
use crate::serial::SerialNumberGenerator;
use crate::signing::SigningEngine;
use crate::store::{CertificateStore, InMemoryCertificateStore};
use std::sync::Arc;
use tracing::{info, instrument};
use zeroize::Zeroizing;

/// Certificate authority facade.
///
/// Wires the issuance, signing, import and export engines to one shared
/// store and serial registry, and exposes the public operation set.
pub struct CertificateAuthorityService {
    store: Arc<dyn CertificateStore>,
    issuance: IssuanceEngine,
    signing: SigningEngine,
    importer: Importer,
    exporter: Exporter,
    config: Arc<EngineConfig>,
}

impl CertificateAuthorityService {
    /// Create a service over `store` after validating `config`
    pub fn new(store: Arc<dyn CertificateStore>, config: EngineConfig) -> CertResult<Self> {
        config.validate()?;

        let config = Arc::new(config);
        let serials = Arc::new(SerialNumberGenerator::new());

        info!(
            rsa_key_bits = config.rsa_key_bits,
            verify_csr_signatures = config.verify_csr_signatures,
            verify_imported_key_pairs = config.verify_imported_key_pairs,
            "Initializing certificate authority service"
        );

        Ok(Self {
            issuance: IssuanceEngine::new(store.clone(), serials.clone(), config.clone()),
            signing: SigningEngine::new(store.clone(), serials.clone(), config.clone()),
            importer: Importer::new(store.clone(), serials, config.clone()),
            exporter: Exporter::new(store.clone()),
            store,
            config,
        })
    }

    /// Service backed by a fresh [`InMemoryCertificateStore`]
    pub fn in_memory(config: EngineConfig) -> CertResult<Self> {
        Self::new(Arc::new(InMemoryCertificateStore::new()), config)
    }

    /// In-memory service configured from `CERT_ENGINE_*` variables
    pub fn from_env() -> CertResult<Self> {
        Self::in_memory(EngineConfig::from_env()?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn CertificateStore> {
        self.store.clone()
    }

    // =============================================================================
    // Issuance
    // =============================================================================

    /// Create a CA record (10-year template, fresh key pair). Nothing is signed yet.
    #[instrument(skip_all, fields(subject = %info.subject))]
    pub async fn create_ca(&self, info: CertificateInfo) -> CertResult<CertificateId> {
        self.issuance.generate_certificate(info, true).await
    }

    /// Create a leaf record (1-year template, fresh key pair)
    #[instrument(skip_all, fields(subject = %info.subject))]
    pub async fn create_client_cert(&self, info: CertificateInfo) -> CertResult<CertificateId> {
        self.issuance.generate_certificate(info, false).await
    }

    // =============================================================================
    // Signing
    // =============================================================================

    #[instrument(skip(self), fields(ca_id = %ca_id, cert_id = %cert_id))]
    pub async fn sign_with_ca(
        &self,
        ca_id: CertificateId,
        cert_id: CertificateId,
    ) -> CertResult<SignedCertificate> {
        self.signing.sign_with_ca(ca_id, cert_id).await
    }

    /// Sign a PEM CSR with `ca_id`. Returns the id of the stored record along
    /// with the signed certificate.
    #[instrument(skip(self, csr_pem), fields(ca_id = %ca_id))]
    pub async fn sign_from_csr(
        &self,
        ca_id: CertificateId,
        csr_pem: &str,
    ) -> CertResult<(CertificateId, SignedCertificate)> {
        self.signing.sign_from_csr(ca_id, csr_pem).await
    }

    // =============================================================================
    // Import / export
    // =============================================================================

    #[instrument(skip_all, fields(with_key = key_pem.is_some()))]
    pub async fn import(&self, cert_pem: &str, key_pem: Option<&str>) -> CertResult<CertificateId> {
        self.importer.import(cert_pem, key_pem).await
    }

    #[instrument(skip(self), fields(id = %id))]
    pub async fn export_ca_package(&self, id: CertificateId) -> CertResult<CaPackage> {
        self.exporter.export_ca_package(id).await
    }

    pub async fn export_private_key(&self, id: CertificateId) -> CertResult<Zeroizing<String>> {
        self.exporter.export_private_key(id).await
    }

    // =============================================================================
    // Lookup
    // =============================================================================

    pub async fn list_all(&self) -> Vec<RecordSummary> {
        self.exporter.list().await
    }

    pub async fn record_view(&self, id: CertificateId) -> CertResult<RecordView> {
        self.exporter.record_view(id).await
    }
}
