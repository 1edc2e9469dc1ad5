#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing))]

//! X.509 issuance and signing engine
//!
//! Issues RSA-keyed CA and leaf certificates, signs stored templates and
//! external CSRs with a CA record, imports existing certificate/key pairs and
//! exports self-signed CA packages. All records live in a [`CertificateStore`]
//! for the lifetime of the process.
//!
//! Certificates are never signed at creation time. A record holds an unsigned
//! template plus its key material; DER is produced when the record is exported
//! or used in a signing operation.
//!
//! # Example
//!
//! ```no_run
//! use cert_engine::{CertificateAuthorityService, CertificateInfo, EngineConfig, SubjectName};
//!
//! # async fn run() -> cert_engine::CertResult<()> {
//! let service = CertificateAuthorityService::in_memory(EngineConfig::default())?;
//!
//! let ca_id = service
//!     .create_ca(CertificateInfo::new(SubjectName::with_common_name("Example Root")))
//!     .await?;
//! let leaf_id = service
//!     .create_client_cert(
//!         CertificateInfo::new(SubjectName::with_common_name("client")).with_sans(["client.example.com"]),
//!     )
//!     .await?;
//!
//! let leaf = service.sign_with_ca(ca_id, leaf_id).await?;
//! let package = service.export_ca_package(ca_id).await?;
//! println!("{}{}", package.cert_pem, leaf.pem);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod issuance;
pub mod models;
pub mod parse;
pub mod serial;
pub mod service;
pub mod signing;
pub mod store;

pub use codec::{block_kind, BlockKind};
pub use config::EngineConfig;
pub use error::{CertError, CertResult};
pub use export::{CaPackage, Exporter, CA_CERT_FILE_NAME, CA_KEY_FILE_NAME};
pub use import::Importer;
pub use issuance::IssuanceEngine;
pub use models::*;
pub use serial::SerialNumberGenerator;
pub use service::CertificateAuthorityService;
pub use signing::SigningEngine;
pub use store::{CertificateStore, InMemoryCertificateStore};
