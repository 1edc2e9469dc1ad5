use crate::codec;
use crate::error::{CertError, CertResult};
use chrono::{DateTime, Utc};
use rcgen::{CertificateParams, DnType, KeyPair, PublicKeyData, SignatureAlgorithm};
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned record identifier. Starts at 1 and only ever grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateId(u64);

impl CertificateId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Distinguished-name attributes the engine reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectAttribute {
    Country,
    State,
    City,
    StreetAddress,
    PostalCode,
    Organization,
    OrganizationalUnit,
    CommonName,
}

impl SubjectAttribute {
    /// Encoding order of attributes inside a distinguished name
    pub const ALL: [SubjectAttribute; 8] = [
        Self::Country,
        Self::State,
        Self::City,
        Self::StreetAddress,
        Self::PostalCode,
        Self::Organization,
        Self::OrganizationalUnit,
        Self::CommonName,
    ];

    pub fn oid_arcs(self) -> &'static [u64] {
        match self {
            Self::CommonName => &[2, 5, 4, 3],
            Self::Country => &[2, 5, 4, 6],
            Self::City => &[2, 5, 4, 7],
            Self::State => &[2, 5, 4, 8],
            Self::StreetAddress => &[2, 5, 4, 9],
            Self::Organization => &[2, 5, 4, 10],
            Self::OrganizationalUnit => &[2, 5, 4, 11],
            Self::PostalCode => &[2, 5, 4, 17],
        }
    }

    /// Dotted OID, e.g. `2.5.4.3`
    pub fn oid(self) -> String {
        self.oid_arcs()
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn from_oid(oid: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|attr| attr.oid() == oid)
    }

    pub fn dn_type(self) -> DnType {
        match self {
            Self::CommonName => DnType::CommonName,
            Self::Country => DnType::CountryName,
            Self::City => DnType::LocalityName,
            Self::State => DnType::StateOrProvinceName,
            Self::Organization => DnType::OrganizationName,
            Self::OrganizationalUnit => DnType::OrganizationalUnitName,
            Self::StreetAddress | Self::PostalCode => DnType::CustomDnType(self.oid_arcs().to_vec()),
        }
    }

    /// RFC 5280 short name
    pub fn short_name(self) -> &'static str {
        match self {
            Self::CommonName => "CN",
            Self::Country => "C",
            Self::City => "L",
            Self::State => "ST",
            Self::StreetAddress => "street",
            Self::Organization => "O",
            Self::OrganizationalUnit => "OU",
            Self::PostalCode => "postalCode",
        }
    }
}

/// Subject distinguished name. Empty fields are left out of the encoded name.
///
/// Field names follow the JSON the certificate service has always accepted:
/// camelCase, with the common name spelled `CN`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubjectName {
    #[serde(rename = "CN", alias = "commonName")]
    pub common_name: String,
    pub organization: String,
    pub organizational_unit: String,
    pub country: String,
    pub state: String,
    pub city: String,
    pub street_address: String,
    pub postal_code: String,
}

impl SubjectName {
    pub fn with_common_name(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            ..Self::default()
        }
    }

    pub fn get(&self, attribute: SubjectAttribute) -> &str {
        match attribute {
            SubjectAttribute::CommonName => &self.common_name,
            SubjectAttribute::Country => &self.country,
            SubjectAttribute::City => &self.city,
            SubjectAttribute::State => &self.state,
            SubjectAttribute::StreetAddress => &self.street_address,
            SubjectAttribute::Organization => &self.organization,
            SubjectAttribute::OrganizationalUnit => &self.organizational_unit,
            SubjectAttribute::PostalCode => &self.postal_code,
        }
    }

    pub fn set(&mut self, attribute: SubjectAttribute, value: impl Into<String>) {
        let slot = match attribute {
            SubjectAttribute::CommonName => &mut self.common_name,
            SubjectAttribute::Country => &mut self.country,
            SubjectAttribute::City => &mut self.city,
            SubjectAttribute::State => &mut self.state,
            SubjectAttribute::StreetAddress => &mut self.street_address,
            SubjectAttribute::Organization => &mut self.organization,
            SubjectAttribute::OrganizationalUnit => &mut self.organizational_unit,
            SubjectAttribute::PostalCode => &mut self.postal_code,
        };
        *slot = value.into();
    }

    /// Non-empty attributes in encoding order
    pub fn attributes(&self) -> impl Iterator<Item = (SubjectAttribute, &str)> + '_ {
        SubjectAttribute::ALL
            .into_iter()
            .map(|attr| (attr, self.get(attr)))
            .filter(|(_, value)| !value.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.attributes().next().is_none()
    }
}

impl fmt::Display for SubjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .attributes()
            .map(|(attr, value)| format!("{}={}", attr.short_name(), value))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Request to issue a certificate: subject plus subject-alternative-names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    #[serde(flatten)]
    pub subject: SubjectName,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sans: Vec<String>,
}

impl CertificateInfo {
    pub fn new(subject: SubjectName) -> Self {
        Self {
            subject,
            sans: Vec::new(),
        }
    }

    pub fn with_sans<I, S>(mut self, sans: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sans = sans.into_iter().map(Into::into).collect();
        self
    }
}

/// RSA public key in the form the certificate builder consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPublicKey {
    key: RsaPublicKey,
    /// PKCS#1 `RSAPublicKey`, i.e. the subjectPublicKey bit string contents
    pkcs1_der: Vec<u8>,
}

impl RecordPublicKey {
    pub fn from_rsa(key: RsaPublicKey) -> CertResult<Self> {
        let pkcs1_der = key
            .to_pkcs1_der()
            .map_err(|e| CertError::crypto("encode public key", e))?
            .as_bytes()
            .to_vec();
        Ok(Self { key, pkcs1_der })
    }

    pub fn rsa(&self) -> &RsaPublicKey {
        &self.key
    }

    pub fn bits(&self) -> usize {
        self.key.size() * 8
    }
}

impl PublicKeyData for RecordPublicKey {
    fn der_bytes(&self) -> &[u8] {
        &self.pkcs1_der
    }

    fn algorithm(&self) -> &'static SignatureAlgorithm {
        &rcgen::PKCS_RSA_SHA256
    }
}

/// RSA private key together with the signer built from it
pub struct RecordPrivateKey {
    key: RsaPrivateKey,
    signer: KeyPair,
}

impl RecordPrivateKey {
    pub fn from_rsa(key: RsaPrivateKey) -> CertResult<Self> {
        let pkcs8_pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CertError::crypto("encode private key", e))?;
        let signer = KeyPair::from_pem(pkcs8_pem.as_str())
            .map_err(|e| CertError::crypto("load signing key", e))?;
        Ok(Self { key, signer })
    }

    pub fn rsa(&self) -> &RsaPrivateKey {
        &self.key
    }

    pub fn signer(&self) -> &KeyPair {
        &self.signer
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.key.to_public_key()
    }

    /// PKCS#1 `RSA PRIVATE KEY` PEM block
    pub fn to_pem(&self) -> CertResult<String> {
        codec::encode_private_key(&self.key)
    }
}

impl fmt::Debug for RecordPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordPrivateKey")
            .field("bits", &(self.key.size() * 8))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    /// Template and key pair generated by the engine
    Issued,
    /// Built from an external CSR; the requester keeps the private key
    CsrSigned,
    /// Certificate (and optionally key) supplied by the caller
    Imported,
}

/// Everything a record holds apart from its identifier.
///
/// The template is never signed at creation time; signed bytes are produced on
/// export or when the record takes part in a signing operation, and are not cached.
#[derive(Debug)]
pub struct CertificateMaterial {
    pub template: CertificateParams,
    pub info: CertificateInfo,
    pub is_ca: bool,
    pub serial: Vec<u8>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub public_key: RecordPublicKey,
    pub private_key: Option<RecordPrivateKey>,
    pub origin: RecordOrigin,
}

/// A stored record. Immutable once the store has assigned its identifier.
#[derive(Debug)]
pub struct CertificateRecord {
    id: CertificateId,
    created_at: DateTime<Utc>,
    material: CertificateMaterial,
}

impl CertificateRecord {
    pub(crate) fn new(id: CertificateId, material: CertificateMaterial) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            material,
        }
    }

    pub fn id(&self) -> CertificateId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn template(&self) -> &CertificateParams {
        &self.material.template
    }

    pub fn subject(&self) -> &SubjectName {
        &self.material.info.subject
    }

    pub fn sans(&self) -> &[String] {
        &self.material.info.sans
    }

    pub fn is_ca(&self) -> bool {
        self.material.is_ca
    }

    pub fn serial(&self) -> &[u8] {
        &self.material.serial
    }

    pub fn public_key(&self) -> &RecordPublicKey {
        &self.material.public_key
    }

    pub fn private_key(&self) -> Option<&RecordPrivateKey> {
        self.material.private_key.as_ref()
    }

    pub fn origin(&self) -> RecordOrigin {
        self.material.origin
    }

    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            id: self.id,
            subject: self.subject().clone(),
        }
    }

    pub fn view(&self) -> RecordView {
        RecordView {
            id: self.id,
            subject: self.subject().clone(),
            sans: self.sans().to_vec(),
            is_ca: self.is_ca(),
            not_before: self.material.not_before,
            not_after: self.material.not_after,
            serial: hex::encode(&self.material.serial),
            origin: self.origin(),
            has_private_key: self.material.private_key.is_some(),
            created_at: self.created_at,
        }
    }
}

/// Entry of a store listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: CertificateId,
    pub subject: SubjectName,
}

/// Read-only projection of a record for inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordView {
    pub id: CertificateId,
    pub subject: SubjectName,
    pub sans: Vec<String>,
    pub is_ca: bool,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Hex-encoded serial number
    pub serial: String,
    pub origin: RecordOrigin,
    pub has_private_key: bool,
    pub created_at: DateTime<Utc>,
}

/// Freshly signed certificate, DER plus its `CERTIFICATE` PEM block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCertificate {
    pub der: Vec<u8>,
    pub pem: String,
}

impl SignedCertificate {
    pub fn from_der(der: Vec<u8>) -> Self {
        let pem = codec::encode_certificate(&der);
        Self { der, pem }
    }
}
