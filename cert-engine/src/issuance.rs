use crate::config::EngineConfig;
use crate::error::{CertError, CertResult};
use crate::models::{
    CertificateId, CertificateInfo, CertificateMaterial, RecordOrigin, RecordPrivateKey,
    RecordPublicKey, SubjectName,
};
use crate::serial::SerialNumberGenerator;
use crate::store::CertificateStore;
use chrono::{DateTime, Duration, Months, SubsecRound, Utc};
use rand::rngs::OsRng;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, ExtendedKeyUsagePurpose, IsCa,
    KeyUsagePurpose, SanType, SerialNumber,
};
use rsa::RsaPrivateKey;
use std::net::IpAddr;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Validity window of a new certificate, whole seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ValidityWindow {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl ValidityWindow {
    /// Opens `backdate_days` before now, closes the configured number of calendar years after now
    pub(crate) fn starting_now(config: &EngineConfig, is_ca: bool) -> CertResult<Self> {
        Self::starting_at(Utc::now().trunc_subsecs(0), config, is_ca)
    }

    fn starting_at(now: DateTime<Utc>, config: &EngineConfig, is_ca: bool) -> CertResult<Self> {
        let not_before = now
            .checked_sub_signed(Duration::days(i64::from(config.backdate_days)))
            .ok_or_else(|| CertError::Configuration("backdate out of range".to_string()))?;
        let months = config.validity_years(is_ca).saturating_mul(12);
        let not_after = now
            .checked_add_months(Months::new(months))
            .ok_or_else(|| CertError::Configuration("validity out of range".to_string()))?;
        Ok(Self {
            not_before,
            not_after,
        })
    }
}

fn to_offset(value: DateTime<Utc>) -> CertResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(value.timestamp())
        .map_err(|e| CertError::crypto("validity timestamp", e))
}

/// SAN entries that parse as IP addresses become IP SANs, the rest DNS names
fn san_entry(value: &str) -> CertResult<SanType> {
    if value.is_empty() {
        return Err(CertError::InvalidSubject("empty subject alternative name".to_string()));
    }
    if let Ok(ip) = value.parse::<IpAddr>() {
        return Ok(SanType::IpAddress(ip));
    }
    value
        .to_string()
        .try_into()
        .map(SanType::DnsName)
        .map_err(|e| CertError::InvalidSubject(format!("DNS name '{}': {}", value, e)))
}

/// Build an unsigned certificate template from caller-supplied subject details.
pub(crate) fn certificate_template(
    info: &CertificateInfo,
    is_ca: bool,
    serial: &[u8],
    window: &ValidityWindow,
) -> CertResult<CertificateParams> {
    let alt_names = info
        .sans
        .iter()
        .map(|san| san_entry(san))
        .collect::<CertResult<Vec<_>>>()?;
    subject_template(&info.subject, alt_names, is_ca, serial, window)
}

/// Build an unsigned certificate template with already typed SAN entries.
///
/// CA templates get `digitalSignature` + `keyCertSign` and unconstrained basic
/// constraints; leaf templates get `digitalSignature` and an explicit non-CA
/// marker. Both carry `clientAuth` + `serverAuth`.
pub(crate) fn subject_template(
    subject: &SubjectName,
    alt_names: Vec<SanType>,
    is_ca: bool,
    serial: &[u8],
    window: &ValidityWindow,
) -> CertResult<CertificateParams> {
    let mut params = CertificateParams::default();

    let mut name = DistinguishedName::new();
    for (attribute, value) in subject.attributes() {
        name.push(attribute.dn_type(), value);
    }
    params.distinguished_name = name;
    params.subject_alt_names = alt_names;

    params.serial_number = Some(SerialNumber::from_slice(serial));
    params.not_before = to_offset(window.not_before)?;
    params.not_after = to_offset(window.not_after)?;

    if is_ca {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyCertSign];
    } else {
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    }
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ClientAuth,
        ExtendedKeyUsagePurpose::ServerAuth,
    ];

    Ok(params)
}

/// Creates CA and leaf records with freshly generated RSA key pairs.
/// Records are stored unsigned.
pub struct IssuanceEngine {
    store: Arc<dyn CertificateStore>,
    serials: Arc<SerialNumberGenerator>,
    config: Arc<EngineConfig>,

    /// Bounds simultaneous key generations when configured
    keygen_permits: Option<Arc<Semaphore>>,
}

impl IssuanceEngine {
    pub fn new(
        store: Arc<dyn CertificateStore>,
        serials: Arc<SerialNumberGenerator>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let keygen_permits = config
            .max_concurrent_keygen
            .map(|permits| Arc::new(Semaphore::new(permits)));
        Self {
            store,
            serials,
            config,
            keygen_permits,
        }
    }

    /// Build a template for `info`, generate a key pair and store both.
    pub async fn generate_certificate(
        &self,
        info: CertificateInfo,
        is_ca: bool,
    ) -> CertResult<CertificateId> {
        // Reject bad subjects before paying for a key
        let window = ValidityWindow::starting_now(&self.config, is_ca)?;
        let serial = self.serials.next_serial();
        let template = certificate_template(&info, is_ca, &serial, &window)?;

        let key = self.generate_key().await?;
        let public_key = RecordPublicKey::from_rsa(key.to_public_key())?;
        let private_key = RecordPrivateKey::from_rsa(key)?;

        let id = self
            .store
            .put(CertificateMaterial {
                template,
                info,
                is_ca,
                serial,
                not_before: window.not_before,
                not_after: window.not_after,
                public_key,
                private_key: Some(private_key),
                origin: RecordOrigin::Issued,
            })
            .await;

        info!(id = %id, is_ca, "Issued certificate record");
        Ok(id)
    }

    async fn generate_key(&self) -> CertResult<RsaPrivateKey> {
        let _permit = match &self.keygen_permits {
            Some(permits) => Some(
                Arc::clone(permits)
                    .acquire_owned()
                    .await
                    .map_err(|e| CertError::crypto("key generation throttle", e))?,
            ),
            None => None,
        };

        let bits = self.config.rsa_key_bits;
        debug!(bits, "Generating RSA key pair");
        tokio::task::spawn_blocking(move || RsaPrivateKey::new(&mut OsRng, bits))
            .await
            .map_err(|e| CertError::crypto("key generation task", e))?
            .map_err(|e| CertError::crypto("RSA key generation", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn window(is_ca: bool) -> ValidityWindow {
        ValidityWindow::starting_now(&EngineConfig::default(), is_ca).unwrap()
    }

    #[test]
    fn test_ca_window_is_ten_calendar_years() {
        let now = DateTime::parse_from_rfc3339("2024-02-29T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let window = ValidityWindow::starting_at(now, &EngineConfig::default(), true).unwrap();
        assert_eq!(window.not_before, now - Duration::days(1));
        assert_eq!(window.not_after.year(), 2034);
        assert_eq!(window.not_after.month(), 2);
        assert_eq!(window.not_after.day(), 28);
    }

    #[test]
    fn test_leaf_window_contains_now() {
        let window = window(false);
        let now = Utc::now();
        assert!(window.not_before <= now && now <= window.not_after);
        let span = window.not_after - window.not_before;
        assert!(span >= Duration::days(366) && span <= Duration::days(367));
    }

    #[test]
    fn test_ca_template_usages() {
        let info = CertificateInfo::new(SubjectName::with_common_name("Root"));
        let params = certificate_template(&info, true, &[0x01, 0x02], &window(true)).unwrap();
        assert!(matches!(params.is_ca, IsCa::Ca(BasicConstraints::Unconstrained)));
        assert_eq!(
            params.key_usages,
            vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyCertSign]
        );
        assert_eq!(
            params.extended_key_usages,
            vec![ExtendedKeyUsagePurpose::ClientAuth, ExtendedKeyUsagePurpose::ServerAuth]
        );
    }

    #[test]
    fn test_leaf_template_usages_and_sans() {
        let info = CertificateInfo::new(SubjectName::with_common_name("leaf"))
            .with_sans(["leaf.example.com", "10.1.2.3"]);
        let params = certificate_template(&info, false, &[0x01], &window(false)).unwrap();
        assert!(matches!(params.is_ca, IsCa::ExplicitNoCa));
        assert_eq!(params.key_usages, vec![KeyUsagePurpose::DigitalSignature]);
        assert_eq!(params.subject_alt_names.len(), 2);
        assert!(matches!(params.subject_alt_names[1], SanType::IpAddress(_)));
    }

    #[test]
    fn test_unencodable_san_is_invalid_subject() {
        let info = CertificateInfo::new(SubjectName::default()).with_sans(["bücher.example"]);
        let err = certificate_template(&info, false, &[0x01], &window(false)).unwrap_err();
        assert!(matches!(err, CertError::InvalidSubject(_)));

        let info = CertificateInfo::new(SubjectName::default()).with_sans([""]);
        let err = certificate_template(&info, false, &[0x01], &window(false)).unwrap_err();
        assert!(matches!(err, CertError::InvalidSubject(_)));
    }
}
