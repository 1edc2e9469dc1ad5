//! DER → owned certificate and CSR details

use crate::error::{CertError, CertResult};
use crate::models::{CertificateInfo, SubjectAttribute, SubjectName};
use chrono::{DateTime, Utc};
use rcgen::SanType;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use std::net::IpAddr;
use tracing::debug;
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::prelude::{FromDer, X509Certificate, X509Name};
use x509_parser::time::ASN1Time;
use x509_parser::x509::SubjectPublicKeyInfo;

/// Fields of an X.509 certificate the engine keeps
#[derive(Debug, Clone)]
pub struct ParsedCertificate {
    pub info: CertificateInfo,
    /// SAN entries with the kind they were encoded with
    pub alt_names: Vec<SanType>,
    pub issuer: SubjectName,
    pub is_ca: bool,
    pub serial: Vec<u8>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub public_key: RsaPublicKey,
}

/// Fields of a PKCS#10 request the engine keeps
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub info: CertificateInfo,
    pub alt_names: Vec<SanType>,
    pub public_key: RsaPublicKey,
}

pub fn parse_certificate(der: &[u8]) -> CertResult<ParsedCertificate> {
    let (_, cert) =
        X509Certificate::from_der(der).map_err(|e| CertError::decode("certificate DER", e))?;

    let mut sans = Vec::new();
    let mut alt_names = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        collect_sans(&san.value.general_names, &mut sans, &mut alt_names);
    }

    let is_ca = matches!(cert.basic_constraints(), Ok(Some(bc)) if bc.value.ca);

    Ok(ParsedCertificate {
        info: CertificateInfo {
            subject: subject_name(cert.subject()),
            sans,
        },
        alt_names,
        issuer: subject_name(cert.issuer()),
        is_ca,
        serial: cert.raw_serial().to_vec(),
        not_before: to_utc(&cert.validity().not_before)?,
        not_after: to_utc(&cert.validity().not_after)?,
        public_key: rsa_public_key(cert.public_key())?,
    })
}

/// Parse a CSR. The self-signature is only checked when `verify_signature` is set.
pub fn parse_certificate_request(der: &[u8], verify_signature: bool) -> CertResult<ParsedRequest> {
    let (_, csr) =
        X509CertificationRequest::from_der(der).map_err(|e| CertError::decode("CSR DER", e))?;

    if verify_signature {
        csr.verify_signature()
            .map_err(|e| CertError::decode("CSR signature", e))?;
    }

    let mut sans = Vec::new();
    let mut alt_names = Vec::new();
    if let Some(extensions) = csr.requested_extensions() {
        for ext in extensions {
            if let ParsedExtension::SubjectAlternativeName(san) = ext {
                collect_sans(&san.general_names, &mut sans, &mut alt_names);
            }
        }
    }

    let request_info = &csr.certification_request_info;
    Ok(ParsedRequest {
        info: CertificateInfo {
            subject: subject_name(&request_info.subject),
            sans,
        },
        alt_names,
        public_key: rsa_public_key(&request_info.subject_pki)?,
    })
}

/// Known attributes only; anything else in the name is dropped.
/// Repeated attributes keep the last value.
fn subject_name(name: &X509Name<'_>) -> SubjectName {
    let mut subject = SubjectName::default();
    for attr in name.iter_attributes() {
        let oid = attr.attr_type().to_id_string();
        if let (Some(kind), Ok(value)) = (SubjectAttribute::from_oid(&oid), attr.as_str()) {
            subject.set(kind, value);
        }
    }
    subject
}

/// DNS and IP entries keep their kind; other name forms are dropped.
fn collect_sans(names: &[GeneralName<'_>], sans: &mut Vec<String>, alt_names: &mut Vec<SanType>) {
    for name in names {
        match name {
            GeneralName::DNSName(dns) => match (*dns).to_string().try_into().map(SanType::DnsName) {
                Ok(entry) => {
                    sans.push((*dns).to_string());
                    alt_names.push(entry);
                }
                Err(e) => debug!(name = *dns, error = %e, "Dropping unencodable DNS name"),
            },
            GeneralName::IPAddress(bytes) => match ip_from_bytes(bytes) {
                Some(ip) => {
                    sans.push(ip.to_string());
                    alt_names.push(SanType::IpAddress(ip));
                }
                None => debug!(len = bytes.len(), "Dropping malformed IP address"),
            },
            other => debug!(name = ?other, "Dropping unsupported subject alternative name"),
        }
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}

fn rsa_public_key(spki: &SubjectPublicKeyInfo<'_>) -> CertResult<RsaPublicKey> {
    RsaPublicKey::from_public_key_der(spki.raw)
        .map_err(|e| CertError::decode("subject public key is not RSA", e))
}

fn to_utc(time: &ASN1Time) -> CertResult<DateTime<Utc>> {
    let timestamp = time.to_datetime().unix_timestamp();
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .ok_or_else(|| CertError::DecodeError(format!("validity timestamp {} out of range", timestamp)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_from_bytes() {
        assert_eq!(
            ip_from_bytes(&[127, 0, 0, 1]),
            Some("127.0.0.1".parse().unwrap())
        );
        let mut v6 = [0u8; 16];
        v6[15] = 1;
        assert_eq!(ip_from_bytes(&v6), Some("::1".parse().unwrap()));
        assert_eq!(ip_from_bytes(&[1, 2, 3]), None);
    }

    #[test]
    fn test_san_kinds_are_kept() {
        let names = [
            GeneralName::DNSName("10.0.0.1"),
            GeneralName::IPAddress(&[10, 0, 0, 2]),
            GeneralName::RFC822Name("ops@example.com"),
            GeneralName::URI("https://example.com/"),
        ];
        let mut sans = Vec::new();
        let mut alt_names = Vec::new();
        collect_sans(&names, &mut sans, &mut alt_names);

        assert_eq!(sans, vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
        assert_eq!(
            alt_names,
            vec![
                SanType::DnsName("10.0.0.1".to_string().try_into().unwrap()),
                SanType::IpAddress("10.0.0.2".parse().unwrap()),
            ]
        );
    }

    #[test]
    fn test_garbage_der_is_decode_error() {
        assert!(matches!(
            parse_certificate(&[0x30, 0x01]),
            Err(CertError::DecodeError(_))
        ));
        assert!(matches!(
            parse_certificate_request(&[1, 2, 3], false),
            Err(CertError::DecodeError(_))
        ));
    }

    #[test]
    fn test_non_rsa_key_is_decode_error() {
        let mut params = rcgen::CertificateParams::new(vec!["foo.com".to_string()]).unwrap();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "foo");
        let key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let cert = params.self_signed(&key).unwrap();

        let err = parse_certificate(cert.der()).unwrap_err();
        assert!(matches!(err, CertError::DecodeError(_)));
    }
}
