//! Engine configuration
//!
//! Controls the knobs the issuance and signing engines expose:
//! - RSA key size for generated key pairs
//! - Validity periods for CA and leaf certificates
//! - Trust decisions for externally supplied material (CSR signatures,
//!   imported key/certificate pairing)
//! - Optional bound on concurrent key generation

use crate::error::{CertError, CertResult};
use std::str::FromStr;

/// Smallest RSA modulus the engine will generate or sign with.
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// Largest RSA modulus the signing backend accepts.
pub const MAX_RSA_KEY_BITS: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// RSA modulus size for generated key pairs
    pub rsa_key_bits: usize,

    /// Validity of CA certificates, in calendar years from creation
    pub ca_validity_years: u32,

    /// Validity of leaf certificates, in calendar years from creation
    pub leaf_validity_years: u32,

    /// How many days before creation the validity window opens (clock skew)
    pub backdate_days: u32,

    /// Reject CSRs whose self-signature does not verify.
    /// Off by default: requests are assumed to arrive over a pre-authenticated channel.
    pub verify_csr_signatures: bool,

    /// Reject imports whose private key does not belong to the certificate.
    /// Off by default: mismatched pairs are accepted as-is.
    pub verify_imported_key_pairs: bool,

    /// Upper bound on simultaneous RSA key generations (None = unbounded)
    pub max_concurrent_keygen: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rsa_key_bits: MIN_RSA_KEY_BITS,
            ca_validity_years: 10,
            leaf_validity_years: 1,
            backdate_days: 1,
            verify_csr_signatures: false,
            verify_imported_key_pairs: false,
            max_concurrent_keygen: None,
        }
    }
}

impl EngineConfig {
    /// Create a configuration from `CERT_ENGINE_*` environment variables
    pub fn from_env() -> CertResult<Self> {
        let mut config = Self::default();

        if let Some(bits) = env_parse::<usize>("CERT_ENGINE_RSA_KEY_BITS")? {
            config.rsa_key_bits = bits;
        }
        if let Some(years) = env_parse::<u32>("CERT_ENGINE_CA_VALIDITY_YEARS")? {
            config.ca_validity_years = years;
        }
        if let Some(years) = env_parse::<u32>("CERT_ENGINE_LEAF_VALIDITY_YEARS")? {
            config.leaf_validity_years = years;
        }
        if let Some(days) = env_parse::<u32>("CERT_ENGINE_BACKDATE_DAYS")? {
            config.backdate_days = days;
        }
        if let Some(verify) = env_parse::<bool>("CERT_ENGINE_VERIFY_CSR_SIGNATURES")? {
            config.verify_csr_signatures = verify;
        }
        if let Some(verify) = env_parse::<bool>("CERT_ENGINE_VERIFY_IMPORTED_KEY_PAIRS")? {
            config.verify_imported_key_pairs = verify;
        }
        config.max_concurrent_keygen = env_parse::<usize>("CERT_ENGINE_MAX_CONCURRENT_KEYGEN")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> CertResult<()> {
        if !(MIN_RSA_KEY_BITS..=MAX_RSA_KEY_BITS).contains(&self.rsa_key_bits) {
            return Err(CertError::Configuration(format!(
                "RSA key size must be between {} and {} bits, got {}",
                MIN_RSA_KEY_BITS, MAX_RSA_KEY_BITS, self.rsa_key_bits
            )));
        }

        if self.rsa_key_bits % 8 != 0 {
            return Err(CertError::Configuration(format!(
                "RSA key size must be a multiple of 8, got {}",
                self.rsa_key_bits
            )));
        }

        if self.ca_validity_years == 0 || self.leaf_validity_years == 0 {
            return Err(CertError::Configuration(
                "Validity periods must be at least one year".to_string(),
            ));
        }

        if self.leaf_validity_years > self.ca_validity_years {
            return Err(CertError::Configuration(format!(
                "Leaf validity ({} years) cannot exceed CA validity ({} years)",
                self.leaf_validity_years, self.ca_validity_years
            )));
        }

        if matches!(self.max_concurrent_keygen, Some(0)) {
            return Err(CertError::Configuration(
                "max_concurrent_keygen must be greater than zero when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Validity in years for a CA (`true`) or leaf (`false`) certificate
    pub fn validity_years(&self, is_ca: bool) -> u32 {
        if is_ca {
            self.ca_validity_years
        } else {
            self.leaf_validity_years
        }
    }
}

fn env_parse<T>(name: &str) -> CertResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| CertError::Configuration(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(None),
    }
}
