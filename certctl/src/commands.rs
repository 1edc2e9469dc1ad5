use anyhow::{Context, Result};
use cert_engine::{
    codec, parse, BlockKind, CertificateAuthorityService, CertificateId, CertificateInfo,
    SubjectName,
};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a CA and write caCert.pem and privKey.key
    CreateCa {
        #[command(flatten)]
        subject: SubjectArgs,

        /// Directory for the package (created if missing)
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Issue a client certificate signed by an existing CA
    IssueClient {
        #[command(flatten)]
        ca: CaArgs,

        #[command(flatten)]
        subject: SubjectArgs,

        /// Output path for the signed certificate
        #[arg(long, default_value = "client.pem")]
        out_cert: PathBuf,

        /// Output path for the client private key
        #[arg(long, default_value = "client.key")]
        out_key: PathBuf,
    },

    /// Sign a PEM certificate request with an existing CA
    SignCsr {
        #[command(flatten)]
        ca: CaArgs,

        /// CSR file (CERTIFICATE REQUEST block)
        #[arg(long)]
        csr: PathBuf,

        /// Output path; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Report the PEM block type of a file and, for certificates and CSRs, their contents
    Inspect {
        file: PathBuf,
    },
}

/// Subject fields; empty ones are left out of the certificate
#[derive(Args, Debug, Default)]
pub struct SubjectArgs {
    /// Common name
    #[arg(long = "cn")]
    pub common_name: Option<String>,

    #[arg(long = "org")]
    pub organization: Option<String>,

    #[arg(long = "org-unit")]
    pub organizational_unit: Option<String>,

    #[arg(long)]
    pub country: Option<String>,

    #[arg(long)]
    pub state: Option<String>,

    #[arg(long)]
    pub city: Option<String>,

    #[arg(long = "street")]
    pub street_address: Option<String>,

    #[arg(long)]
    pub postal_code: Option<String>,

    /// Subject alternative name (DNS name or IP address), repeatable
    #[arg(long = "san")]
    pub sans: Vec<String>,
}

impl SubjectArgs {
    pub fn into_info(self) -> CertificateInfo {
        let subject = SubjectName {
            common_name: self.common_name.unwrap_or_default(),
            organization: self.organization.unwrap_or_default(),
            organizational_unit: self.organizational_unit.unwrap_or_default(),
            country: self.country.unwrap_or_default(),
            state: self.state.unwrap_or_default(),
            city: self.city.unwrap_or_default(),
            street_address: self.street_address.unwrap_or_default(),
            postal_code: self.postal_code.unwrap_or_default(),
        };
        CertificateInfo::new(subject).with_sans(self.sans)
    }
}

/// Signing CA given as a certificate and private key on disk
#[derive(Args, Debug)]
pub struct CaArgs {
    /// CA certificate (PEM)
    #[arg(long, env = "CERTCTL_CA_CERT")]
    pub ca_cert: PathBuf,

    /// CA private key (PKCS#1 or PKCS#8 PEM)
    #[arg(long, env = "CERTCTL_CA_KEY")]
    pub ca_key: PathBuf,
}

impl CaArgs {
    async fn import(&self, service: &CertificateAuthorityService) -> Result<CertificateId> {
        let cert = read_text(&self.ca_cert)?;
        let key = read_text(&self.ca_key)?;
        service
            .import(&cert, Some(&key))
            .await
            .with_context(|| format!("Failed to load CA from {}", self.ca_cert.display()))
    }
}

pub async fn run(command: Command) -> Result<()> {
    let service = CertificateAuthorityService::from_env()
        .context("Invalid CERT_ENGINE_* configuration")?;

    match command {
        Command::CreateCa { subject, out_dir } => create_ca(&service, subject, &out_dir).await,
        Command::IssueClient {
            ca,
            subject,
            out_cert,
            out_key,
        } => issue_client(&service, &ca, subject, &out_cert, &out_key).await,
        Command::SignCsr { ca, csr, out } => sign_csr(&service, &ca, &csr, out.as_deref()).await,
        Command::Inspect { file } => inspect(&service, &file).await,
    }
}

async fn create_ca(
    service: &CertificateAuthorityService,
    subject: SubjectArgs,
    out_dir: &Path,
) -> Result<()> {
    let id = service.create_ca(subject.into_info()).await?;
    let package = service.export_ca_package(id).await?;

    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    package
        .write_to_dir(out_dir)
        .with_context(|| format!("Failed to write CA package to {}", out_dir.display()))?;

    info!(dir = %out_dir.display(), "Wrote CA package");
    for (name, _) in package.entries() {
        println!("{}", out_dir.join(name).display());
    }
    Ok(())
}

async fn issue_client(
    service: &CertificateAuthorityService,
    ca: &CaArgs,
    subject: SubjectArgs,
    out_cert: &Path,
    out_key: &Path,
) -> Result<()> {
    let ca_id = ca.import(service).await?;
    let client_id = service.create_client_cert(subject.into_info()).await?;

    let signed = service.sign_with_ca(ca_id, client_id).await?;
    let key_pem = service.export_private_key(client_id).await?;

    write_text(out_cert, &signed.pem)?;
    write_text(out_key, &key_pem)?;

    info!(cert = %out_cert.display(), key = %out_key.display(), "Issued client certificate");
    println!("{}", out_cert.display());
    println!("{}", out_key.display());
    Ok(())
}

async fn sign_csr(
    service: &CertificateAuthorityService,
    ca: &CaArgs,
    csr: &Path,
    out: Option<&Path>,
) -> Result<()> {
    let ca_id = ca.import(service).await?;
    let request = read_text(csr)?;

    let (_, signed) = service
        .sign_from_csr(ca_id, &request)
        .await
        .with_context(|| format!("Failed to sign {}", csr.display()))?;

    match out {
        Some(path) => {
            write_text(path, &signed.pem)?;
            println!("{}", path.display());
        }
        None => print!("{}", signed.pem),
    }
    Ok(())
}

#[derive(Serialize)]
struct InspectReport<T: Serialize> {
    kind: BlockKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<T>,
}

async fn inspect(service: &CertificateAuthorityService, file: &Path) -> Result<()> {
    let text = read_text(file)?;
    let kind = codec::block_kind(&text)
        .with_context(|| format!("{} is not a PEM file", file.display()))?;

    let report = match kind {
        BlockKind::Certificate => {
            let id = service.import(&text, None).await?;
            let view = service.record_view(id).await?;
            serde_json::to_string_pretty(&InspectReport {
                kind,
                details: Some(view),
            })?
        }
        BlockKind::CertificateRequest => {
            let der = codec::decode_certificate_request(&text)?;
            let request = parse::parse_certificate_request(&der, true)?;
            serde_json::to_string_pretty(&InspectReport {
                kind,
                details: Some(request.info),
            })?
        }
        _ => serde_json::to_string_pretty(&InspectReport::<()> {
            kind,
            details: None,
        })?,
    };

    println!("{}", report);
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}
