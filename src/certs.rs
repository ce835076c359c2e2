//! Serving certificates for the admission webhook.
//!
//! A fresh CA signs one server certificate for the webhook service's DNS
//! names. Key and certificate go to the certificate directory; the CA bundle
//! goes wherever the platform expects it ([`CaBundleSink`]).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Datelike, Duration, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose,
};
use thiserror::Error;

pub const KEY_FILE: &str = "tls.key";
pub const CERT_FILE: &str = "tls.crt";

#[derive(Debug, Error)]
pub enum CertError {
    #[error("certificate generation failed: {0}")]
    Generate(#[from] rcgen::Error),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to publish CA bundle: {0}")]
    Publish(String),
}

/// PEM material for one webhook deployment.
#[derive(Debug, Clone)]
pub struct CertBundle {
    pub server_key_pem: String,
    pub server_cert_pem: String,
    pub ca_cert_pem: String,
}

/// The names the webhook service answers to inside the cluster.
pub fn service_dns_names(service: &str, namespace: &str) -> Vec<String> {
    vec![
        service.to_string(),
        format!("{}.{}", service, namespace),
        format!("{}.{}.svc", service, namespace),
        format!("{}.{}.svc.cluster.local", service, namespace),
    ]
}

pub fn create_certs(
    service: &str,
    namespace: &str,
    validity: Duration,
) -> Result<CertBundle, CertError> {
    let expires = Utc::now() + validity;
    let not_after = rcgen::date_time_ymd(expires.year(), expires.month() as u8, expires.day() as u8);
    let dns_names = service_dns_names(service, namespace);

    let mut ca_params = CertificateParams::new(dns_names.clone())?;
    ca_params
        .distinguished_name
        .push(DnType::CommonName, format!("{}.{}.svc", service, namespace));
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::CrlSign,
    ];
    ca_params.not_after = not_after;
    let ca_key = KeyPair::generate()?;
    let ca_cert = ca_params.self_signed(&ca_key)?;

    let mut server_params = CertificateParams::new(dns_names)?;
    server_params
        .distinguished_name
        .push(DnType::CommonName, format!("{}.{}.svc", service, namespace));
    server_params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    server_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    server_params.not_after = not_after;
    let server_key = KeyPair::generate()?;
    let server_cert = server_params.signed_by(&server_key, &ca_cert, &ca_key)?;

    Ok(CertBundle {
        server_key_pem: server_key.serialize_pem(),
        server_cert_pem: server_cert.pem(),
        ca_cert_pem: ca_cert.pem(),
    })
}

/// Write `tls.key` / `tls.crt` into `dir`, creating it if needed.
pub fn install(dir: &Path, bundle: &CertBundle) -> Result<(), CertError> {
    std::fs::create_dir_all(dir).map_err(|source| CertError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for (name, contents) in [
        (KEY_FILE, &bundle.server_key_pem),
        (CERT_FILE, &bundle.server_cert_pem),
    ] {
        let path = dir.join(name);
        std::fs::write(&path, contents).map_err(|source| CertError::Io { path, source })?;
    }
    Ok(())
}

/// Receives the CA bundle so the platform can trust the webhook.
#[async_trait]
pub trait CaBundleSink: Send + Sync {
    async fn publish(&self, ca_cert_pem: &str) -> Result<(), CertError>;
}

/// Sink for deployments where the webhook configuration is managed
/// elsewhere. Logs the bundle location and nothing else.
pub struct LogSink;

#[async_trait]
impl CaBundleSink for LogSink {
    async fn publish(&self, ca_cert_pem: &str) -> Result<(), CertError> {
        tracing::info!(
            bytes = ca_cert_pem.len(),
            "CA bundle generated; webhook configuration is managed externally"
        );
        Ok(())
    }
}

/// Writes the CA bundle next to the serving certificate as `ca.crt`.
pub struct FileSink {
    pub path: PathBuf,
}

#[async_trait]
impl CaBundleSink for FileSink {
    async fn publish(&self, ca_cert_pem: &str) -> Result<(), CertError> {
        tokio::fs::write(&self.path, ca_cert_pem)
            .await
            .map_err(|source| CertError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

/// Generate, install and publish in one go. Called once at coordinator startup.
pub async fn provision(
    dir: &Path,
    service: &str,
    namespace: &str,
    sink: &dyn CaBundleSink,
) -> Result<CertBundle, CertError> {
    let bundle = create_certs(service, namespace, Duration::days(365))?;
    install(dir, &bundle)?;
    sink.publish(&bundle.ca_cert_pem).await?;
    tracing::info!(dir = %dir.display(), service, namespace, "webhook certificates installed");
    Ok(bundle)
}
