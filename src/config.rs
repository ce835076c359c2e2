use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

pub const SERVICE_ACCOUNT_NAMESPACE_FILE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

pub const DEFAULT_OPERATOR_URL: &str =
    "http://approval-operator.approval-system.svc.cluster.local:8080/approval/";

/// Coordinator settings: gate API, admission webhook, reconciler.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub port: u16,
    /// Set via WEBHOOK_PORT. Default: 443.
    pub webhook_port: u16,
    pub webhook_service_name: String,
    pub namespace: String,
    /// Service account the coordinator runs as. Its identity is the only
    /// privileged caller.
    pub service_account: String,
    pub cert_dir: PathBuf,
    pub delivery_timeout: Duration,
    pub reconcile_workers: usize,
}

impl CoordinatorConfig {
    pub fn privileged_identity(&self) -> String {
        crate::admission::validator::service_account_identity(
            &self.namespace,
            &self.service_account,
        )
    }
}

/// Task-side settings: registration and decision listener.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub operator_url: String,
    pub threshold: i32,
    pub users_file: PathBuf,
    pub listen_port: u16,
    pub access_path: String,
    pub exit_delay: Duration,
    pub namespace: String,
    pub pod_ip: Option<String>,
    pub hostname: Option<String>,
    pub request_timeout: Duration,
}

pub fn load_coordinator() -> anyhow::Result<CoordinatorConfig> {
    dotenvy::dotenv().ok();

    Ok(CoordinatorConfig {
        port: std::env::var("APPROVAL_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080),
        webhook_port: parse_strict("WEBHOOK_PORT", 443)?,
        webhook_service_name: std::env::var("WEBHOOK_SERVICE_NAME")
            .unwrap_or_else(|_| "approval-webhook".into()),
        namespace: namespace(Path::new(SERVICE_ACCOUNT_NAMESPACE_FILE))?,
        service_account: std::env::var("OPERATOR_SERVICE_ACCOUNT")
            .unwrap_or_else(|_| "approval-operator".into()),
        cert_dir: std::env::var("CERT_DIR")
            .unwrap_or_else(|_| "/tmp/approval-webhook".into())
            .into(),
        delivery_timeout: Duration::from_secs(
            std::env::var("DELIVERY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        ),
        reconcile_workers: std::env::var("RECONCILE_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4),
    })
}

pub fn load_watcher() -> anyhow::Result<WatcherConfig> {
    dotenvy::dotenv().ok();

    let threshold = parse_strict("THRESHOLD", crate::models::gate::DEFAULT_THRESHOLD)?;
    if threshold < 1 {
        anyhow::bail!("wrong threshold: {}", threshold);
    }

    let access_path = std::env::var("ACCESS_PATH")
        .unwrap_or_else(|_| crate::models::gate::DEFAULT_ACCESS_PATH.into());
    crate::admission::validator::validate_access_path(&access_path)
        .context("invalid ACCESS_PATH")?;

    Ok(WatcherConfig {
        operator_url: std::env::var("OPERATOR_URL").unwrap_or_else(|_| DEFAULT_OPERATOR_URL.into()),
        threshold,
        users_file: std::env::var("USERS_FILE")
            .unwrap_or_else(|_| "/tmp/config/users".into())
            .into(),
        listen_port: std::env::var("LISTEN_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(crate::models::gate::DEFAULT_PORT as u16),
        access_path,
        exit_delay: Duration::from_secs(
            std::env::var("EXIT_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        ),
        namespace: namespace(Path::new(SERVICE_ACCOUNT_NAMESPACE_FILE))?,
        pod_ip: std::env::var("POD_IP").ok().filter(|v| !v.is_empty()),
        hostname: std::env::var("HOSTNAME").ok().filter(|v| !v.is_empty()),
        request_timeout: Duration::from_secs(30),
    })
}

/// Namespace this process runs in: the service-account file when running in
/// a cluster, else `NAMESPACE`, else `default`.
pub fn namespace(sa_file: &Path) -> anyhow::Result<String> {
    if sa_file.exists() {
        let ns = std::fs::read_to_string(sa_file)
            .with_context(|| format!("could not read file {}", sa_file.display()))?;
        return Ok(ns.trim().to_string());
    }
    Ok(std::env::var("NAMESPACE")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "default".into()))
}

/// Parse an env var, falling back to `default` only when it is unset.
/// A set-but-invalid value is an error.
fn parse_strict<T>(var: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(var) {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .with_context(|| format!("cannot parse {}={}", var, raw)),
        _ => Ok(default),
    }
}
