//! Task side of the gate: register once, then wait for the decision.

pub mod host;
pub mod listener;
pub mod registrar;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;

use crate::config::WatcherConfig;
use crate::notification::RegistrationClient;
use listener::{ListenerState, ProcessExit};

/// Register this task and serve the decision listener until the process is
/// told to exit.
pub async fn run(cfg: WatcherConfig) -> anyhow::Result<()> {
    let users = host::read_users(&cfg.users_file)?;
    if users.is_empty() {
        anyhow::bail!("no approvers listed in {}", cfg.users_file.display());
    }

    let address: IpAddr = match &cfg.pod_ip {
        Some(ip) => ip
            .parse()
            .with_context(|| format!("POD_IP is not an IP address: {}", ip))?,
        None => host::local_ip()?,
    };
    let task_name = host::hostname(cfg.hostname.as_deref())?;

    // Bind before registering so a fast decision never hits a closed port.
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.listen_port));
    let tcp = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind decision listener on {}", addr))?;

    let msg = registrar::registration(&cfg, task_name, address, users);
    let client = RegistrationClient::new(&cfg.operator_url, cfg.request_timeout)?;
    registrar::register(&client, &msg).await?;

    let state = ListenerState::new(cfg.exit_delay, Arc::new(ProcessExit));
    let app = listener::router(&cfg.access_path, state);

    tracing::info!(%addr, path = %cfg.access_path, "waiting for approval decision");
    axum::serve(tcp, app).await?;
    Ok(())
}
