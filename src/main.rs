use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use approval_gate::admission::{privileged_identity, Validator};
use approval_gate::certs::{self, CaBundleSink, FileSink, LogSink};
use approval_gate::config;
use approval_gate::controller::{Controller, Reconciler};
use approval_gate::models::admission::UserInfo;
use approval_gate::models::gate::{Approval, ConditionType, Decision};
use approval_gate::models::message::DecisionRequest;
use approval_gate::notification::HttpDecisionClient;
use approval_gate::store::api::GateApi;
use approval_gate::store::memory::MemoryStore;
use approval_gate::store::GateStore;
use approval_gate::{api, watcher, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "approval-gate"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "approval_gate=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let mut cfg = config::load_coordinator()?;
            if let Some(port) = port {
                cfg.port = port;
            }
            run_server(cfg).await
        }
        None => run_server(config::load_coordinator()?).await,
        Some(cli::Commands::Watch) => watcher::run(config::load_watcher()?).await,
        Some(cli::Commands::Cert {
            dir,
            service,
            namespace,
            ca_out,
        }) => {
            let sink: Box<dyn CaBundleSink> = match ca_out {
                Some(path) => Box::new(FileSink { path }),
                None => Box::new(LogSink),
            };
            certs::provision(&dir, &service, &namespace, sink.as_ref()).await?;
            println!("Certificates written to {}", dir.display());
            Ok(())
        }
        Some(cli::Commands::Approve(args)) => decide(args, Decision::Approved).await,
        Some(cli::Commands::Reject(args)) => decide(args, Decision::Rejected).await,
        Some(cli::Commands::List {
            namespace,
            coordinator,
            user,
        }) => list(&coordinator, namespace.as_deref(), &user).await,
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::CoordinatorConfig) -> anyhow::Result<()> {
    tracing::info!(dir = %cfg.cert_dir.display(), "Provisioning webhook certificates...");
    certs::provision(
        &cfg.cert_dir,
        &cfg.webhook_service_name,
        &cfg.namespace,
        &LogSink,
    )
    .await
    .context("failed to provision webhook certificates")?;

    let operator = UserInfo::named(cfg.privileged_identity());
    tracing::info!(identity = %operator.username, "privileged identity");

    let store: Arc<dyn GateStore> = Arc::new(MemoryStore::new());
    let gate_api = GateApi::new(
        store.clone(),
        Validator::new(privileged_identity(operator.username.clone())),
    );
    let sender = Arc::new(
        HttpDecisionClient::new(cfg.delivery_timeout).context("failed to build delivery client")?,
    );

    let controller = Controller::new(Reconciler::new(gate_api.clone(), sender, operator.clone()));
    controller.spawn(store, cfg.reconcile_workers).await?;

    let state = Arc::new(AppState {
        api: gate_api,
        operator,
    });

    let api_app = api::api_router().with_state(state.clone());
    let webhook_app = api::webhook_router().with_state(state);

    let api_addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let webhook_addr = SocketAddr::from(([0, 0, 0, 0], cfg.webhook_port));
    let api_listener = tokio::net::TcpListener::bind(api_addr)
        .await
        .with_context(|| format!("failed to bind gate API on {}", api_addr))?;
    let webhook_listener = tokio::net::TcpListener::bind(webhook_addr)
        .await
        .with_context(|| format!("failed to bind admission webhook on {}", webhook_addr))?;

    tracing::info!("Gate API listening on {}", api_addr);
    tracing::info!("Admission webhook listening on {}", webhook_addr);

    tokio::try_join!(
        async { axum::serve(api_listener, api_app).await },
        async { axum::serve(webhook_listener, webhook_app).await },
    )?;
    Ok(())
}

fn coordinator_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent("approval-gate/1.0")
        .build()?)
}

async fn decide(args: cli::DecisionArgs, decision: Decision) -> anyhow::Result<()> {
    let url = format!(
        "{}/approvals/{}/{}/decision",
        args.coordinator.trim_end_matches('/'),
        args.namespace,
        args.name
    );
    let resp = coordinator_client()?
        .post(&url)
        .header(api::REMOTE_USER_HEADER, &args.user)
        .json(&DecisionRequest { decision })
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("coordinator refused the decision ({}): {}", status, body);
    }

    let approval: Approval = resp.json().await?;
    println!(
        "Approval {}/{}: {} recorded for {} ({})",
        args.namespace,
        args.name,
        decision,
        args.user,
        state_of(&approval)
    );
    Ok(())
}

async fn list(coordinator: &str, namespace: Option<&str>, user: &str) -> anyhow::Result<()> {
    let url = format!("{}/approvals", coordinator.trim_end_matches('/'));
    let mut req = coordinator_client()?
        .get(&url)
        .header(api::REMOTE_USER_HEADER, user);
    if let Some(ns) = namespace {
        req = req.query(&[("namespace", ns)]);
    }
    let resp = req
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("coordinator refused the listing ({}): {}", status, body);
    }

    let approvals: Vec<Approval> = resp.json().await?;
    if approvals.is_empty() {
        println!("No approvals.");
        return Ok(());
    }

    println!(
        "{:<20} {:<30} {:<10} {:<10} CREATED",
        "NAMESPACE", "NAME", "STATE", "APPROVALS"
    );
    for a in approvals {
        let approved = a
            .status
            .approvers
            .iter()
            .filter(|r| r.decision == Decision::Approved)
            .count();
        let created = a
            .metadata
            .creation_timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        println!(
            "{:<20} {:<30} {:<10} {:<10} {}",
            a.metadata.namespace,
            a.metadata.name,
            state_of(&a),
            format!("{}/{}", approved, a.spec.threshold),
            created
        );
    }
    Ok(())
}

fn state_of(approval: &Approval) -> &'static str {
    match approval.status.conditions.first().map(|c| c.kind) {
        Some(ConditionType::Approved) => "Approved",
        Some(ConditionType::Rejected) => "Rejected",
        Some(ConditionType::Waiting) => "Waiting",
        None => "Pending",
    }
}
