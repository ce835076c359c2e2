use std::path::PathBuf;

use clap::{Parser, Subcommand};

const DEFAULT_COORDINATOR: &str = "http://127.0.0.1:8080";

/// approval-gate: hold a task until enough people approve it
#[derive(Parser)]
#[command(name = "approval-gate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the coordinator: gate API, admission webhook and reconciler
    Serve {
        /// Gate API port (overrides APPROVAL_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run inside a task: register, then wait for the decision
    Watch,

    /// Generate webhook serving certificates into a directory
    Cert {
        #[arg(long, default_value = "/tmp/approval-webhook")]
        dir: PathBuf,
        #[arg(long, default_value = "approval-webhook")]
        service: String,
        #[arg(long, default_value = "default")]
        namespace: String,
        /// Also write the CA bundle to this file
        #[arg(long)]
        ca_out: Option<PathBuf>,
    },

    /// Approve a gate as the given user
    Approve(DecisionArgs),

    /// Reject a gate as the given user
    Reject(DecisionArgs),

    /// List gates
    List {
        #[arg(short, long)]
        namespace: Option<String>,
        #[arg(long, default_value = DEFAULT_COORDINATOR)]
        coordinator: String,
        #[arg(long, env = "APPROVAL_USER")]
        user: String,
    },
}

#[derive(clap::Args)]
pub struct DecisionArgs {
    /// Gate name (the task's host name)
    pub name: String,
    #[arg(short, long, default_value = "default")]
    pub namespace: String,
    /// Approver id, sent as X-Remote-User
    #[arg(long, env = "APPROVAL_USER")]
    pub user: String,
    #[arg(long, default_value = DEFAULT_COORDINATOR)]
    pub coordinator: String,
}
