//! Approval gate: a task registers, approvers record decisions, the
//! coordinator tells the task when its gate is decided.
//!
//! The binary in `main.rs` wires these modules together; integration tests in
//! `tests/` drive them directly.

pub mod admission;
pub mod api;
pub mod certs;
pub mod config;
pub mod controller;
pub mod errors;
pub mod models;
pub mod notification;
pub mod store;
pub mod watcher;

use models::admission::UserInfo;
use store::api::GateApi;

/// Shared coordinator state passed to handlers.
pub struct AppState {
    pub api: GateApi,
    /// Identity the coordinator itself writes as (registration, status).
    pub operator: UserInfo,
}
