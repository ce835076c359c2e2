//! Task-side decision receiver.
//!
//! One route, one method: `PUT <access path>` with `{decision}`. A final
//! decision is acknowledged and the process is scheduled to exit after a
//! short delay, so the acknowledgment has time to flush.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::put;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::models::message::{DecisionAck, DecisionUpdate};

/// What happens when the decision is final.
pub trait Terminator: Send + Sync {
    fn terminate(&self, code: i32);
}

/// Ends the process.
pub struct ProcessExit;

impl Terminator for ProcessExit {
    fn terminate(&self, code: i32) {
        tracing::info!(code, "exiting");
        std::process::exit(code);
    }
}

#[derive(Clone)]
pub struct ListenerState {
    exit_delay: Duration,
    terminator: Arc<dyn Terminator>,
    scheduled: Arc<AtomicBool>,
}

impl ListenerState {
    pub fn new(exit_delay: Duration, terminator: Arc<dyn Terminator>) -> Self {
        Self {
            exit_delay,
            terminator,
            scheduled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the delayed exit. Only the first final decision schedules one;
    /// a re-delivered decision is acknowledged again but changes nothing.
    fn schedule_exit(&self, code: i32) {
        if self.scheduled.swap(true, Ordering::SeqCst) {
            tracing::debug!(code, "exit already scheduled");
            return;
        }
        let delay = self.exit_delay;
        let terminator = self.terminator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            terminator.terminate(code);
        });
    }
}

pub fn router(access_path: &str, state: ListenerState) -> Router {
    Router::new()
        .route(access_path, put(receive_decision))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn receive_decision(
    State(state): State<ListenerState>,
    payload: Result<Json<DecisionUpdate>, JsonRejection>,
) -> Result<Json<DecisionAck>, AppError> {
    let Json(update) = payload.map_err(|e| {
        tracing::warn!(error = %e.body_text(), "malformed decision payload");
        AppError::Decode(e.body_text())
    })?;

    let ack = DecisionAck::for_value(&update.decision);
    tracing::info!(decision = %update.decision, "Message: {}", ack.response);

    if let Some(code) = ack.exit_code() {
        state.schedule_exit(code);
    }
    Ok(Json(ack))
}
