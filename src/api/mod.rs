use std::sync::Arc;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::models::admission::UserInfo;
use crate::AppState;

pub mod admission;
pub mod handlers;

pub const REMOTE_USER_HEADER: &str = "x-remote-user";
pub const REMOTE_GROUP_HEADER: &str = "x-remote-group";

/// Gate API router: task registration plus the approval resource routes.
///
/// Registration is open; everything under `/approvals` requires a caller
/// identity.
pub fn api_router() -> Router<Arc<AppState>> {
    let approvals = Router::new()
        .route("/approvals", get(handlers::list_approvals))
        .route(
            "/approvals/:namespace/:name",
            get(handlers::get_approval)
                .put(handlers::update_approval)
                .delete(handlers::delete_approval),
        )
        .route(
            "/approvals/:namespace/:name/status",
            put(handlers::update_approval_status),
        )
        .route(
            "/approvals/:namespace/:name/decision",
            post(handlers::decide_approval),
        )
        .route_layer(middleware::from_fn(remote_user));

    Router::new()
        .route("/approval/", post(handlers::register))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .merge(approvals)
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
}

/// Admission webhook router: validating and mutating review endpoints.
pub fn webhook_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/validate-approvals", post(admission::validate))
        .route("/mutate-approvals", post(admission::mutate))
        .route("/healthz", get(handlers::healthz))
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Middleware: takes the caller identity from `X-Remote-User` (and any
/// `X-Remote-Group` values) set by the authenticating proxy in front of us.
async fn remote_user(mut req: Request, next: Next) -> Result<Response, AppError> {
    let username = req
        .headers()
        .get(REMOTE_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let Some(username) = username else {
        tracing::warn!("gate API: missing X-Remote-User header");
        return Err(AppError::MissingIdentity);
    };

    let groups = req
        .headers()
        .get_all(REMOTE_GROUP_HEADER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();

    req.extensions_mut().insert(UserInfo { username, groups });
    Ok(next.run(req).await)
}
