use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::admission::AdmissionError;
use crate::models::gate::ObjectKey;
use crate::store::api::ApiError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("approval {0} not found")]
    NotFound(ObjectKey),

    #[error("approval {0} already exists")]
    AlreadyExists(ObjectKey),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("missing caller identity")]
    MissingIdentity,

    #[error("malformed payload: {0}")]
    Decode(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => AppError::NotFound(key),
            StoreError::AlreadyExists(key) => AppError::AlreadyExists(key),
            e @ StoreError::Conflict { .. } => AppError::Conflict(e.to_string()),
            StoreError::Unavailable(msg) => AppError::Unavailable(msg),
        }
    }
}

impl From<AdmissionError> for AppError {
    fn from(e: AdmissionError) -> Self {
        match e {
            AdmissionError::Invalid(msg) => AppError::Invalid(msg),
            AdmissionError::Unauthorized(msg) => AppError::Unauthorized(msg),
            AdmissionError::Decode(msg) => AppError::Decode(msg),
        }
    }
}

impl From<ApiError> for AppError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Admission(e) => e.into(),
            ApiError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                "approval_not_found",
                self.to_string(),
            ),
            AppError::AlreadyExists(_) => (
                StatusCode::CONFLICT,
                "conflict_error",
                "approval_exists",
                self.to_string(),
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                "conflict_error",
                "version_conflict",
                msg.clone(),
            ),
            AppError::Invalid(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "validation_failed",
                msg.clone(),
            ),
            AppError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                "permission_error",
                "not_permitted",
                msg.clone(),
            ),
            AppError::MissingIdentity => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "missing_identity",
                "missing X-Remote-User header".to_string(),
            ),
            AppError::Decode(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "malformed_payload",
                msg.clone(),
            ),
            AppError::Unavailable(msg) => {
                tracing::error!("Store unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "internal_error",
                    "store_unavailable",
                    "store unavailable".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
