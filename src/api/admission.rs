//! Admission review endpoints. Every answer, including a refusal, is a
//! `200 OK` review; the verdict is inside it.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::Utc;

use crate::admission::{defaulter, AdmissionError};
use crate::models::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use crate::AppState;

/// POST /validate-approvals
pub async fn validate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AdmissionReview>, JsonRejection>,
) -> Json<AdmissionReview> {
    let response = match request(payload) {
        Ok(req) => match state.api.validator().review(&req) {
            Ok(()) => AdmissionResponse::allowed(&req.uid),
            Err(e) => {
                tracing::info!(
                    uid = %req.uid,
                    user = %req.user_info.username,
                    operation = ?req.operation,
                    error = %e,
                    "admission denied"
                );
                deny(&req.uid, e)
            }
        },
        Err(e) => deny("", e),
    };
    Json(AdmissionReview::respond(response))
}

/// POST /mutate-approvals
pub async fn mutate(
    payload: Result<Json<AdmissionReview>, JsonRejection>,
) -> Json<AdmissionReview> {
    let response = match request(payload) {
        Ok(req) => match defaulter::mutate(&req, Utc::now()) {
            Ok(ops) => match AdmissionResponse::patched(&req.uid, &ops) {
                Ok(resp) => {
                    tracing::debug!(uid = %req.uid, ops = ops.len(), "defaults applied");
                    resp
                }
                Err(e) => deny(&req.uid, AdmissionError::Decode(e.to_string())),
            },
            Err(e) => deny(&req.uid, e),
        },
        Err(e) => deny("", e),
    };
    Json(AdmissionReview::respond(response))
}

fn request(
    payload: Result<Json<AdmissionReview>, JsonRejection>,
) -> Result<AdmissionRequest, AdmissionError> {
    let Json(review) = payload.map_err(|e| {
        tracing::warn!("malformed admission review: {}", e.body_text());
        AdmissionError::Decode(e.body_text())
    })?;
    review
        .request
        .ok_or_else(|| AdmissionError::Decode("admission review carries no request".into()))
}

fn deny(uid: &str, e: AdmissionError) -> AdmissionResponse {
    AdmissionResponse::denied(uid, e.status_code().as_u16(), e.to_string())
}
