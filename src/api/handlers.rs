use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::admission::UserInfo;
use crate::models::gate::{Approval, Decision, ObjectKey, OwnerReference};
use crate::models::message::{DecisionRequest, RegistrationMessage};
use crate::AppState;

/// Kind recorded on the owner reference of a registered gate.
pub const TASK_OWNER_KIND: &str = "Pod";

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub namespace: Option<String>,
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| AppError::Decode(e.body_text()))
}

/// POST /approval/: a task asks for a gate. Created as the operator, owned
/// by the task.
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegistrationMessage>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let msg = json_body(payload)?;
    if msg.namespace.is_empty() || msg.task_name.is_empty() {
        return Err(AppError::Invalid("namespace and task name are required".into()));
    }

    let key = ObjectKey::new(&msg.namespace, &msg.task_name);
    let mut approval = Approval::new(&key, msg.to_spec());
    approval.metadata.owner_references.push(OwnerReference {
        kind: TASK_OWNER_KIND.to_string(),
        name: msg.task_name.clone(),
    });

    state.api.create(approval, &state.operator).await?;
    tracing::info!(%key, threshold = msg.threshold, "registered approval");

    Ok((StatusCode::CREATED, Json(msg)))
}

/// GET /approvals[?namespace=]
pub async fn list_approvals(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Approval>>, AppError> {
    let approvals = state.api.list(params.namespace.as_deref()).await?;
    Ok(Json(approvals))
}

/// GET /approvals/:namespace/:name
pub async fn get_approval(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Approval>, AppError> {
    let key = ObjectKey::new(namespace, name);
    state
        .api
        .get(&key)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound(key))
}

/// PUT /approvals/:namespace/:name: write to the declared part.
pub async fn update_approval(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    Extension(user): Extension<UserInfo>,
    payload: Result<Json<Approval>, JsonRejection>,
) -> Result<Json<Approval>, AppError> {
    let approval = addressed(json_body(payload)?, namespace, name)?;
    let updated = state.api.update(approval, &user).await?;
    Ok(Json(updated))
}

/// PUT /approvals/:namespace/:name/status: write to the observed part.
pub async fn update_approval_status(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    Extension(user): Extension<UserInfo>,
    payload: Result<Json<Approval>, JsonRejection>,
) -> Result<Json<Approval>, AppError> {
    let approval = addressed(json_body(payload)?, namespace, name)?;
    let updated = state.api.update_status(approval, &user).await?;
    Ok(Json(updated))
}

/// POST /approvals/:namespace/:name/decision: record the caller's own decision.
pub async fn decide_approval(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    Extension(user): Extension<UserInfo>,
    payload: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<Approval>, AppError> {
    let req = json_body(payload)?;
    if req.decision == Decision::Unknown {
        return Err(AppError::Invalid(
            "decision must be Approved or Rejected".into(),
        ));
    }

    let key = ObjectKey::new(namespace, name);
    tracing::info!(%key, user = %user.username, decision = %req.decision, "recording decision");
    let updated = state.api.decide(&key, &user, req.decision).await?;
    Ok(Json(updated))
}

/// DELETE /approvals/:namespace/:name
pub async fn delete_approval(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    Extension(user): Extension<UserInfo>,
) -> Result<StatusCode, AppError> {
    state
        .api
        .delete(&ObjectKey::new(namespace, name), &user)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn healthz() -> &'static str {
    "ok"
}

/// Ready once the store answers.
pub async fn readyz(State(state): State<Arc<AppState>>) -> Result<&'static str, AppError> {
    state.api.list(None).await?;
    Ok("ready")
}

/// The path names the object; a body naming a different one is refused.
fn addressed(mut approval: Approval, namespace: String, name: String) -> Result<Approval, AppError> {
    let meta = &mut approval.metadata;
    if (!meta.namespace.is_empty() && meta.namespace != namespace)
        || (!meta.name.is_empty() && meta.name != name)
    {
        return Err(AppError::Invalid(format!(
            "body names {}/{} but path names {}/{}",
            meta.namespace, meta.name, namespace, name
        )));
    }
    meta.namespace = namespace;
    meta.name = name;
    Ok(approval)
}
