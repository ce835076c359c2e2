//! Write validation and field-level authorization for gates.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

use super::diff::ApproverDiff;
use super::AdmissionError;
use crate::models::admission::{AdmissionRequest, Operation, UserInfo};
use crate::models::gate::{Approval, ApprovalSpec, Approver, Decision};

/// Decides whether a caller is the coordinator itself.
pub type PrivilegedPredicate = Arc<dyn Fn(&UserInfo) -> bool + Send + Sync>;

/// Predicate matching exactly one identity.
pub fn privileged_identity(identity: impl Into<String>) -> PrivilegedPredicate {
    let identity = identity.into();
    Arc::new(move |user: &UserInfo| user.username == identity)
}

/// Service-account identity of the coordinator, as the platform reports it.
pub fn service_account_identity(namespace: &str, service_account: &str) -> String {
    format!("system:serviceaccount:{}:{}", namespace, service_account)
}

#[derive(Clone)]
pub struct Validator {
    is_privileged: PrivilegedPredicate,
}

impl Validator {
    pub fn new(is_privileged: PrivilegedPredicate) -> Self {
        Self { is_privileged }
    }

    pub fn is_privileged(&self, user: &UserInfo) -> bool {
        (self.is_privileged)(user)
    }

    pub fn validate_create(&self, approval: &Approval) -> Result<(), AdmissionError> {
        validate_fields(approval)
    }

    /// Check a write against the stored object. `targets_status` tells whether
    /// the write is scoped to the observed part.
    pub fn validate_update(
        &self,
        approval: &Approval,
        old: &Approval,
        targets_status: bool,
        user: &UserInfo,
    ) -> Result<(), AdmissionError> {
        validate_fields(approval)?;

        if !targets_status {
            return Err(AdmissionError::Invalid(
                "updating spec field after creation is forbidden".into(),
            ));
        }

        if old.status.is_terminal() {
            return Err(AdmissionError::Invalid(
                "updating after rejected/approved is forbidden".into(),
            ));
        }

        self.authorize(approval, old, user)
    }

    /// Admission entry point.
    pub fn review(&self, req: &AdmissionRequest) -> Result<(), AdmissionError> {
        let approval = decode(req.object.as_ref(), "object")?;
        match req.operation {
            Operation::Create => self.validate_create(&approval),
            Operation::Update => {
                let old = decode(req.old_object.as_ref(), "oldObject")?;
                self.validate_update(&approval, &old, req.targets_status(), &req.user_info)
            }
            Operation::Delete | Operation::Connect => Ok(()),
        }
    }

    fn authorize(
        &self,
        approval: &Approval,
        old: &Approval,
        user: &UserInfo,
    ) -> Result<(), AdmissionError> {
        if self.is_privileged(user) {
            return Ok(());
        }

        let username = user.username.as_str();
        if !approval.spec.users.contains_key(username) {
            return Err(AdmissionError::Unauthorized(format!(
                "user({}) is not a requested approver",
                username
            )));
        }

        let status = &approval.status;
        let old_status = &old.status;

        if status.conditions != old_status.conditions {
            return Err(AdmissionError::Unauthorized(
                "only the operator can update 'conditions' field".into(),
            ));
        }

        if status.retry != old_status.retry {
            return Err(AdmissionError::Unauthorized(
                "only the operator can update 'retry' field".into(),
            ));
        }

        let diff = ApproverDiff::compute(&status.approvers, &old_status.approvers);
        if let Some(other) = diff.user_ids().find(|id| *id != username) {
            return Err(AdmissionError::Unauthorized(format!(
                "user({}) cannot alter another user's({}) decision",
                username, other
            )));
        }

        Ok(())
    }
}

fn decode(raw: Option<&serde_json::Value>, field: &str) -> Result<Approval, AdmissionError> {
    let raw = raw.ok_or_else(|| AdmissionError::Decode(format!("request carries no {}", field)))?;
    serde_json::from_value(raw.clone())
        .map_err(|e| AdmissionError::Decode(format!("unable to decode {}: {}", field, e)))
}

/// Value checks on the declared part plus approver records.
pub fn validate_fields(approval: &Approval) -> Result<(), AdmissionError> {
    validate_spec(&approval.spec)?;
    validate_approvers(&approval.status.approvers)
}

pub fn validate_access_path(path: &str) -> Result<(), AdmissionError> {
    if !path.starts_with('/') {
        return Err(AdmissionError::Invalid(format!(
            "access path({}) does not start with slash(/)",
            path
        )));
    }
    Ok(())
}

pub fn validate_spec(spec: &ApprovalSpec) -> Result<(), AdmissionError> {
    if !(1..=65535).contains(&spec.port) {
        return Err(AdmissionError::Invalid(format!(
            "port number({}) is not in range of 1-65535",
            spec.port
        )));
    }

    validate_access_path(&spec.access_path)?;

    if spec.pod_ip.parse::<IpAddr>().is_err() {
        return Err(AdmissionError::Invalid(format!(
            "podIP({}) is not valid IP",
            spec.pod_ip
        )));
    }

    if spec.users.is_empty() {
        return Err(AdmissionError::Invalid(
            "there should be one or more users specified".into(),
        ));
    }

    if spec.threshold < 1 || spec.threshold as usize > spec.users.len() {
        return Err(AdmissionError::Invalid(format!(
            "threshold({}) should be greater or equal to 1, less or equal to the length of users",
            spec.threshold
        )));
    }

    Ok(())
}

/// Each user decides at most once, and only Approved or Rejected is recordable.
fn validate_approvers(approvers: &[Approver]) -> Result<(), AdmissionError> {
    let mut seen = BTreeSet::new();
    for approver in approvers {
        if !matches!(approver.decision, Decision::Approved | Decision::Rejected) {
            return Err(AdmissionError::Invalid(format!(
                "user({}) decision({}) should be Approved or Rejected",
                approver.user_id, approver.decision
            )));
        }
        if !seen.insert(approver.user_id.as_str()) {
            return Err(AdmissionError::Invalid(format!(
                "duplicated user id({}) in 'status.approvers' field",
                approver.user_id
            )));
        }
    }
    Ok(())
}
