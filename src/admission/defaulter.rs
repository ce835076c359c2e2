//! Write defaulting: fills optional declared fields on create and approver
//! timestamps on update.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::patch;
use super::AdmissionError;
use crate::models::admission::{AdmissionRequest, Operation, PatchOperation};
use crate::models::gate::{
    Approval, ConditionType, DEFAULT_ACCESS_PATH, DEFAULT_PORT, DEFAULT_THRESHOLD,
};

/// Defaults applied when a gate is first created.
pub fn default_create(approval: &mut Approval, now: DateTime<Utc>) {
    let spec = &mut approval.spec;
    if spec.access_path.is_empty() {
        spec.access_path = DEFAULT_ACCESS_PATH.to_string();
    }
    if spec.port == 0 {
        spec.port = DEFAULT_PORT;
    }
    if spec.threshold == 0 {
        spec.threshold = DEFAULT_THRESHOLD;
    }
    if approval.status.conditions.is_empty() {
        approval.status.set_condition(ConditionType::Waiting, now);
    }
}

/// Defaults applied on every update: stamp approver records that carry no
/// timestamp yet. Existing timestamps are never touched.
pub fn default_update(approval: &mut Approval, now: DateTime<Utc>) {
    for approver in approval
        .status
        .approvers
        .iter_mut()
        .filter(|a| a.approved_time.is_none())
    {
        approver.approved_time = Some(now);
    }
}

/// Apply the defaults for `operation` in place.
pub fn apply(operation: Operation, approval: &mut Approval, now: DateTime<Utc>) {
    match operation {
        Operation::Create => default_create(approval, now),
        Operation::Update => default_update(approval, now),
        Operation::Delete | Operation::Connect => {}
    }
}

/// Admission entry point: decode the candidate, default it, and describe the
/// mutation as a JSON patch against the submitted object.
pub fn mutate(
    req: &AdmissionRequest,
    now: DateTime<Utc>,
) -> Result<Vec<PatchOperation>, AdmissionError> {
    let raw = req
        .object
        .as_ref()
        .ok_or_else(|| AdmissionError::Decode("request carries no object".into()))?;
    let mut approval: Approval =
        serde_json::from_value(raw.clone()).map_err(|e| AdmissionError::Decode(e.to_string()))?;

    apply(req.operation, &mut approval, now);

    let mutated =
        serde_json::to_value(&approval).map_err(|e| AdmissionError::Decode(e.to_string()))?;
    Ok(patch::diff(
        &mutable_parts(raw),
        &mutable_parts(&mutated),
    ))
}

/// Only `spec` and `status` are ever defaulted; metadata is left to the platform.
fn mutable_parts(object: &Value) -> Value {
    let mut parts = Map::new();
    for key in ["spec", "status"] {
        if let Some(v) = object.get(key) {
            parts.insert(key.to_string(), v.clone());
        }
    }
    Value::Object(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::admission::UserInfo;
    use crate::models::gate::{ApprovalSpec, Approver, ConditionStatus, Decision, ObjectKey};
    use chrono::TimeZone;
    use serde_json::json;

    fn bare() -> Approval {
        Approval::new(
            &ObjectKey::new("ci", "build-1"),
            ApprovalSpec {
                pod_ip: "10.0.0.1".into(),
                users: [("alice".to_string(), "a".to_string())].into(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_create_fills_missing_spec_fields_and_waiting() {
        let mut approval = bare();
        let now = Utc::now();
        default_create(&mut approval, now);

        assert_eq!(approval.spec.access_path, "/");
        assert_eq!(approval.spec.port, 10203);
        assert_eq!(approval.spec.threshold, 1);
        assert_eq!(approval.status.conditions.len(), 1);
        let cond = &approval.status.conditions[0];
        assert_eq!(cond.kind, ConditionType::Waiting);
        assert_eq!(cond.status, ConditionStatus::True);
        assert_eq!(cond.last_transition_time, Some(now));
    }

    #[test]
    fn test_create_keeps_explicit_values() {
        let mut approval = bare();
        approval.spec.access_path = "/hook".into();
        approval.spec.port = 8080;
        approval.spec.threshold = 3;
        default_create(&mut approval, Utc::now());

        assert_eq!(approval.spec.access_path, "/hook");
        assert_eq!(approval.spec.port, 8080);
        assert_eq!(approval.spec.threshold, 3);
    }

    #[test]
    fn test_update_stamps_only_unset_timestamps() {
        let earlier = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let now = Utc::now();
        let mut approval = bare();
        let mut stamped = Approver::new("alice", Decision::Approved);
        stamped.approved_time = Some(earlier);
        approval.status.approvers = vec![stamped, Approver::new("bob", Decision::Approved)];

        default_update(&mut approval, now);

        assert_eq!(approval.status.approvers[0].approved_time, Some(earlier));
        assert_eq!(approval.status.approvers[1].approved_time, Some(now));
        assert!(approval.spec.port == 0, "update never defaults the declared part");
    }

    #[test]
    fn test_mutate_emits_patch_for_create() {
        let req = AdmissionRequest {
            uid: "u1".into(),
            operation: Operation::Create,
            sub_resource: None,
            user_info: UserInfo::named("system:serviceaccount:approval-system:approval-operator"),
            object: Some(json!({
                "metadata": {"name": "build-1", "namespace": "ci"},
                "spec": {"podIP": "10.0.0.1", "users": {"alice": "a"}}
            })),
            old_object: None,
        };

        let ops = mutate(&req, Utc::now()).unwrap();
        let paths: Vec<String> = ops
            .iter()
            .map(|op| match op {
                PatchOperation::Add { path, .. }
                | PatchOperation::Replace { path, .. }
                | PatchOperation::Remove { path } => path.clone(),
            })
            .collect();

        assert!(paths.contains(&"/spec/accessPath".to_string()));
        assert!(paths.contains(&"/spec/port".to_string()));
        assert!(paths.contains(&"/spec/threshold".to_string()));
        assert!(paths.contains(&"/status".to_string()));
    }

    #[test]
    fn test_mutate_without_object_is_decode_error() {
        let req = AdmissionRequest {
            uid: "u2".into(),
            operation: Operation::Update,
            sub_resource: Some("status".into()),
            user_info: UserInfo::named("alice"),
            object: None,
            old_object: None,
        };
        assert!(matches!(mutate(&req, Utc::now()), Err(AdmissionError::Decode(_))));
    }
}
