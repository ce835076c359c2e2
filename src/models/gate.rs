use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default port the task-side listener binds.
pub const DEFAULT_PORT: i32 = 10203;
/// Default path the task-side listener serves decisions on.
pub const DEFAULT_ACCESS_PATH: &str = "/";
pub const DEFAULT_THRESHOLD: i32 = 1;

/// Namespace + name pair identifying one gate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The task that registered a gate. Deleting the task is what eventually
/// removes the gate; the coordinator only records the reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,
    /// Version token for conditional writes. `0` means "never stored".
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

/// One approval request: what the task declared, and what has been observed since.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ApprovalSpec,
    #[serde(default)]
    pub status: ApprovalStatus,
}

impl Approval {
    pub fn new(key: &ObjectKey, spec: ApprovalSpec) -> Self {
        Self {
            metadata: ObjectMeta {
                name: key.name.clone(),
                namespace: key.namespace.clone(),
                ..Default::default()
            },
            spec,
            status: ApprovalStatus::default(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.metadata.namespace, &self.metadata.name)
    }
}

/// Declared part. Immutable once created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalSpec {
    #[serde(rename = "podIP", default)]
    pub pod_ip: String,
    #[serde(default)]
    pub access_path: String,
    #[serde(default)]
    pub port: i32,
    #[serde(default)]
    pub threshold: i32,
    /// user-id -> opaque label
    #[serde(default)]
    pub users: BTreeMap<String, String>,
}

/// Observed part. Written by the coordinator and, per-record, by approvers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub approvers: Vec<Approver>,
    #[serde(default)]
    pub retry: i32,
}

impl ApprovalStatus {
    /// Replace the condition list with a single fresh `True` entry.
    /// Only the latest transition is kept.
    pub fn set_condition(&mut self, kind: ConditionType, now: DateTime<Utc>) {
        self.conditions = vec![Condition::new(kind, ConditionStatus::True, now)];
    }

    /// True once the gate carries a `True` Approved or Rejected condition.
    pub fn is_terminal(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.kind.is_terminal() && c.is_true())
    }

    pub fn any_rejected(&self) -> bool {
        self.approvers
            .iter()
            .any(|a| a.decision == Decision::Rejected)
    }

    /// Quorum check: Approved records against the threshold. Records with
    /// any other decision never count.
    pub fn approvals_meet(&self, threshold: i32) -> bool {
        let approved = self
            .approvers
            .iter()
            .filter(|a| a.decision == Decision::Approved)
            .count();
        approved as i64 >= i64::from(threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approver {
    pub user_id: String,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_time: Option<DateTime<Utc>>,
}

impl Approver {
    pub fn new(user_id: impl Into<String>, decision: Decision) -> Self {
        Self {
            user_id: user_id.into(),
            decision,
            approved_time: None,
        }
    }
}

/// An approver's verdict, and the value carried by a decision delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Approved,
    Rejected,
    Unknown,
}

impl Decision {
    /// Parse a wire value. Returns `None` for anything other than the
    /// three known spellings.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Approved" => Some(Decision::Approved),
            "Rejected" => Some(Decision::Rejected),
            "Unknown" => Some(Decision::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "Approved",
            Decision::Rejected => "Rejected",
            Decision::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Waiting,
    Approved,
    Rejected,
}

impl ConditionType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConditionType::Approved | ConditionType::Rejected)
    }
}

impl From<Decision> for ConditionType {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => ConditionType::Approved,
            Decision::Rejected => ConditionType::Rejected,
            Decision::Unknown => ConditionType::Waiting,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionType,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Condition {
    pub fn new(kind: ConditionType, status: ConditionStatus, now: DateTime<Utc>) -> Self {
        Self {
            kind,
            status,
            last_transition_time: Some(now),
            reason: String::new(),
            message: String::new(),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}
