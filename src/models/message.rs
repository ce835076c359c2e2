//! Wire messages exchanged between a gated task and the coordinator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::gate::{ApprovalSpec, Decision};

pub const APPROVED_MESSAGE: &str = "Approval accepted. Exit the server.";
pub const REJECTED_MESSAGE: &str = "Reject accepted. Exit the server.";
pub const UNKNOWN_MESSAGE: &str = "Decision Unknown: ";

/// Task → coordinator: "create a gate for me".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationMessage {
    pub namespace: String,
    #[serde(alias = "podName")]
    pub task_name: String,
    #[serde(alias = "podIP")]
    pub address: String,
    pub access_path: String,
    pub port: i32,
    pub threshold: i32,
    pub users: BTreeMap<String, String>,
}

impl RegistrationMessage {
    pub fn to_spec(&self) -> ApprovalSpec {
        ApprovalSpec {
            pod_ip: self.address.clone(),
            access_path: self.access_path.clone(),
            port: self.port,
            threshold: self.threshold,
            users: self.users.clone(),
        }
    }
}

/// Coordinator → task: the final decision.
///
/// `decision` stays a raw string so the listener can echo back values it
/// does not understand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionUpdate {
    pub decision: String,
}

impl DecisionUpdate {
    pub fn new(decision: Decision) -> Self {
        Self {
            decision: decision.to_string(),
        }
    }
}

/// Task's acknowledgment of a [`DecisionUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionAck {
    pub decision: Decision,
    pub response: String,
}

impl DecisionAck {
    /// Build the acknowledgment for a received decision value.
    pub fn for_value(value: &str) -> Self {
        match Decision::parse(value) {
            Some(Decision::Approved) => Self {
                decision: Decision::Approved,
                response: APPROVED_MESSAGE.to_string(),
            },
            Some(Decision::Rejected) => Self {
                decision: Decision::Rejected,
                response: REJECTED_MESSAGE.to_string(),
            },
            _ => Self {
                decision: Decision::Unknown,
                response: format!("{}{}", UNKNOWN_MESSAGE, value),
            },
        }
    }

    /// Process exit code for a final decision, `None` when the task keeps running.
    pub fn exit_code(&self) -> Option<i32> {
        match self.decision {
            Decision::Approved => Some(0),
            Decision::Rejected => Some(1),
            Decision::Unknown => None,
        }
    }
}

/// Client-facing request to record the caller's own decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub decision: Decision,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_for_known_decisions() {
        let ack = DecisionAck::for_value("Approved");
        assert_eq!(ack.decision, Decision::Approved);
        assert_eq!(ack.response, APPROVED_MESSAGE);
        assert_eq!(ack.exit_code(), Some(0));

        let ack = DecisionAck::for_value("Rejected");
        assert_eq!(ack.response, REJECTED_MESSAGE);
        assert_eq!(ack.exit_code(), Some(1));
    }

    #[test]
    fn test_ack_for_unknown_value_names_it() {
        let ack = DecisionAck::for_value("Maybe");
        assert_eq!(ack.decision, Decision::Unknown);
        assert_eq!(ack.response, "Decision Unknown: Maybe");
        assert_eq!(ack.exit_code(), None);
    }

    #[test]
    fn test_registration_accepts_legacy_field_names() {
        let msg: RegistrationMessage = serde_json::from_value(serde_json::json!({
            "namespace": "ci",
            "podName": "build-42",
            "podIP": "10.1.2.3",
            "accessPath": "/",
            "port": 10203,
            "threshold": 1,
            "users": {"alice": "a"}
        }))
        .unwrap();
        assert_eq!(msg.task_name, "build-42");
        assert_eq!(msg.to_spec().pod_ip, "10.1.2.3");

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["taskName"], "build-42");
        assert_eq!(json["address"], "10.1.2.3");
    }
}
