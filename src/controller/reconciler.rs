//! The gate state machine.
//!
//! One pass per observed change:
//! 1. object gone → nothing to do
//! 2. no condition yet → mark Waiting and stop
//! 3. already Approved/Rejected → nothing to do
//! 4. any Rejected record → deliver Rejected, then record it
//! 5. approver count ≥ threshold → deliver Approved, then record it
//! 6. otherwise keep waiting
//!
//! Delivery happens before the status write. If the write fails the pass is
//! retried from the top and the task may see the same decision twice.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::models::admission::UserInfo;
use crate::models::gate::{Approval, ConditionStatus, ConditionType, Decision, ObjectKey};
use crate::notification::{DecisionSender, DeliveryError, DeliveryTarget};
use crate::store::api::{ApiError, GateApi};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to read approval: {0}")]
    Read(#[source] ApiError),

    #[error("failed to deliver {decision} decision: {source}")]
    Delivery {
        decision: Decision,
        #[source]
        source: DeliveryError,
    },

    #[error("failed to set {condition:?} status: {source}")]
    StatusWrite {
        condition: ConditionType,
        #[source]
        source: ApiError,
    },
}

impl ReconcileError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcileError::StatusWrite { source, .. } if source.is_conflict())
    }
}

/// What a single pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Absent,
    Initialized,
    AlreadyDecided,
    Decided(Decision),
    Pending,
}

pub struct Reconciler {
    api: GateApi,
    sender: Arc<dyn DecisionSender>,
    identity: UserInfo,
}

impl Reconciler {
    /// `identity` is the privileged caller the reconciler writes status as.
    pub fn new(api: GateApi, sender: Arc<dyn DecisionSender>, identity: UserInfo) -> Self {
        Self {
            api,
            sender,
            identity,
        }
    }

    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome, ReconcileError> {
        debug!(namespace = %key.namespace, name = %key.name, "reconciling approval");

        let Some(approval) = self.api.get(key).await.map_err(ReconcileError::Read)? else {
            debug!(%key, "approval is deleted");
            return Ok(Outcome::Absent);
        };

        if approval.status.conditions.is_empty() {
            info!(%key, "approval initialized, setting Waiting status");
            self.set_condition(approval, ConditionType::Waiting).await?;
            return Ok(Outcome::Initialized);
        }

        let decided = approval
            .status
            .conditions
            .iter()
            .any(|c| c.kind != ConditionType::Waiting && c.status == ConditionStatus::True);
        if decided {
            debug!(%key, "the approving process already ended");
            return Ok(Outcome::AlreadyDecided);
        }

        let decision = if approval.status.any_rejected() {
            Decision::Rejected
        } else if approval.status.approvals_meet(approval.spec.threshold) {
            Decision::Approved
        } else {
            debug!(
                %key,
                approvers = approval.status.approvers.len(),
                threshold = approval.spec.threshold,
                "waiting for more approvals"
            );
            return Ok(Outcome::Pending);
        };

        self.deliver(&approval, decision).await?;
        self.set_condition(approval, ConditionType::from(decision))
            .await?;
        info!(%key, %decision, "approval decided");
        Ok(Outcome::Decided(decision))
    }

    async fn deliver(&self, approval: &Approval, decision: Decision) -> Result<(), ReconcileError> {
        let target = DeliveryTarget::from_spec(&approval.spec)
            .map_err(|source| ReconcileError::Delivery { decision, source })?;
        self.sender
            .deliver(&target, decision)
            .await
            .map_err(|source| {
                error!(key = %approval.key(), %decision, error = %source, "failed to send decision to task");
                ReconcileError::Delivery { decision, source }
            })
    }

    async fn set_condition(
        &self,
        mut approval: Approval,
        condition: ConditionType,
    ) -> Result<Approval, ReconcileError> {
        let key = approval.key();
        approval.status.set_condition(condition, Utc::now());
        self.api
            .update_status(approval, &self.identity)
            .await
            .map_err(|source| {
                error!(%key, ?condition, error = %source, "failed to update status");
                ReconcileError::StatusWrite { condition, source }
            })
    }
}
