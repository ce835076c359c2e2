//! The admission-guarded write path in front of a [`GateStore`].

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use super::{GateStore, StoreError};
use crate::admission::{defaulter, AdmissionError, Validator};
use crate::models::admission::UserInfo;
use crate::models::gate::{Approval, Approver, Decision, ObjectKey};

/// How many times a read-modify-write decision is retried on version conflict.
const DECISION_ATTEMPTS: usize = 5;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Store(StoreError::Conflict { .. }))
    }
}

/// Every write runs the defaulter, then the validator against the stored
/// object, then commits through a conditional replace.
#[derive(Clone)]
pub struct GateApi {
    store: Arc<dyn GateStore>,
    validator: Validator,
}

impl GateApi {
    pub fn new(store: Arc<dyn GateStore>, validator: Validator) -> Self {
        Self { store, validator }
    }

    pub fn store(&self) -> &Arc<dyn GateStore> {
        &self.store
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub async fn get(&self, key: &ObjectKey) -> Result<Option<Approval>, ApiError> {
        Ok(self.store.get(key).await?)
    }

    pub async fn list(&self, namespace: Option<&str>) -> Result<Vec<Approval>, ApiError> {
        Ok(self.store.list(namespace).await?)
    }

    pub async fn create(&self, approval: Approval, user: &UserInfo) -> Result<Approval, ApiError> {
        let mut candidate = approval;
        candidate.metadata.resource_version = 0;
        defaulter::default_create(&mut candidate, Utc::now());
        self.validator.validate_create(&candidate)?;

        let created = self.store.create(candidate).await?;
        tracing::info!(key = %created.key(), user = %user.username, "approval created");
        Ok(created)
    }

    /// Write to the declared part. The validator rejects these once the
    /// object exists.
    pub async fn update(&self, approval: Approval, user: &UserInfo) -> Result<Approval, ApiError> {
        let old = self.current(&approval).await?;
        let mut candidate = approval;
        candidate.status = old.status.clone();
        self.admit_update(candidate, &old, false, user).await
    }

    /// Write to the observed part. Declared fields in `approval` are ignored.
    pub async fn update_status(
        &self,
        approval: Approval,
        user: &UserInfo,
    ) -> Result<Approval, ApiError> {
        let old = self.current(&approval).await?;
        let mut candidate = approval;
        candidate.spec = old.spec.clone();
        self.admit_update(candidate, &old, true, user).await
    }

    /// Record `user`'s decision on their own approver entry, retrying on
    /// version conflicts.
    pub async fn decide(
        &self,
        key: &ObjectKey,
        user: &UserInfo,
        decision: Decision,
    ) -> Result<Approval, ApiError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut approval = self
                .store
                .get(key)
                .await?
                .ok_or_else(|| StoreError::NotFound(key.clone()))?;

            let approvers = &approval.status.approvers;
            match approvers.iter().position(|a| a.user_id == user.username) {
                Some(i) if approvers[i].decision == decision => return Ok(approval),
                Some(i) => {
                    let existing = &mut approval.status.approvers[i];
                    existing.decision = decision;
                    existing.approved_time = None;
                }
                None => approval
                    .status
                    .approvers
                    .push(Approver::new(user.username.clone(), decision)),
            }

            match self.update_status(approval, user).await {
                Err(e) if e.is_conflict() && attempt < DECISION_ATTEMPTS => {
                    tracing::debug!(%key, attempt, "decision write conflicted, retrying");
                }
                other => return other,
            }
        }
    }

    /// Only the coordinator removes gates; a gate lives as long as its task.
    pub async fn delete(&self, key: &ObjectKey, user: &UserInfo) -> Result<(), ApiError> {
        if !self.validator.is_privileged(user) {
            tracing::info!(%key, user = %user.username, "delete rejected");
            return Err(AdmissionError::Unauthorized(format!(
                "user({}) cannot delete approval {}",
                user.username, key
            ))
            .into());
        }
        self.store.delete(key).await?;
        tracing::info!(%key, user = %user.username, "approval deleted");
        Ok(())
    }

    /// Load the stored object a write is based on. A stale version is a
    /// conflict before any admission check runs.
    async fn current(&self, approval: &Approval) -> Result<Approval, ApiError> {
        let key = approval.key();
        let old = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;

        let expected = approval.metadata.resource_version;
        let found = old.metadata.resource_version;
        if expected != 0 && expected != found {
            return Err(StoreError::Conflict {
                key,
                expected,
                found,
            }
            .into());
        }
        Ok(old)
    }

    async fn admit_update(
        &self,
        mut candidate: Approval,
        old: &Approval,
        targets_status: bool,
        user: &UserInfo,
    ) -> Result<Approval, ApiError> {
        // an unset version means "whatever is stored now"
        candidate.metadata.resource_version = old.metadata.resource_version;
        defaulter::default_update(&mut candidate, Utc::now());

        if let Err(e) = self
            .validator
            .validate_update(&candidate, old, targets_status, user)
        {
            tracing::info!(key = %candidate.key(), user = %user.username, error = %e, "write rejected");
            return Err(e.into());
        }

        Ok(self.store.replace(candidate).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::privileged_identity;
    use crate::models::gate::{ApprovalSpec, ConditionType};
    use crate::store::memory::MemoryStore;

    const OPERATOR: &str = "operator";

    fn api() -> GateApi {
        GateApi::new(
            Arc::new(MemoryStore::new()),
            Validator::new(privileged_identity(OPERATOR)),
        )
    }

    fn request() -> Approval {
        Approval::new(
            &ObjectKey::new("ci", "build-7"),
            ApprovalSpec {
                pod_ip: "10.0.0.7".into(),
                users: [("alice".into(), "a".into()), ("bob".into(), "b".into())].into(),
                threshold: 2,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_create_defaults_then_validates() {
        let api = api();
        let created = api.create(request(), &UserInfo::named(OPERATOR)).await.unwrap();
        assert_eq!(created.spec.port, 10203);
        assert_eq!(created.spec.access_path, "/");
        assert_eq!(created.status.conditions[0].kind, ConditionType::Waiting);

        let mut bad = request();
        bad.metadata.name = "bad".into();
        bad.spec.threshold = 5;
        let err = api.create(bad, &UserInfo::named(OPERATOR)).await.unwrap_err();
        assert!(matches!(err, ApiError::Admission(AdmissionError::Invalid(_))));
        assert!(api.get(&ObjectKey::new("ci", "bad")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_spec_update_is_rejected_and_store_unchanged() {
        let api = api();
        let created = api.create(request(), &UserInfo::named(OPERATOR)).await.unwrap();

        let mut changed = created.clone();
        changed.spec.port = 9999;
        let err = api.update(changed, &UserInfo::named(OPERATOR)).await.unwrap_err();
        assert!(matches!(err, ApiError::Admission(AdmissionError::Invalid(_))));

        let stored = api.get(&created.key()).await.unwrap().unwrap();
        assert_eq!(stored, created);
    }

    #[tokio::test]
    async fn test_status_write_cannot_smuggle_spec_change() {
        let api = api();
        let created = api.create(request(), &UserInfo::named(OPERATOR)).await.unwrap();

        let mut sneaky = created.clone();
        sneaky.spec.threshold = 1;
        sneaky.status.approvers.push(Approver::new("alice", Decision::Approved));
        let stored = api.update_status(sneaky, &UserInfo::named("alice")).await.unwrap();

        assert_eq!(stored.spec.threshold, 2);
        assert!(stored.status.approvers[0].approved_time.is_some());
    }

    #[tokio::test]
    async fn test_stale_write_is_conflict() {
        let api = api();
        let created = api.create(request(), &UserInfo::named(OPERATOR)).await.unwrap();
        api.decide(&created.key(), &UserInfo::named("alice"), Decision::Approved)
            .await
            .unwrap();

        let mut stale = created.clone();
        stale.status.approvers.push(Approver::new("bob", Decision::Approved));
        let err = api.update_status(stale, &UserInfo::named("bob")).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_decide_is_idempotent_and_user_scoped() {
        let api = api();
        let created = api.create(request(), &UserInfo::named(OPERATOR)).await.unwrap();
        let key = created.key();

        let first = api.decide(&key, &UserInfo::named("alice"), Decision::Approved).await.unwrap();
        let again = api.decide(&key, &UserInfo::named("alice"), Decision::Approved).await.unwrap();
        assert_eq!(first.metadata.resource_version, again.metadata.resource_version);

        let err = api
            .decide(&key, &UserInfo::named("mallory"), Decision::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Admission(AdmissionError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_only_operator_deletes() {
        let api = api();
        let created = api.create(request(), &UserInfo::named(OPERATOR)).await.unwrap();
        let key = created.key();

        let err = api.delete(&key, &UserInfo::named("alice")).await.unwrap_err();
        assert!(matches!(err, ApiError::Admission(AdmissionError::Unauthorized(_))));
        assert!(api.get(&key).await.unwrap().is_some());

        api.delete(&key, &UserInfo::named(OPERATOR)).await.unwrap();
        assert!(api.get(&key).await.unwrap().is_none());
    }
}
