//! Storage and change delivery for gates.
//!
//! The surrounding control plane owns durable storage. [`GateStore`] is the
//! seam; [`memory::MemoryStore`] backs the standalone coordinator and tests.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::gate::{Approval, ObjectKey};

pub mod api;
pub mod memory;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("approval {0} not found")]
    NotFound(ObjectKey),

    #[error("approval {0} already exists")]
    AlreadyExists(ObjectKey),

    /// The write was based on a stale version. Re-read and retry.
    #[error("conflict on {key}: expected version {expected}, found {found}")]
    Conflict {
        key: ObjectKey,
        expected: u64,
        found: u64,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Added(ObjectKey),
    Modified(ObjectKey),
    Deleted(ObjectKey),
}

impl WatchEvent {
    pub fn key(&self) -> &ObjectKey {
        match self {
            WatchEvent::Added(k) | WatchEvent::Modified(k) | WatchEvent::Deleted(k) => k,
        }
    }
}

#[async_trait]
pub trait GateStore: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> Result<Option<Approval>, StoreError>;

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<Approval>, StoreError>;

    /// Insert a new object. Assigns uid, creation time and the first version.
    async fn create(&self, approval: Approval) -> Result<Approval, StoreError>;

    /// Conditional replace: succeeds only if the stored version equals
    /// `approval.metadata.resource_version`. Returns the stored object with its
    /// new version.
    async fn replace(&self, approval: Approval) -> Result<Approval, StoreError>;

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError>;

    /// Change feed. Every successful write produces one event.
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent>;
}
