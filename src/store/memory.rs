use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

use super::{GateStore, StoreError, WatchEvent};
use crate::models::gate::{Approval, ObjectKey};

const WATCH_CAPACITY: usize = 1024;

/// In-memory gate store with optimistic concurrency.
///
/// Versions come from one global counter, so a version is never reused even
/// across delete/re-create of the same key.
pub struct MemoryStore {
    objects: DashMap<ObjectKey, Approval>,
    version: AtomicU64,
    events: broadcast::Sender<WatchEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            objects: DashMap::new(),
            version: AtomicU64::new(0),
            events,
        }
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn notify(&self, event: WatchEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GateStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<Approval>, StoreError> {
        Ok(self.objects.get(key).map(|entry| entry.value().clone()))
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<Approval>, StoreError> {
        let mut items: Vec<Approval> = self
            .objects
            .iter()
            .filter(|entry| namespace.map_or(true, |ns| entry.key().namespace == ns))
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(items)
    }

    async fn create(&self, mut approval: Approval) -> Result<Approval, StoreError> {
        let key = approval.key();
        match self.objects.entry(key.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(key)),
            Entry::Vacant(slot) => {
                approval.metadata.uid = Some(uuid::Uuid::new_v4());
                approval.metadata.creation_timestamp = Some(chrono::Utc::now());
                approval.metadata.resource_version = self.next_version();
                slot.insert(approval.clone());
                self.notify(WatchEvent::Added(key));
                Ok(approval)
            }
        }
    }

    async fn replace(&self, mut approval: Approval) -> Result<Approval, StoreError> {
        let key = approval.key();
        {
            let mut stored = self
                .objects
                .get_mut(&key)
                .ok_or_else(|| StoreError::NotFound(key.clone()))?;

            let found = stored.metadata.resource_version;
            let expected = approval.metadata.resource_version;
            if found != expected {
                return Err(StoreError::Conflict {
                    key,
                    expected,
                    found,
                });
            }

            // identity fields are owned by the store
            approval.metadata.uid = stored.metadata.uid;
            approval.metadata.creation_timestamp = stored.metadata.creation_timestamp;
            approval.metadata.resource_version = self.next_version();
            *stored = approval.clone();
        }
        self.notify(WatchEvent::Modified(key));
        Ok(approval)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        if self.objects.remove(key).is_none() {
            return Err(StoreError::NotFound(key.clone()));
        }
        self.notify(WatchEvent::Deleted(key.clone()));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::gate::ApprovalSpec;

    fn approval(name: &str) -> Approval {
        Approval::new(&ObjectKey::new("ci", name), ApprovalSpec::default())
    }

    #[tokio::test]
    async fn test_create_assigns_identity_and_version() {
        let store = MemoryStore::new();
        let created = store.create(approval("a")).await.unwrap();
        assert!(created.metadata.uid.is_some());
        assert!(created.metadata.creation_timestamp.is_some());
        assert_eq!(created.metadata.resource_version, 1);

        let err = store.create(approval("a")).await.unwrap_err();
        assert_eq!(err, StoreError::AlreadyExists(ObjectKey::new("ci", "a")));
    }

    #[tokio::test]
    async fn test_replace_requires_current_version() {
        let store = MemoryStore::new();
        let created = store.create(approval("a")).await.unwrap();

        let mut first = created.clone();
        first.status.retry = 1;
        let updated = store.replace(first).await.unwrap();
        assert!(updated.metadata.resource_version > created.metadata.resource_version);

        let mut stale = created.clone();
        stale.status.retry = 2;
        let err = store.replace(stale).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let stored = store.get(&created.key()).await.unwrap().unwrap();
        assert_eq!(stored.status.retry, 1);
    }

    #[tokio::test]
    async fn test_replace_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.replace(approval("ghost")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_events_follow_writes() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();

        let created = store.create(approval("a")).await.unwrap();
        store.replace(created.clone()).await.unwrap();
        store.delete(&created.key()).await.unwrap();

        let key = created.key();
        assert_eq!(rx.recv().await.unwrap(), WatchEvent::Added(key.clone()));
        assert_eq!(rx.recv().await.unwrap(), WatchEvent::Modified(key.clone()));
        assert_eq!(rx.recv().await.unwrap(), WatchEvent::Deleted(key));
    }

    #[tokio::test]
    async fn test_list_filters_by_namespace() {
        let store = MemoryStore::new();
        store.create(approval("b")).await.unwrap();
        store.create(approval("a")).await.unwrap();
        store
            .create(Approval::new(&ObjectKey::new("prod", "c"), ApprovalSpec::default()))
            .await
            .unwrap();

        let ci = store.list(Some("ci")).await.unwrap();
        assert_eq!(ci.iter().map(|a| a.metadata.name.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(store.list(None).await.unwrap().len(), 3);
    }
}
