//! Drives the [`Reconciler`] from the store's change feed.
//!
//! Every change enqueues its key; workers reconcile keys independently, and a
//! failed pass is re-queued with per-key exponential back-off.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::models::gate::ObjectKey;
use crate::store::GateStore;

pub mod queue;
pub mod reconciler;

pub use queue::WorkQueue;
pub use reconciler::{Outcome, ReconcileError, Reconciler};

const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Delay before retry number `failures` (1-based).
pub fn backoff(failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(16);
    BACKOFF_BASE.saturating_mul(1u32 << exp).min(BACKOFF_MAX)
}

pub struct Controller {
    reconciler: Arc<Reconciler>,
    queue: Arc<WorkQueue>,
    failures: Arc<DashMap<ObjectKey, u32>>,
}

impl Controller {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            queue: Arc::new(WorkQueue::new()),
            failures: Arc::new(DashMap::new()),
        }
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        self.queue.clone()
    }

    /// Start the watch loop and `workers` reconcile loops. Existing objects
    /// are queued once up front.
    pub async fn spawn(
        &self,
        store: Arc<dyn GateStore>,
        workers: usize,
    ) -> anyhow::Result<Vec<JoinHandle<()>>> {
        // subscribe before listing so nothing written in between is missed
        let mut events = store.subscribe();
        for approval in store.list(None).await? {
            self.queue.add(approval.key());
        }

        let mut handles = Vec::with_capacity(workers + 1);

        let queue = self.queue.clone();
        let watch_store = store.clone();
        handles.push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => queue.add(event.key().clone()),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "watch lagged, re-queuing every approval");
                        match watch_store.list(None).await {
                            Ok(all) => all.iter().for_each(|a| queue.add(a.key())),
                            Err(e) => tracing::error!("relist after lag failed: {}", e),
                        }
                    }
                    Err(RecvError::Closed) => {
                        queue.shutdown();
                        break;
                    }
                }
            }
        }));

        for worker in 0..workers.max(1) {
            handles.push(self.spawn_worker(worker));
        }
        tracing::info!(workers = workers.max(1), "approval controller started");
        Ok(handles)
    }

    fn spawn_worker(&self, worker: usize) -> JoinHandle<()> {
        let queue = self.queue.clone();
        let reconciler = self.reconciler.clone();
        let failures = self.failures.clone();

        tokio::spawn(async move {
            while let Some(key) = queue.next().await {
                match reconciler.reconcile(&key).await {
                    Ok(outcome) => {
                        failures.remove(&key);
                        tracing::debug!(worker, %key, ?outcome, "reconcile finished");
                    }
                    Err(e) => {
                        let attempts = {
                            let mut entry = failures.entry(key.clone()).or_insert(0);
                            *entry += 1;
                            *entry
                        };
                        let delay = backoff(attempts);
                        tracing::warn!(
                            worker,
                            %key,
                            attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "reconcile failed, requeuing"
                        );
                        let queue = queue.clone();
                        let retry_key = key.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            queue.add(retry_key);
                        });
                    }
                }
                queue.done(&key);
            }
        })
    }
}
