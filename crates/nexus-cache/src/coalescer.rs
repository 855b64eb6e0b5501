//! Per-key request coalescing.
//!
//! At most one operation per key is in flight per process. Late callers join
//! the pending operation and all of them observe the same result, success or
//! failure. The operation runs on its own task, so a caller that stops
//! waiting does not cancel it for the others.

use crate::metrics::{MetricsSink, NoopMetricsSink};
use futures::future::{BoxFuture, FutureExt, Shared};
use nexus_core::{NexusError, NexusResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

type SharedResult<V> = Shared<BoxFuture<'static, NexusResult<V>>>;

struct Pending<V> {
    id: u64,
    future: SharedResult<V>,
}

type Registry<V> = Arc<Mutex<HashMap<String, Pending<V>>>>;

/// Removes a registration when its operation settles, including on panic.
struct Deregister<V> {
    registry: Registry<V>,
    key: String,
    id: u64,
}

impl<V> Drop for Deregister<V> {
    fn drop(&mut self) {
        let mut pending = self.registry.lock();
        if pending.get(&self.key).is_some_and(|p| p.id == self.id) {
            pending.remove(&self.key);
        }
    }
}

/// Registry of in-flight operations keyed by cache key.
pub struct Coalescer<V> {
    kind: &'static str,
    pending: Registry<V>,
    next_id: AtomicU64,
    metrics: Arc<dyn MetricsSink>,
}

impl<V> Coalescer<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a coalescer. `kind` labels coalesced-wait metrics.
    pub fn new(kind: &'static str, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            kind,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            metrics,
        }
    }

    /// Runs `producer` unless an operation for `key` is already in flight,
    /// in which case that operation's result is awaited instead.
    ///
    /// `producer` is called while the registry is locked and must only build
    /// the future; the work belongs inside it.
    pub async fn run_exclusive<F, Fut>(&self, key: &str, producer: F) -> NexusResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = NexusResult<V>> + Send + 'static,
    {
        let future = {
            let mut pending = self.pending.lock();

            if let Some(existing) = pending.get(key) {
                debug!(key = %key, kind = self.kind, "Joining in-flight operation");
                self.metrics.record_coalesced(self.kind);
                existing.future.clone()
            } else {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let guard = Deregister {
                    registry: Arc::clone(&self.pending),
                    key: key.to_string(),
                    id,
                };
                let operation = producer();

                let handle = tokio::spawn(async move {
                    let result = operation.await;
                    drop(guard);
                    result
                });

                let owned_key = key.to_string();
                let future = async move {
                    handle.await.map_err(|e| {
                        NexusError::Internal(format!("Operation for key '{}' aborted: {}", owned_key, e))
                    })?
                }
                .boxed()
                .shared();

                pending.insert(
                    key.to_string(),
                    Pending {
                        id,
                        future: future.clone(),
                    },
                );
                future
            }
        };

        future.await
    }

    /// Number of keys with an operation in flight.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

impl<V> Default for Coalescer<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new("operation", Arc::new(NoopMetricsSink))
    }
}
