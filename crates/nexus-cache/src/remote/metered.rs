//! Remote store decorator that times every round trip.

use super::RemoteStore;
use crate::metrics::MetricsSink;
use async_trait::async_trait;
use nexus_core::NexusResult;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Wraps any [`RemoteStore`] and reports each call's duration to a
/// [`MetricsSink`], successful or not.
pub struct MeteredRemoteStore {
    inner: Arc<dyn RemoteStore>,
    metrics: Arc<dyn MetricsSink>,
}

impl MeteredRemoteStore {
    /// Creates the decorator.
    pub fn new(inner: Arc<dyn RemoteStore>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { inner, metrics }
    }

    async fn timed<T, Fut>(&self, operation: &'static str, call: Fut) -> NexusResult<T>
    where
        Fut: Future<Output = NexusResult<T>>,
    {
        let start = Instant::now();
        let result = call.await;
        self.metrics.record_remote_operation(operation, start.elapsed());
        result
    }
}

#[async_trait]
impl RemoteStore for MeteredRemoteStore {
    async fn get_raw(&self, key: &str) -> NexusResult<Option<String>> {
        self.timed("get", self.inner.get_raw(key)).await
    }

    async fn mget_raw(&self, keys: &[String]) -> NexusResult<Vec<Option<String>>> {
        self.timed("mget", self.inner.mget_raw(keys)).await
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> NexusResult<()> {
        self.timed("set", self.inner.set_raw(key, value, ttl)).await
    }

    async fn set_many_raw(&self, entries: &[(String, String, Duration)]) -> NexusResult<()> {
        self.timed("multi_set", self.inner.set_many_raw(entries)).await
    }

    async fn delete(&self, key: &str) -> NexusResult<bool> {
        self.timed("del", self.inner.delete(key)).await
    }

    async fn keys(&self, pattern: &str) -> NexusResult<Vec<String>> {
        self.timed("keys", self.inner.keys(pattern)).await
    }

    async fn flush(&self) -> NexusResult<()> {
        self.timed("flushdb", self.inner.flush()).await
    }
}
