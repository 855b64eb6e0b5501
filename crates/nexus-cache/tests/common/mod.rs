//! Common test infrastructure for cache integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use nexus_cache::{
    CacheSettings, CachingService, InMemoryRemoteStore, InvalidationPolicies, InvalidationSubscriber,
    NoopMetricsSink, RemoteStore, RetryPolicy, TopicAliases,
};
use nexus_core::{NexusError, NexusResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Remote store that counts calls and can be switched to fail.
///
/// Wraps an [`InMemoryRemoteStore`], so two services built over clones of
/// the same `Arc` share one remote tier like two gateway instances sharing
/// a Redis server.
#[derive(Default)]
pub struct CountingRemoteStore {
    inner: InMemoryRemoteStore,
    pub gets: AtomicUsize,
    pub mgets: AtomicUsize,
    pub sets: AtomicUsize,
    failing: AtomicBool,
}

impl CountingRemoteStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every subsequent call fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst) + self.mgets.load(Ordering::SeqCst)
    }

    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    fn check(&self) -> NexusResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(NexusError::Cache("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for CountingRemoteStore {
    async fn get_raw(&self, key: &str) -> NexusResult<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.get_raw(key).await
    }

    async fn mget_raw(&self, keys: &[String]) -> NexusResult<Vec<Option<String>>> {
        self.mgets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.mget_raw(keys).await
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> NexusResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.set_raw(key, value, ttl).await
    }

    async fn set_many_raw(&self, entries: &[(String, String, Duration)]) -> NexusResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.set_many_raw(entries).await
    }

    async fn delete(&self, key: &str) -> NexusResult<bool> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn keys(&self, pattern: &str) -> NexusResult<Vec<String>> {
        self.check()?;
        self.inner.keys(pattern).await
    }

    async fn flush(&self) -> NexusResult<()> {
        self.check()?;
        self.inner.flush().await
    }
}

/// Settings with an immediate batch retry so failing tests do not sleep.
pub fn test_settings() -> CacheSettings {
    CacheSettings {
        batch_retry: RetryPolicy::immediate(1),
        ..CacheSettings::default()
    }
}

/// A gateway instance over `store`.
pub fn instance(store: &Arc<CountingRemoteStore>) -> Arc<CachingService> {
    instance_with(store, test_settings())
}

/// A gateway instance over `store` with explicit settings.
pub fn instance_with(store: &Arc<CountingRemoteStore>, settings: CacheSettings) -> Arc<CachingService> {
    let remote: Arc<dyn RemoteStore> = store.clone();
    Arc::new(CachingService::new(remote, settings, Arc::new(NoopMetricsSink)))
}

/// A subscriber for `cache` using the default hot-key table.
pub fn subscriber(cache: &Arc<CachingService>) -> Arc<InvalidationSubscriber> {
    Arc::new(InvalidationSubscriber::new(
        Arc::clone(cache),
        InvalidationPolicies::hot_keys(),
        TopicAliases::default(),
    ))
}
