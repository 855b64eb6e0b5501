//! Cache orchestrator.
//!
//! Composes the local tier, the remote tier and the coalescers into the
//! read/write/invalidate operations used by the rest of the gateway. The
//! remote tier is authoritative; the local tier is a short-lived shadow.

use crate::coalescer::Coalescer;
use crate::local::LocalStore;
use crate::metrics::{CacheTier, MetricsSink, NoopMetricsSink};
use crate::pattern;
use crate::remote::{MeteredRemoteStore, RemoteCache, RemoteStore};
use crate::retry::RetryPolicy;
use nexus_config::AppConfig;
use nexus_core::NexusResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tunables for a [`CachingService`].
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// TTL used when a caller does not pass one.
    pub default_ttl: Duration,
    /// Width of the worker pool computing batch misses.
    pub pool_limit: usize,
    /// Upper bound on the TTL of empty batch results.
    pub process_ttl: Duration,
    /// Minimum interval between two local-tier sweeps.
    pub sweep_interval: Duration,
    /// Prefix applied to every remote key.
    pub namespace: Option<String>,
    /// Retry policy applied to each batch chunk.
    pub batch_retry: RetryPolicy,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(6),
            pool_limit: 10,
            process_ttl: Duration::from_secs(60),
            sweep_interval: crate::local::DEFAULT_SWEEP_INTERVAL,
            namespace: None,
            batch_retry: RetryPolicy::default(),
        }
    }
}

impl CacheSettings {
    /// Settings from the application configuration.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_ttl: config.caching.cache_ttl_default(),
            pool_limit: config.caching.pool_limit.max(1),
            process_ttl: Duration::from_secs(config.caching.process_ttl_secs),
            sweep_interval: config.caching.local_sweep_interval(),
            namespace: config.redis.key_namespace.clone(),
            batch_retry: RetryPolicy::default(),
        }
    }
}

/// Options for [`CachingService::get_or_set_with`].
#[derive(Debug, Clone, Copy)]
pub struct GetOrSetOptions {
    /// TTL of the remote copy. Zero skips the remote write.
    pub remote_ttl: Duration,
    /// TTL of the local copy; half of `remote_ttl` when unset. Zero skips
    /// the local write.
    pub local_ttl: Option<Duration>,
    /// Skip both lookups and recompute.
    pub force_refresh: bool,
}

impl GetOrSetOptions {
    /// Options with the given remote TTL and defaults otherwise.
    #[must_use]
    pub const fn new(remote_ttl: Duration) -> Self {
        Self {
            remote_ttl,
            local_ttl: None,
            force_refresh: false,
        }
    }

    /// Overrides the local TTL.
    #[must_use]
    pub const fn local_ttl(mut self, ttl: Duration) -> Self {
        self.local_ttl = Some(ttl);
        self
    }

    /// Forces recomputation.
    #[must_use]
    pub const fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    /// The remote TTL is unknown once a value is read back, so the local
    /// copy lives for half of it.
    #[must_use]
    pub fn effective_local_ttl(&self) -> Duration {
        self.local_ttl.unwrap_or(self.remote_ttl / 2)
    }
}

/// Two-tier cache orchestrator.
pub struct CachingService {
    pub(crate) local: Arc<LocalStore>,
    pub(crate) remote: RemoteCache,
    remote_gets: Coalescer<Option<String>>,
    computations: Coalescer<Value>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    pub(crate) settings: CacheSettings,
}

/// Parses a raw remote value and converts it to `T`.
pub(crate) fn decode<T: DeserializeOwned>(raw: &str) -> NexusResult<(Value, T)> {
    let value: Value = serde_json::from_str(raw)?;
    let typed = T::deserialize(&value)?;
    Ok((value, typed))
}

impl CachingService {
    /// Creates the orchestrator over a remote backend. Every backend call is
    /// timed through `metrics`.
    pub fn new(
        store: Arc<dyn RemoteStore>,
        settings: CacheSettings,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let metered: Arc<dyn RemoteStore> =
            Arc::new(MeteredRemoteStore::new(store, Arc::clone(&metrics)));

        Self {
            local: Arc::new(LocalStore::new(settings.sweep_interval)),
            remote: RemoteCache::new(metered, settings.namespace.clone()),
            remote_gets: Coalescer::new("remote_get", Arc::clone(&metrics)),
            computations: Coalescer::new("compute", Arc::clone(&metrics)),
            metrics,
            settings,
        }
    }

    /// Orchestrator with default settings and no metrics.
    pub fn with_defaults(store: Arc<dyn RemoteStore>) -> Self {
        Self::new(store, CacheSettings::default(), Arc::new(NoopMetricsSink))
    }

    /// Active settings.
    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Sink the orchestrator records into, for components layered on top.
    pub fn metrics(&self) -> Arc<dyn MetricsSink> {
        Arc::clone(&self.metrics)
    }

    /// Remote GET, coalesced per key.
    async fn get_remote_raw(&self, key: &str) -> NexusResult<Option<String>> {
        let remote = self.remote.clone();
        let owned_key = key.to_string();
        self.remote_gets
            .run_exclusive(key, move || async move { remote.get_raw(&owned_key).await })
            .await
    }

    /// Reads `key`, local tier first.
    ///
    /// A remote hit is copied into the local tier for half the default TTL.
    /// A value that no longer parses as `T` counts as a miss. Remote
    /// transport errors propagate.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> NexusResult<Option<T>> {
        if let Some(value) = self.get_local::<T>(key) {
            return Ok(Some(value));
        }

        let Some(raw) = self.get_remote_raw(key).await? else {
            debug!(key = %key, "Cache miss");
            self.metrics.record_miss();
            return Ok(None);
        };

        match decode::<T>(&raw) {
            Ok((value, typed)) => {
                debug!(key = %key, "Remote cache hit");
                self.metrics.record_hit(CacheTier::Remote);
                let local_ttl = self.settings.default_ttl / 2;
                if !local_ttl.is_zero() {
                    self.local.set(key, value, local_ttl);
                }
                Ok(Some(typed))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable remote value");
                self.metrics.record_miss();
                Ok(None)
            }
        }
    }

    /// Writes `value` to the local tier, then the remote tier.
    pub async fn set<T: Serialize + ?Sized + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> NexusResult<()> {
        let json = serde_json::to_value(value)?;
        if !ttl.is_zero() {
            self.local.set(key, json.clone(), ttl);
        }
        self.remote.set(key, &json, ttl).await
    }

    /// Writes `value` to the remote tier only.
    pub async fn set_remote<T: Serialize + ?Sized + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> NexusResult<()> {
        self.remote.set(key, value, ttl).await
    }

    /// [`get_or_set_with`](Self::get_or_set_with) with default options.
    pub async fn get_or_set<T, F, Fut>(
        &self,
        key: &str,
        producer: F,
        remote_ttl: Duration,
    ) -> NexusResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = NexusResult<T>> + Send + 'static,
    {
        self.get_or_set_with(key, producer, GetOrSetOptions::new(remote_ttl))
            .await
    }

    /// Returns the cached value for `key`, or computes it once with
    /// `producer` and writes it to both tiers.
    ///
    /// Concurrent callers for the same key share one `producer` run. A remote
    /// transport error is treated as a miss since `producer` can supply the
    /// value, and a transport error while writing the computed value back is
    /// logged. Every other error propagates.
    pub async fn get_or_set_with<T, F, Fut>(
        &self,
        key: &str,
        producer: F,
        options: GetOrSetOptions,
    ) -> NexusResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = NexusResult<T>> + Send + 'static,
    {
        let local_ttl = options.effective_local_ttl();
        let remote_ttl = options.remote_ttl;

        if !options.force_refresh {
            if let Some(value) = self.get_local::<T>(key) {
                return Ok(value);
            }

            match self.get_remote_raw(key).await {
                Ok(Some(raw)) => match decode::<T>(&raw) {
                    Ok((value, typed)) => {
                        debug!(key = %key, "Remote cache hit");
                        self.metrics.record_hit(CacheTier::Remote);
                        if !local_ttl.is_zero() {
                            self.local.set(key, value, local_ttl);
                        }
                        return Ok(typed);
                    }
                    Err(e) => warn!(key = %key, error = %e, "Discarding undecodable remote value"),
                },
                Ok(None) => {}
                Err(e) if e.is_transport() => {
                    warn!(key = %key, error = %e, "Remote cache unavailable, computing value");
                }
                Err(e) => return Err(e),
            }
        }

        debug!(key = %key, "Cache miss, computing value");
        self.metrics.record_miss();

        let local = Arc::clone(&self.local);
        let remote = self.remote.clone();
        let owned_key = key.to_string();

        let value = self
            .computations
            .run_exclusive(key, move || async move {
                let computed = serde_json::to_value(producer().await?)?;

                if !local_ttl.is_zero() {
                    local.set(&owned_key, computed.clone(), local_ttl);
                }
                match remote.set(&owned_key, &computed, remote_ttl).await {
                    Err(e) if e.is_transport() => {
                        warn!(key = %owned_key, error = %e, "Remote cache unavailable, value cached locally only");
                    }
                    result => result?,
                }

                Ok(computed)
            })
            .await?;

        Ok(T::deserialize(value)?)
    }

    /// Deletes `key` from both tiers and returns every key removed.
    ///
    /// A key containing `*` is expanded against both tiers first. Expansion
    /// and deletion are separate steps, so a matching key created in between
    /// can survive.
    pub async fn delete(&self, key: &str) -> NexusResult<Vec<String>> {
        if !pattern::is_pattern(key) {
            self.local.delete(key);
            self.remote.delete(key).await?;
            debug!(key = %key, "Deleted cache key");
            return Ok(vec![key.to_string()]);
        }

        let mut keys = self.remote.keys(key).await?;
        keys.extend(self.local.keys_matching(key));
        keys.sort();
        keys.dedup();

        for matched in &keys {
            self.local.delete(matched);
            self.remote.delete(matched).await?;
        }

        debug!(pattern = %key, count = keys.len(), "Deleted cache keys by pattern");
        Ok(keys)
    }

    /// Re-reads `key` from the remote tier into the local tier. When the
    /// remote value is gone or unreadable the local copy is dropped.
    pub async fn refresh_local(&self, key: &str, ttl: Duration) -> NexusResult<Option<Value>> {
        let raw = self.get_remote_raw(key).await?;

        let value = match raw.as_deref().map(serde_json::from_str::<Value>) {
            Some(Ok(value)) => Some(value),
            Some(Err(e)) => {
                warn!(key = %key, error = %e, "Discarding undecodable remote value");
                None
            }
            None => None,
        };

        match &value {
            Some(value) if !ttl.is_zero() => {
                self.local.set(key, value.clone(), ttl);
                debug!(key = %key, ttl_secs = ttl.as_secs(), "Refreshed local copy");
            }
            _ => {
                self.local.delete(key);
                debug!(key = %key, "Dropped local copy on refresh");
            }
        }

        Ok(value)
    }

    /// Local tier read, typed. A value that no longer parses as `T` is
    /// reported as absent.
    pub fn get_local<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.local.get(key)?;
        match T::deserialize(value) {
            Ok(typed) => {
                debug!(key = %key, "Local cache hit");
                self.metrics.record_hit(CacheTier::Local);
                Some(typed)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Local value has unexpected shape");
                None
            }
        }
    }

    /// Local tier write.
    pub fn set_local<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> NexusResult<()> {
        let json = serde_json::to_value(value)?;
        self.local.set(key, json, ttl);
        Ok(())
    }

    /// Local tier delete. Returns true if a copy was held.
    pub fn delete_local(&self, key: &str) -> bool {
        self.local.delete(key)
    }

    /// Local keys matching a glob pattern.
    pub fn local_keys(&self, pattern: &str) -> Vec<String> {
        self.local.keys_matching(pattern)
    }

    /// Remote keys matching a glob pattern.
    pub async fn keys(&self, pattern: &str) -> NexusResult<Vec<String>> {
        self.remote.keys(pattern).await
    }

    /// Clears both tiers.
    pub async fn flush(&self) -> NexusResult<()> {
        self.remote.flush().await?;
        self.local.clear();
        info!("Cache flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryRemoteStore;
    use nexus_core::NexusError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service() -> (Arc<InMemoryRemoteStore>, CachingService) {
        let store = Arc::new(InMemoryRemoteStore::new());
        let service = CachingService::with_defaults(store.clone());
        (store, service)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (_, cache) = service();
        cache.set("about", &json!({"network": "mainnet"}), Duration::from_secs(60)).await.unwrap();

        let value: Option<Value> = cache.get("about").await.unwrap();
        assert_eq!(value, Some(json!({"network": "mainnet"})));
    }

    #[tokio::test]
    async fn test_remote_hit_backfills_local() {
        let (store, cache) = service();
        store.set_raw("nodes", "[1,2,3]", Duration::from_secs(60)).await.unwrap();

        let value: Option<Vec<u32>> = cache.get("nodes").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));
        assert_eq!(cache.get_local::<Vec<u32>>("nodes"), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_corrupt_remote_value_is_a_miss() {
        let (store, cache) = service();
        store.set_raw("broken", "{not json", Duration::from_secs(60)).await.unwrap();

        let value: Option<Value> = cache.get("broken").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_get_or_set_computes_once_then_hits() {
        let (_, cache) = service();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value: u64 = cache
                .get_or_set(
                    "numShards",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(3)
                    },
                    Duration::from_secs(60),
                )
                .await
                .unwrap();
            assert_eq!(value, 3);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_set_zero_ttls_skip_both_tiers() {
        let (store, cache) = service();
        let value: String = cache
            .get_or_set_with(
                "uncached",
                || async { Ok("fresh".to_string()) },
                GetOrSetOptions::new(Duration::ZERO),
            )
            .await
            .unwrap();

        assert_eq!(value, "fresh");
        assert!(store.is_empty());
        assert_eq!(cache.get_local::<String>("uncached"), None);
    }

    #[tokio::test]
    async fn test_force_refresh_recomputes() {
        let (_, cache) = service();
        cache.set("currentPrice", &json!(10.5), Duration::from_secs(60)).await.unwrap();

        let value: f64 = cache
            .get_or_set_with(
                "currentPrice",
                || async { Ok(11.0) },
                GetOrSetOptions::new(Duration::from_secs(60)).force_refresh(),
            )
            .await
            .unwrap();

        assert!((value - 11.0).abs() < f64::EPSILON);
        assert_eq!(cache.get::<f64>("currentPrice").await.unwrap(), Some(11.0));
    }

    #[tokio::test]
    async fn test_producer_error_propagates_and_caches_nothing() {
        let (store, cache) = service();
        let result: NexusResult<u32> = cache
            .get_or_set(
                "economics",
                || async { Err(NexusError::upstream("gateway", "timeout")) },
                Duration::from_secs(60),
            )
            .await;

        assert_eq!(result.unwrap_err(), NexusError::upstream("gateway", "timeout"));
        assert!(store.is_empty());
    }

    /// Accepts reads but refuses every write with a non-transport error.
    struct ReadOnlyStore(InMemoryRemoteStore);

    #[async_trait::async_trait]
    impl RemoteStore for ReadOnlyStore {
        async fn get_raw(&self, key: &str) -> NexusResult<Option<String>> {
            self.0.get_raw(key).await
        }
        async fn mget_raw(&self, keys: &[String]) -> NexusResult<Vec<Option<String>>> {
            self.0.mget_raw(keys).await
        }
        async fn set_raw(&self, key: &str, _value: &str, _ttl: Duration) -> NexusResult<()> {
            Err(NexusError::Forbidden(format!("read-only replica, cannot write '{}'", key)))
        }
        async fn set_many_raw(&self, _entries: &[(String, String, Duration)]) -> NexusResult<()> {
            Err(NexusError::Forbidden("read-only replica".to_string()))
        }
        async fn delete(&self, key: &str) -> NexusResult<bool> {
            self.0.delete(key).await
        }
        async fn keys(&self, pattern: &str) -> NexusResult<Vec<String>> {
            self.0.keys(pattern).await
        }
        async fn flush(&self) -> NexusResult<()> {
            self.0.flush().await
        }
    }

    #[tokio::test]
    async fn test_get_or_set_propagates_rejected_write_back() {
        let cache = CachingService::with_defaults(Arc::new(ReadOnlyStore(InMemoryRemoteStore::new())));

        let result: NexusResult<u32> = cache
            .get_or_set("numShards", || async { Ok(3) }, Duration::from_secs(60))
            .await;

        assert!(matches!(result, Err(NexusError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_refresh_local_drops_copy_when_remote_absent() {
        let (_, cache) = service();
        cache.set_local("economics", &json!({"apr": 1}), Duration::from_secs(60)).unwrap();

        let refreshed = cache.refresh_local("economics", Duration::from_secs(60)).await.unwrap();

        assert_eq!(refreshed, None);
        assert_eq!(cache.get_local::<Value>("economics"), None);
    }

    #[tokio::test]
    async fn test_flush_clears_both_tiers() {
        let (store, cache) = service();
        cache.set("a", &1, Duration::from_secs(60)).await.unwrap();
        cache.set("b", &2, Duration::from_secs(60)).await.unwrap();

        cache.flush().await.unwrap();

        assert!(store.is_empty());
        assert!(cache.local_keys("*").is_empty());
    }

    #[test]
    fn test_local_ttl_defaults_to_half() {
        let options = GetOrSetOptions::new(Duration::from_secs(60));
        assert_eq!(options.effective_local_ttl(), Duration::from_secs(30));
        assert_eq!(
            options.local_ttl(Duration::from_secs(5)).effective_local_ttl(),
            Duration::from_secs(5)
        );
    }
}
