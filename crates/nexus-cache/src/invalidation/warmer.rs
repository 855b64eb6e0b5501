//! Proactive cache population.
//!
//! A warmer recomputes a value ahead of expiry, writes it to both tiers and
//! asks every other instance to re-read it, so readers never see a miss.

use super::publisher::InvalidationPublisher;
use crate::keys::CacheInfo;
use crate::service::CachingService;
use nexus_core::NexusResult;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Writes fresh values and broadcasts a refresh for them.
#[derive(Clone)]
pub struct CacheWarmer {
    cache: Arc<CachingService>,
    publisher: InvalidationPublisher,
}

impl CacheWarmer {
    /// Creates a warmer writing through `cache` and announcing on `publisher`.
    pub fn new(cache: Arc<CachingService>, publisher: InvalidationPublisher) -> Self {
        Self { cache, publisher }
    }

    /// Stores `value` on both tiers, then publishes a `RefreshKey` so other
    /// instances replace their local copy instead of dropping it.
    pub async fn invalidate_key<T: Serialize + ?Sized + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> NexusResult<()> {
        self.cache.set(key, value, ttl).await?;
        self.publisher.refresh_key(key, ttl).await?;
        debug!(key = %key, ttl_secs = ttl.as_secs(), "Warmed cache key");
        Ok(())
    }

    /// Computes the value of a catalogued key and warms it with the key's TTL.
    pub async fn warm<T, F, Fut>(&self, info: &CacheInfo, producer: F) -> NexusResult<T>
    where
        T: Serialize + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = NexusResult<T>>,
    {
        let value = producer().await?;
        self.invalidate_key(&info.key, &value, info.ttl).await?;
        Ok(value)
    }
}
