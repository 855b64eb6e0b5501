//! Batch fetch/populate engine.
//!
//! Resolves a list of inputs through the cache in chunks: bulk read, compute
//! only the misses with bounded concurrency, write the results back to both
//! tiers with jittered TTLs, and reassemble the output in input order.

use crate::service::{decode, CachingService};
use futures::stream::{self, StreamExt, TryStreamExt};
use nexus_core::{NexusError, NexusResult};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Number of inputs processed per chunk.
pub const BATCH_CHUNK_SIZE: usize = 100;

/// TTLs at or above this are jittered.
pub const SPREAD_THRESHOLD_SECS: u64 = 300;

/// Maximum jitter, in percent of the TTL.
pub const SPREAD_PERCENT: u64 = 10;

/// Splits `items` into consecutive slices of at most `size` elements.
pub fn chunks<T>(items: &[T], size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(size.max(1))
}

/// Perturbs a TTL of at least five minutes by up to ±10%, sign and magnitude
/// drawn uniformly, so keys written together do not expire together.
/// Shorter TTLs are returned unchanged.
#[must_use]
pub fn spread_ttl(ttl: Duration) -> Duration {
    let secs = ttl.as_secs();
    if secs < SPREAD_THRESHOLD_SECS {
        return ttl;
    }

    let mut rng = rand::thread_rng();
    let amount = rng.gen_range(0..=secs * SPREAD_PERCENT / 100);
    if rng.gen_bool(0.5) {
        Duration::from_secs(secs + amount)
    } else {
        Duration::from_secs(secs - amount)
    }
}

/// Empty results: `null`, `false`, zero, `""`, `[]` and `{}`.
#[must_use]
pub fn is_empty_result(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Options for [`CachingService::batch_process`].
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// TTL of computed results.
    pub ttl: Duration,
    /// Compute every input, ignoring cached values.
    pub skip_cache: bool,
}

impl BatchOptions {
    /// Options with the given TTL, reading through the cache.
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            skip_cache: false,
        }
    }

    /// Ignore cached values.
    #[must_use]
    pub const fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }
}

impl CachingService {
    /// Resolves every item through the cache, computing misses with
    /// `handler`, and returns the outputs in input order.
    ///
    /// Items are processed in chunks of [`BATCH_CHUNK_SIZE`]. At most
    /// `pool_limit` handler calls run at once. Empty results are cached for
    /// at most the process TTL. A failing chunk is re-run as a whole by the
    /// batch retry policy before the error is returned.
    pub async fn batch_process<IN, OUT, K, H, Fut>(
        &self,
        items: &[IN],
        key_fn: K,
        handler: H,
        options: BatchOptions,
    ) -> NexusResult<Vec<OUT>>
    where
        IN: Clone,
        OUT: Serialize + DeserializeOwned,
        K: Fn(&IN) -> String,
        H: Fn(IN) -> Fut,
        Fut: Future<Output = NexusResult<OUT>>,
    {
        let mut results = Vec::with_capacity(items.len());

        for (index, chunk) in chunks(items, BATCH_CHUNK_SIZE).enumerate() {
            debug!(chunk = index, size = chunk.len(), "Processing batch chunk");

            let processed = self
                .settings
                .batch_retry
                .execute(|| self.process_chunk(chunk, &key_fn, &handler, options))
                .await?;
            results.extend(processed);
        }

        Ok(results)
    }

    async fn process_chunk<IN, OUT, K, H, Fut>(
        &self,
        chunk: &[IN],
        key_fn: &K,
        handler: &H,
        options: BatchOptions,
    ) -> NexusResult<Vec<OUT>>
    where
        IN: Clone,
        OUT: Serialize + DeserializeOwned,
        K: Fn(&IN) -> String,
        H: Fn(IN) -> Fut,
        Fut: Future<Output = NexusResult<OUT>>,
    {
        let keys: Vec<String> = chunk.iter().map(key_fn).collect();

        let cached: Vec<Option<OUT>> = if options.skip_cache {
            keys.iter().map(|_| None).collect()
        } else {
            self.batch_get(&keys).await?
        };

        let missing: Vec<usize> = cached
            .iter()
            .enumerate()
            .filter(|(_, value)| value.is_none())
            .map(|(index, _)| index)
            .collect();

        if missing.is_empty() {
            return Ok(cached.into_iter().flatten().collect());
        }

        let computed: Vec<OUT> = stream::iter(missing.iter().map(|&index| handler(chunk[index].clone())))
            .buffered(self.settings.pool_limit.max(1))
            .try_collect()
            .await?;

        let mut entries = Vec::with_capacity(computed.len());
        for (&index, value) in missing.iter().zip(&computed) {
            let value = serde_json::to_value(value)?;
            let ttl = if is_empty_result(&value) {
                options.ttl.min(self.settings.process_ttl)
            } else {
                options.ttl
            };
            entries.push((keys[index].clone(), value, ttl));
        }
        self.write_batch(entries).await?;

        debug!(
            hits = chunk.len() - missing.len(),
            computed = computed.len(),
            "Batch chunk resolved"
        );

        let mut computed = computed.into_iter();
        cached
            .into_iter()
            .map(|value| match value {
                Some(value) => Ok(value),
                None => computed
                    .next()
                    .ok_or_else(|| NexusError::internal("Batch result count mismatch")),
            })
            .collect()
    }

    /// Bulk read, local tier first, then the remote tier in chunks.
    /// Absent or undecodable keys come back as `None`, in input order.
    pub async fn batch_get<T: DeserializeOwned>(&self, keys: &[String]) -> NexusResult<Vec<Option<T>>> {
        let mut values: Vec<Option<T>> = keys.iter().map(|key| self.get_local(key)).collect();

        let remote_indexes: Vec<usize> = values
            .iter()
            .enumerate()
            .filter(|(_, value)| value.is_none())
            .map(|(index, _)| index)
            .collect();
        if remote_indexes.is_empty() {
            return Ok(values);
        }

        let remote_keys: Vec<String> = remote_indexes.iter().map(|&i| keys[i].clone()).collect();
        let raw_values = self.remote.batch_get_raw(&remote_keys).await?;

        for (&index, raw) in remote_indexes.iter().zip(raw_values) {
            let Some(raw) = raw else { continue };
            match decode::<T>(&raw) {
                Ok((_, typed)) => values[index] = Some(typed),
                Err(e) => warn!(key = %keys[index], error = %e, "Discarding undecodable remote value"),
            }
        }

        Ok(values)
    }

    /// Bulk write of parallel `keys`, `values` and `ttls`. TTLs are jittered;
    /// the local tier is written before the remote tier.
    pub async fn batch_set<T: Serialize>(
        &self,
        keys: &[String],
        values: &[T],
        ttls: &[Duration],
    ) -> NexusResult<()> {
        if keys.len() != values.len() || keys.len() != ttls.len() {
            return Err(NexusError::validation(format!(
                "batch_set needs equal lengths, got {} keys, {} values, {} ttls",
                keys.len(),
                values.len(),
                ttls.len()
            )));
        }

        let entries = keys
            .iter()
            .zip(values)
            .zip(ttls)
            .map(|((key, value), ttl)| Ok((key.clone(), serde_json::to_value(value)?, *ttl)))
            .collect::<NexusResult<Vec<_>>>()?;

        self.write_batch(entries).await
    }

    async fn write_batch(&self, entries: Vec<(String, Value, Duration)>) -> NexusResult<()> {
        let entries: Vec<(String, Value, Duration)> = entries
            .into_iter()
            .map(|(key, value, ttl)| (key, value, spread_ttl(ttl)))
            .collect();

        for (key, value, ttl) in &entries {
            if !ttl.is_zero() {
                self.local.set(key, value.clone(), *ttl);
            }
        }

        self.remote.batch_set(&entries).await
    }
}
