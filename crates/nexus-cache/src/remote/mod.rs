//! Shared remote cache tier.
//!
//! [`RemoteStore`] is the backend seam and works on raw JSON strings so it
//! stays dyn-compatible. [`RemoteCache`] sits on top of a backend and adds key
//! namespacing, request chunking and the JSON boundary.

mod memory;
mod metered;
mod redis_store;

pub use self::memory::InMemoryRemoteStore;
pub use self::metered::MeteredRemoteStore;
pub use self::redis_store::{create_pool, RedisRemoteStore};

use crate::batch::chunks;
use async_trait::async_trait;
use nexus_core::{NexusError, NexusResult};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Maximum number of keys read in one round trip.
pub const GET_CHUNK_SIZE: usize = 100;

/// Maximum number of keys written in one round trip.
pub const SET_CHUNK_SIZE: usize = 25;

/// Remote key/value backend.
///
/// Keys reaching a backend are already namespaced. Every call may fail with
/// [`NexusError::Cache`] when the store is unreachable.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Get a raw JSON value. `None` if the key doesn't exist or has expired.
    async fn get_raw(&self, key: &str) -> NexusResult<Option<String>>;

    /// Get many raw values in one round trip, in input order.
    async fn mget_raw(&self, keys: &[String]) -> NexusResult<Vec<Option<String>>>;

    /// Set a raw JSON value with a TTL.
    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> NexusResult<()>;

    /// Set many raw values atomically: either every entry is written or none.
    async fn set_many_raw(&self, entries: &[(String, String, Duration)]) -> NexusResult<()>;

    /// Delete a key. Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> NexusResult<bool>;

    /// List keys matching a glob pattern.
    async fn keys(&self, pattern: &str) -> NexusResult<Vec<String>>;

    /// Remove every key in the store.
    async fn flush(&self) -> NexusResult<()>;
}

/// Typed, namespaced view of a [`RemoteStore`].
#[derive(Clone)]
pub struct RemoteCache {
    store: Arc<dyn RemoteStore>,
    namespace: Option<String>,
}

impl RemoteCache {
    /// Wraps a backend. Keys are prefixed with `{namespace}:` when set.
    pub fn new(store: Arc<dyn RemoteStore>, namespace: Option<String>) -> Self {
        let namespace = namespace.filter(|ns| !ns.is_empty());
        Self { store, namespace }
    }

    fn qualify(&self, key: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, key),
            None => key.to_string(),
        }
    }

    fn unqualify(&self, key: String) -> String {
        match &self.namespace {
            Some(ns) => key
                .strip_prefix(ns.as_str())
                .and_then(|rest| rest.strip_prefix(':'))
                .map(ToString::to_string)
                .unwrap_or(key),
            None => key,
        }
    }

    /// Raw JSON for `key`.
    pub async fn get_raw(&self, key: &str) -> NexusResult<Option<String>> {
        self.store.get_raw(&self.qualify(key)).await
    }

    /// Raw JSON for many keys, chunked, in input order.
    pub async fn batch_get_raw(&self, keys: &[String]) -> NexusResult<Vec<Option<String>>> {
        let mut values = Vec::with_capacity(keys.len());

        for chunk in chunks(keys, GET_CHUNK_SIZE) {
            let qualified: Vec<String> = chunk.iter().map(|k| self.qualify(k)).collect();
            let chunk_values = self.store.mget_raw(&qualified).await?;

            if chunk_values.len() != qualified.len() {
                return Err(NexusError::Cache(format!(
                    "Bulk read returned {} values for {} keys",
                    chunk_values.len(),
                    qualified.len()
                )));
            }
            values.extend(chunk_values);
        }

        Ok(values)
    }

    /// Serializes and stores `value`. A zero TTL skips the write.
    pub async fn set<T: Serialize + ?Sized + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> NexusResult<()> {
        if ttl.is_zero() {
            debug!(key = %key, "Skipping remote write with zero TTL");
            return Ok(());
        }

        let json = serde_json::to_string(value)?;
        self.store.set_raw(&self.qualify(key), &json, ttl).await
    }

    /// Stores many values, each chunk of [`SET_CHUNK_SIZE`] in one atomic
    /// round trip. Entries with a zero TTL are skipped.
    pub async fn batch_set(&self, entries: &[(String, Value, Duration)]) -> NexusResult<()> {
        let serialized = entries
            .iter()
            .filter(|(_, _, ttl)| !ttl.is_zero())
            .map(|(key, value, ttl)| Ok((self.qualify(key), serde_json::to_string(value)?, *ttl)))
            .collect::<NexusResult<Vec<_>>>()?;

        for chunk in chunks(&serialized, SET_CHUNK_SIZE) {
            self.store.set_many_raw(chunk).await?;
        }

        Ok(())
    }

    /// Deletes `key`. Returns `true` if it existed.
    pub async fn delete(&self, key: &str) -> NexusResult<bool> {
        self.store.delete(&self.qualify(key)).await
    }

    /// Keys matching `pattern`, with the namespace stripped.
    pub async fn keys(&self, pattern: &str) -> NexusResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .store
            .keys(&self.qualify(pattern))
            .await?
            .into_iter()
            .map(|key| self.unqualify(key))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Clears the store. Under a namespace only that namespace's keys are
    /// removed, so neighbours sharing the store are left alone.
    pub async fn flush(&self) -> NexusResult<()> {
        if self.namespace.is_none() {
            return self.store.flush().await;
        }

        for key in self.store.keys(&self.qualify("*")).await? {
            self.store.delete(&key).await?;
        }
        Ok(())
    }
}
