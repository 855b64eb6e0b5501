//! Redis-backed remote store.

use super::RemoteStore;
use crate::ttl::MAX_TTL;
use async_trait::async_trait;
use deadpool_redis::{redis::AsyncCommands, Config, Pool, Runtime};
use nexus_config::RedisConfig;
use nexus_core::{NexusError, NexusResult};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Create a Redis connection pool and check it answers a PING.
pub async fn create_pool(config: &RedisConfig) -> NexusResult<Pool> {
    info!("Creating Redis connection pool...");

    let pool = Config::from_url(&config.url)
        .builder()
        .map_err(|e| NexusError::Configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(config.pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| NexusError::Configuration(format!("Failed to create pool: {}", e)))?;

    let mut conn = pool
        .get()
        .await
        .map_err(|e| NexusError::Cache(format!("Failed to get Redis connection: {}", e)))?;
    redis::cmd("PING")
        .query_async::<String>(&mut *conn)
        .await
        .map_err(|e| NexusError::Cache(format!("Redis PING failed: {}", e)))?;

    info!("Redis connection pool created successfully");
    Ok(pool)
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.min(MAX_TTL).as_secs().max(1)
}

/// Values are JSON text. Bytes that are not UTF-8 cannot be, so they are
/// reported as absent like any other undecodable value.
fn utf8_value(key: &str, bytes: Option<Vec<u8>>) -> Option<String> {
    match String::from_utf8(bytes?) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = %key, error = %e, "Discarding non UTF-8 remote value");
            None
        }
    }
}

/// Redis remote store.
#[derive(Clone)]
pub struct RedisRemoteStore {
    pool: Pool,
}

impl RedisRemoteStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> NexusResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| NexusError::Cache(format!("Failed to get Redis connection: {}", e)))
    }
}

#[async_trait]
impl RemoteStore for RedisRemoteStore {
    async fn get_raw(&self, key: &str) -> NexusResult<Option<String>> {
        let mut conn = self.get_conn().await?;
        let bytes: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| NexusError::Cache(format!("Failed to get key '{}': {}", key, e)))?;
        let value = utf8_value(key, bytes);

        match &value {
            Some(_) => debug!("Remote hit for key '{}'", key),
            None => debug!("Remote miss for key '{}'", key),
        }

        Ok(value)
    }

    async fn mget_raw(&self, keys: &[String]) -> NexusResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.get_conn().await?;
        let values = redis::cmd("MGET")
            .arg(keys)
            .query_async::<Vec<Option<Vec<u8>>>>(&mut *conn)
            .await
            .map_err(|e| NexusError::Cache(format!("Failed to read {} keys: {}", keys.len(), e)))?;

        Ok(keys
            .iter()
            .zip(values)
            .map(|(key, bytes)| utf8_value(key, bytes))
            .collect())
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> NexusResult<()> {
        let mut conn = self.get_conn().await?;
        let ttl_secs = ttl_secs(ttl);

        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| NexusError::Cache(format!("Failed to set key '{}': {}", key, e)))?;

        debug!("Cached key '{}' with TTL {}s", key, ttl_secs);
        Ok(())
    }

    async fn set_many_raw(&self, entries: &[(String, String, Duration)]) -> NexusResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value, ttl) in entries {
            pipe.set_ex(key, value, ttl_secs(*ttl)).ignore();
        }

        let mut conn = self.get_conn().await?;
        let _: () = pipe.query_async(&mut *conn).await.map_err(|e| {
            NexusError::Cache(format!("Failed to write {} keys: {}", entries.len(), e))
        })?;

        debug!("Cached {} keys in one transaction", entries.len());
        Ok(())
    }

    async fn delete(&self, key: &str) -> NexusResult<bool> {
        let mut conn = self.get_conn().await?;
        let deleted: i64 = conn
            .del(key)
            .await
            .map_err(|e| NexusError::Cache(format!("Failed to delete key '{}': {}", key, e)))?;

        debug!("Deleted key '{}': {}", key, deleted > 0);
        Ok(deleted > 0)
    }

    async fn keys(&self, pattern: &str) -> NexusResult<Vec<String>> {
        let mut conn = self.get_conn().await?;

        // KEYS blocks the server while it scans; patterns are narrow in practice.
        redis::cmd("KEYS")
            .arg(pattern)
            .query_async::<Vec<String>>(&mut *conn)
            .await
            .map_err(|e| NexusError::Cache(format!("Failed to list keys '{}': {}", pattern, e)))
    }

    async fn flush(&self) -> NexusResult<()> {
        let mut conn = self.get_conn().await?;
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut *conn)
            .await
            .map_err(|e| NexusError::Cache(format!("Failed to flush database: {}", e)))?;

        info!("Remote cache flushed");
        Ok(())
    }
}
