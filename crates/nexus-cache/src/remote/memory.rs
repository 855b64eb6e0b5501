//! In-memory remote store, used when Redis is disabled and in tests.

use super::RemoteStore;
use crate::{pattern, ttl};
use async_trait::async_trait;
use nexus_core::NexusResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Remote store held in process memory.
///
/// Shares the `RemoteStore` contract with Redis, including TTL expiry and
/// glob key listing, so a single node can run without a Redis server.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryRemoteStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    /// True if no live key is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_value(
        entries: &mut HashMap<String, (String, Instant)>,
        key: &str,
        now: Instant,
    ) -> Option<String> {
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > now => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn get_raw(&self, key: &str) -> NexusResult<Option<String>> {
        let now = Instant::now();
        Ok(Self::live_value(&mut self.entries.lock(), key, now))
    }

    async fn mget_raw(&self, keys: &[String]) -> NexusResult<Vec<Option<String>>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Ok(keys
            .iter()
            .map(|key| Self::live_value(&mut entries, key, now))
            .collect())
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> NexusResult<()> {
        let expires_at = ttl::expires_at(Instant::now(), ttl);
        self.entries
            .lock()
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn set_many_raw(&self, entries: &[(String, String, Duration)]) -> NexusResult<()> {
        let now = Instant::now();
        let mut map = self.entries.lock();
        for (key, value, entry_ttl) in entries {
            map.insert(key.clone(), (value.clone(), ttl::expires_at(now, *entry_ttl)));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> NexusResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .remove(key)
            .is_some_and(|(_, expires_at)| expires_at > now))
    }

    async fn keys(&self, pattern: &str) -> NexusResult<Vec<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|(key, (_, expires_at))| *expires_at > now && pattern::matches(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn flush(&self) -> NexusResult<()> {
        self.entries.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let store = InMemoryRemoteStore::new();
        store.set_raw("k", "1", Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.get_raw("k").await.unwrap().as_deref(), Some("1"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get_raw("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_is_clamped() {
        let store = InMemoryRemoteStore::new();
        store.set_raw("a", "1", Duration::MAX).await.unwrap();
        store
            .set_many_raw(&[("b".to_string(), "2".to_string(), Duration::MAX)])
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        tokio::time::advance(crate::ttl::MAX_TTL).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_mget_and_keys() {
        let store = InMemoryRemoteStore::new();
        store
            .set_many_raw(&[
                ("tok:1".to_string(), "1".to_string(), Duration::from_secs(60)),
                ("tok:2".to_string(), "2".to_string(), Duration::from_secs(60)),
                ("other".to_string(), "3".to_string(), Duration::from_secs(60)),
            ])
            .await
            .unwrap();

        let values = store
            .mget_raw(&["tok:2".to_string(), "missing".to_string(), "other".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("2".to_string()), None, Some("3".to_string())]);

        let mut keys = store.keys("tok:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["tok:1".to_string(), "tok:2".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = InMemoryRemoteStore::new();
        store.set_raw("k", "1", Duration::from_secs(60)).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }
}
