//! Process-local cache tier.
//!
//! Entries expire lazily on read. Because cold keys that are never read again
//! would otherwise stay in the map forever, every `set` also checks whether
//! the sweep interval has elapsed and, if so, drops every expired entry.

use crate::{pattern, ttl};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Default interval between two sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A locally cached value.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cached value.
    pub value: Value,
    /// Instant from which the entry is considered absent.
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct Entries {
    map: HashMap<String, CacheEntry>,
    last_swept: Instant,
}

/// Process-local key/value map with per-entry expiry.
pub struct LocalStore {
    entries: Mutex<Entries>,
    sweep_interval: Duration,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_INTERVAL)
    }
}

impl LocalStore {
    /// Creates an empty store sweeping at most once per `sweep_interval`.
    #[must_use]
    pub fn new(sweep_interval: Duration) -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                last_swept: Instant::now(),
            }),
            sweep_interval,
        }
    }

    /// Returns the value for `key` unless it is missing or expired.
    /// An expired entry is removed.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        match entries.map.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.map.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `value` under `key` for `ttl`, overwriting any previous entry.
    /// TTLs above [`ttl::MAX_TTL`] are clamped.
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        entries.map.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: ttl::expires_at(now, ttl),
            },
        );

        if now.duration_since(entries.last_swept) >= self.sweep_interval {
            Self::sweep_locked(&mut entries, now);
        }
    }

    /// Removes `key`. Returns true if an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.lock().map.remove(key).is_some()
    }

    /// Removes every expired entry now. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Self::sweep_locked(&mut entries, now)
    }

    fn sweep_locked(entries: &mut Entries, now: Instant) -> usize {
        let before = entries.map.len();
        entries.map.retain(|_, entry| !entry.is_expired(now));
        entries.last_swept = now;

        let removed = before - entries.map.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = entries.map.len(), "Swept local cache");
        }
        removed
    }

    /// Live keys matching a glob pattern.
    pub fn keys_matching(&self, pattern: &str) -> Vec<String> {
        let now = Instant::now();
        let entries = self.entries.lock();

        let mut keys: Vec<String> = entries
            .map
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && pattern::matches(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.lock().map.clear();
    }

    /// Number of entries held, including expired ones not yet removed.
    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    /// True if the map holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
