//! Catalogue of well-known cache keys and their TTLs.

use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

/// A cache key with the TTL it is normally written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInfo {
    pub key: String,
    pub ttl: Duration,
}

impl CacheInfo {
    fn fixed(key: &str, ttl_secs: u64) -> Self {
        Self {
            key: key.to_string(),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    pub fn all_esdt_tokens() -> Self {
        Self::fixed("allEsdtTokens", HOUR)
    }

    pub fn current_price() -> Self {
        Self::fixed("currentPrice", HOUR)
    }

    pub fn economics() -> Self {
        Self::fixed("economics", 10 * MINUTE)
    }

    /// Aggregates that are refreshed rather than dropped on invalidation.
    #[must_use]
    pub fn hot_keys() -> Vec<Self> {
        vec![Self::economics(), Self::current_price(), Self::all_esdt_tokens()]
    }
}
