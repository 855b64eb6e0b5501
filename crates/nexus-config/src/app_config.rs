//! Application configuration structures.

use nexus_core::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Redis configuration (remote tier and invalidation bus).
    #[serde(default)]
    pub redis: RedisConfig,

    /// Caching behaviour.
    #[serde(default)]
    pub caching: CachingConfig,

    /// Admin surface security.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "nexus-gateway".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Enable CORS.
    pub cors_enabled: bool,
    /// CORS allowed origins.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl ServerConfig {
    /// Returns the bind address.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the request timeout as a Duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL.
    pub url: String,
    /// Connection pool size.
    pub pool_size: usize,
    /// When false the node runs with an in-memory remote tier and an
    /// in-process invalidation bus.
    pub enabled: bool,
    /// Optional namespace prefixed to every remote key, so several logical
    /// environments can share one physical store.
    pub key_namespace: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            enabled: true,
            key_namespace: None,
        }
    }
}

/// What a subscriber does with its local copy when a key is invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationPolicyKind {
    /// Drop the local copy.
    HardDelete,
    /// Re-read the key from the remote tier into the local tier.
    SoftRefresh,
}

/// One row of the hot-key table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationRuleConfig {
    /// Exact key, or a prefix ending in `*`.
    pub pattern: String,
    /// Policy applied to keys matching `pattern`.
    pub policy: InvalidationPolicyKind,
    /// Local TTL used by a soft refresh. Falls back to the default cache TTL.
    #[serde(default)]
    pub refresh_ttl_secs: Option<u64>,
}

/// Caching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CachingConfig {
    /// Default TTL for cached values, in seconds.
    pub cache_ttl_default_secs: u64,
    /// Width of the worker pool computing batch misses.
    pub pool_limit: usize,
    /// Upper bound on the TTL of empty batch results, in seconds.
    pub process_ttl_secs: u64,
    /// Minimum interval between two local-tier sweeps, in seconds.
    pub local_sweep_interval_secs: u64,
    /// Local TTL of cached GET responses, in seconds. Zero disables
    /// response caching.
    pub response_cache_ttl_secs: u64,
    /// Ordered hot-key table; first match wins.
    pub invalidation_rules: Vec<InvalidationRuleConfig>,
    /// Alias topic -> key template containing `{}`.
    pub topic_aliases: HashMap<String, String>,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            cache_ttl_default_secs: 6,
            pool_limit: 10,
            process_ttl_secs: 60,
            local_sweep_interval_secs: 60,
            response_cache_ttl_secs: 6,
            invalidation_rules: Vec::new(),
            topic_aliases: HashMap::new(),
        }
    }
}

impl CachingConfig {
    /// Returns the default cache TTL as a Duration.
    #[must_use]
    pub const fn cache_ttl_default(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_default_secs)
    }

    /// Returns the sweep interval as a Duration.
    #[must_use]
    pub const fn local_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.local_sweep_interval_secs)
    }

    /// Returns the response cache TTL as a Duration.
    #[must_use]
    pub const fn response_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.response_cache_ttl_secs)
    }
}

/// Admin surface security.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Bearer tokens accepted on the `/caching` admin endpoints.
    pub admin_tokens: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format (json, pretty).
    pub log_format: String,
    /// Enable metrics.
    pub metrics_enabled: bool,
    /// Metrics endpoint path.
    pub metrics_path: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_path: "/metrics".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Logging settings for `nexus_core::init_logging`.
    #[must_use]
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: self.log_format.clone(),
        }
    }
}
