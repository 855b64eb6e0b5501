//! Logging initialisation.
//!
//! Sets up a `tracing` subscriber with an `EnvFilter` and either a
//! human-readable or a JSON formatter.

use crate::NexusResult;
use serde::{Deserialize, Serialize};

/// Default filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info,nexus=debug,tower_http=debug";

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base log level used when `RUST_LOG` is absent.
    #[serde(default = "default_level")]
    pub level: String,

    /// Output format: `pretty` or `json`.
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

impl LoggingConfig {
    /// Returns true if JSON output was requested.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }

    /// Filter directive derived from the configured level.
    #[must_use]
    pub fn filter_directive(&self) -> String {
        if self.level == default_level() {
            DEFAULT_LOG_FILTER.to_string()
        } else {
            format!("{},nexus={},tower_http={}", self.level, self.level, self.level)
        }
    }
}

/// Initialize the global tracing subscriber.
#[cfg(feature = "telemetry")]
pub fn init_logging(config: &LoggingConfig) -> NexusResult<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.is_json() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };

    result.map_err(|e| crate::NexusError::Internal(format!("Failed to init logging: {}", e)))?;

    tracing::info!(level = %config.level, format = %config.format, "Logging initialized");
    Ok(())
}

/// Placeholder for when the telemetry feature is disabled.
#[cfg(not(feature = "telemetry"))]
pub fn init_logging(_config: &LoggingConfig) -> NexusResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.is_json());
        assert_eq!(config.filter_directive(), DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_custom_level_directive() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            format: "JSON".to_string(),
        };
        assert!(config.is_json());
        assert_eq!(config.filter_directive(), "warn,nexus=warn,tower_http=warn");
    }
}
