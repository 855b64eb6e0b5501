//! Configuration validation.
//!
//! Every rule is checked and all violations are reported together, so a bad
//! deployment fails once at startup with the full list.

use crate::{AppConfig, CachingConfig, ObservabilityConfig, RedisConfig, ServerConfig};
use std::fmt;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// Port number is invalid (0 cannot be bound).
    InvalidPort { value: u16 },
    /// URL format is invalid.
    InvalidUrl { url_type: String, message: String },
    /// Pool size must be at least one.
    InvalidPoolSize { name: String, value: usize },
    /// Interval or timeout must be positive.
    NonPositiveDuration { name: String },
    /// An invalidation rule has an empty pattern.
    EmptyRulePattern { index: usize },
    /// An alias template has no `{}` placeholder.
    InvalidAliasTemplate { alias: String, template: String },
    /// Log level is invalid.
    InvalidLogLevel { value: String },
    /// Metrics path must be absolute.
    InvalidMetricsPath { value: String },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPort { value } => {
                write!(f, "Invalid server port: {} (must be 1-65535)", value)
            }
            Self::InvalidUrl { url_type, message } => {
                write!(f, "Invalid {} URL: {}", url_type, message)
            }
            Self::InvalidPoolSize { name, value } => {
                write!(f, "Pool size '{}' must be at least 1, got {}", name, value)
            }
            Self::NonPositiveDuration { name } => {
                write!(f, "'{}' must be positive", name)
            }
            Self::EmptyRulePattern { index } => {
                write!(f, "Invalidation rule #{} has an empty pattern", index)
            }
            Self::InvalidAliasTemplate { alias, template } => {
                write!(
                    f,
                    "Topic alias '{}' template '{}' must contain a '{{}}' placeholder",
                    alias, template
                )
            }
            Self::InvalidLogLevel { value } => {
                write!(
                    f,
                    "Invalid log level: '{}' (valid: trace, debug, info, warn, error)",
                    value
                )
            }
            Self::InvalidMetricsPath { value } => {
                write!(f, "Metrics path '{}' must start with '/'", value)
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Valid log levels.
    const VALID_LOG_LEVELS: &'static [&'static str] = &["trace", "debug", "info", "warn", "error"];

    /// Validates the entire application configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        Self::validate_server(&config.server, &mut errors);
        Self::validate_redis(&config.redis, &mut errors);
        Self::validate_caching(&config.caching, &mut errors);
        Self::validate_observability(&config.observability, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_server(config: &ServerConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.port == 0 {
            errors.push(ConfigValidationError::InvalidPort { value: config.port });
        }
        if config.request_timeout_secs == 0 {
            errors.push(ConfigValidationError::NonPositiveDuration {
                name: "server.request_timeout_secs".to_string(),
            });
        }
    }

    fn validate_redis(config: &RedisConfig, errors: &mut Vec<ConfigValidationError>) {
        if !config.enabled {
            return;
        }

        if config.url.is_empty() {
            errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: "URL cannot be empty".to_string(),
            });
        } else if !config.url.starts_with("redis://") && !config.url.starts_with("rediss://") {
            errors.push(ConfigValidationError::InvalidUrl {
                url_type: "redis".to_string(),
                message: "URL must start with redis:// or rediss://".to_string(),
            });
        }

        if config.pool_size == 0 {
            errors.push(ConfigValidationError::InvalidPoolSize {
                name: "redis.pool_size".to_string(),
                value: 0,
            });
        }
    }

    fn validate_caching(config: &CachingConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.pool_limit == 0 {
            errors.push(ConfigValidationError::InvalidPoolSize {
                name: "caching.pool_limit".to_string(),
                value: 0,
            });
        }

        if config.local_sweep_interval_secs == 0 {
            errors.push(ConfigValidationError::NonPositiveDuration {
                name: "caching.local_sweep_interval_secs".to_string(),
            });
        }

        for (index, rule) in config.invalidation_rules.iter().enumerate() {
            if rule.pattern.trim().is_empty() {
                errors.push(ConfigValidationError::EmptyRulePattern { index });
            }
        }

        let mut aliases: Vec<_> = config.topic_aliases.iter().collect();
        aliases.sort();
        for (alias, template) in aliases {
            if !template.contains("{}") {
                errors.push(ConfigValidationError::InvalidAliasTemplate {
                    alias: alias.clone(),
                    template: template.clone(),
                });
            }
        }
    }

    fn validate_observability(config: &ObservabilityConfig, errors: &mut Vec<ConfigValidationError>) {
        if !Self::VALID_LOG_LEVELS.contains(&config.log_level.to_lowercase().as_str()) {
            errors.push(ConfigValidationError::InvalidLogLevel {
                value: config.log_level.clone(),
            });
        }

        if config.metrics_enabled && !config.metrics_path.starts_with('/') {
            errors.push(ConfigValidationError::InvalidMetricsPath {
                value: config.metrics_path.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InvalidationPolicyKind, InvalidationRuleConfig};

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_pool_limit_rejected() {
        let mut config = AppConfig::default();
        config.caching.pool_limit = 0;

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ConfigValidationError::InvalidPoolSize {
                name: "caching.pool_limit".to_string(),
                value: 0,
            }]
        );
    }

    #[test]
    fn test_redis_url_only_checked_when_enabled() {
        let mut config = AppConfig::default();
        config.redis.url = String::new();
        assert!(ConfigValidator::validate(&config).is_err());

        config.redis.enabled = false;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_rule_and_alias_errors_collected() {
        let mut config = AppConfig::default();
        config.caching.invalidation_rules.push(InvalidationRuleConfig {
            pattern: " ".to_string(),
            policy: InvalidationPolicyKind::SoftRefresh,
            refresh_ttl_secs: None,
        });
        config
            .caching
            .topic_aliases
            .insert("nftsCountChanged".to_string(), "nfts:count".to_string());

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&ConfigValidationError::EmptyRulePattern { index: 0 }));
        assert!(errors[1].to_string().contains("nftsCountChanged"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig::default();
        config.observability.log_level = "verbose".to_string();

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert!(matches!(errors[0], ConfigValidationError::InvalidLogLevel { .. }));
    }
}
