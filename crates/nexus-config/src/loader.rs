//! Configuration loader with layered sources.

use crate::{AppConfig, ConfigValidator};
use config::{Config, ConfigError, Environment, File};
use nexus_core::{NexusError, NexusResult};
use std::path::Path;
use tracing::{debug, info, warn};

/// Environment variable selecting the `config/{environment}.toml` layer.
pub const ENVIRONMENT_VAR: &str = "NEXUS_ENVIRONMENT";

/// Layered configuration loader.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: AppConfig,
    environment: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Local, uncommitted overrides
    /// 4. Environment variables `NEXUS__SECTION__FIELD`
    pub fn new(config_dir: impl Into<String>) -> NexusResult<Self> {
        // Load .env file if present, so NEXUS_ENVIRONMENT may come from it.
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment = std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "development".to_string());
        Self::with_environment(config_dir, environment)
    }

    /// Creates a loader for an explicit environment name.
    pub fn with_environment(
        config_dir: impl Into<String>,
        environment: impl Into<String>,
    ) -> NexusResult<Self> {
        let environment = environment.into();
        let config = Self::load_config(&config_dir.into(), &environment)?;

        Ok(Self { config, environment })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> NexusResult<Self> {
        Self::new("./config")
    }

    /// The loaded configuration.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Name of the environment layer that was applied.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Consumes the loader, returning the configuration.
    #[must_use]
    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// Parses and validates a configuration from a TOML document, without
    /// consulting files or the environment.
    pub fn from_toml_str(source: &str) -> NexusResult<AppConfig> {
        let config: AppConfig =
            toml::from_str(source).map_err(|e| NexusError::Configuration(e.to_string()))?;
        Self::validate_config(&config)?;
        Ok(config)
    }

    fn load_config(config_dir: &str, environment: &str) -> NexusResult<AppConfig> {
        info!("Loading configuration for environment: {}", environment);

        let mut builder = Config::builder();

        for layer in ["default", environment, "local"] {
            let path = format!("{}/{}.toml", config_dir, layer);
            if Path::new(&path).exists() {
                debug!("Loading {} config from: {}", layer, path);
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("NEXUS")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("security.admin_tokens")
                .with_list_parse_key("server.cors_origins")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_error_to_nexus_error)?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(config_error_to_nexus_error)?;

        Self::validate_config(&app_config)?;

        Ok(app_config)
    }

    fn validate_config(config: &AppConfig) -> NexusResult<()> {
        if config.app.environment == "production" && config.security.admin_tokens.is_empty() {
            warn!("No admin tokens configured in production; the /caching endpoints will reject every request");
        }

        ConfigValidator::validate(config).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            NexusError::Configuration(messages.join("; "))
        })
    }
}

fn config_error_to_nexus_error(err: ConfigError) -> NexusError {
    NexusError::Configuration(err.to_string())
}
