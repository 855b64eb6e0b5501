//! Server startup utilities.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use nexus_config::AppConfig;
use nexus_core::{NexusError, NexusResult};
use tracing::info;

/// Installs the process-wide Prometheus recorder. Call once at startup.
pub fn install_metrics_recorder() -> NexusResult<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| NexusError::Configuration(format!("Failed to install Prometheus recorder: {}", e)))?;

    info!("Prometheus metrics initialized");
    Ok(handle)
}

/// Logs where the server can be reached.
pub fn print_startup_info(config: &AppConfig) {
    let separator = "=".repeat(60);
    let addr = config.server.addr();

    info!("{}", separator);
    info!("{} v{} ({})", config.app.name, config.app.version, config.app.environment);
    info!("Admin API: http://{}/caching", addr);
    info!("Health:    http://{}/health", addr);
    if config.observability.metrics_enabled {
        info!("Metrics:   http://{}{}", addr, config.observability.metrics_path);
    }
    info!("API Docs:  http://{}/swagger-ui", addr);
    if config.redis.enabled {
        info!("Redis:     {}", config.redis.url);
    } else {
        info!("Redis:     disabled (in-process remote tier)");
    }
    info!("{}", separator);
}
