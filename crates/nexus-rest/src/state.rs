//! Application state for Axum handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use nexus_cache::{CachingService, InvalidationPublisher};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CachingService>,
    pub publisher: InvalidationPublisher,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(cache: Arc<CachingService>, publisher: InvalidationPublisher) -> Self {
        Self {
            cache,
            publisher,
            metrics: None,
        }
    }

    /// Exposes the Prometheus render at the metrics endpoint.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
