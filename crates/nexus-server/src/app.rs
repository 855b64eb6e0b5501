//! Application wiring.

use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use nexus_cache::{
    create_pool, CacheSettings, CacheWarmer, CachingService, InMemoryRemoteStore, InvalidationBus,
    InvalidationPolicies, InvalidationPublisher, InvalidationSubscriber, LocalInvalidationBus,
    MetricsSink, NoopMetricsSink, PrometheusMetricsSink, RedisInvalidationBus, RedisRemoteStore,
    RemoteStore, TopicAliases,
};
use nexus_config::AppConfig;
use nexus_core::{NexusError, NexusResult};
use nexus_rest::{create_router_with_api, AppState};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Application builder for constructing the server.
pub struct AppBuilder {
    config: Option<AppConfig>,
    metrics: Option<PrometheusHandle>,
    api: Router,
}

impl AppBuilder {
    /// Creates a new application builder.
    pub fn new() -> Self {
        Self {
            config: None,
            metrics: None,
            api: Router::new(),
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Records cache metrics into an installed Prometheus recorder.
    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }

    /// Adds read endpoints served through the response cache.
    pub fn with_api_routes(mut self, routes: Router) -> Self {
        self.api = self.api.merge(routes);
        self
    }

    /// Connects the remote tier and the invalidation bus and wires the
    /// cache. With Redis disabled both run in process.
    pub async fn build(self) -> NexusResult<App> {
        let config = self.config.unwrap_or_default();
        let aliases = TopicAliases::new(config.caching.topic_aliases.clone());

        let (store, bus): (Arc<dyn RemoteStore>, Arc<dyn InvalidationBus>) = if config.redis.enabled {
            let pool = create_pool(&config.redis).await?;
            let bus = RedisInvalidationBus::new(pool.clone(), &config.redis.url, &aliases)?;
            (Arc::new(RedisRemoteStore::new(pool)), Arc::new(bus))
        } else {
            warn!("Redis disabled, using in-process remote store and invalidation bus");
            (
                Arc::new(InMemoryRemoteStore::new()),
                Arc::new(LocalInvalidationBus::default()),
            )
        };

        let metrics_sink: Arc<dyn MetricsSink> = match self.metrics {
            Some(_) => Arc::new(PrometheusMetricsSink::new()),
            None => Arc::new(NoopMetricsSink),
        };

        let cache = Arc::new(CachingService::new(
            store,
            CacheSettings::from_config(&config),
            metrics_sink,
        ));
        let policies = InvalidationPolicies::from_config(&config.caching);
        info!(rules = policies.rules().len(), "Invalidation policies loaded");

        let subscriber = Arc::new(InvalidationSubscriber::new(Arc::clone(&cache), policies, aliases));
        let publisher = InvalidationPublisher::new(Arc::clone(&bus));
        let warmer = CacheWarmer::new(Arc::clone(&cache), publisher.clone());

        Ok(App {
            config,
            cache,
            bus,
            publisher,
            subscriber,
            warmer,
            metrics: self.metrics,
            api: self.api,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A wired application, ready to serve.
pub struct App {
    pub config: AppConfig,
    pub cache: Arc<CachingService>,
    pub bus: Arc<dyn InvalidationBus>,
    pub publisher: InvalidationPublisher,
    pub subscriber: Arc<InvalidationSubscriber>,
    pub warmer: CacheWarmer,
    metrics: Option<PrometheusHandle>,
    api: Router,
}

impl App {
    /// Admin router over this application's state, plus the cached API
    /// routes.
    pub fn router(&self) -> Router {
        let mut state = AppState::new(Arc::clone(&self.cache), self.publisher.clone());
        if let Some(handle) = &self.metrics {
            state = state.with_metrics(handle.clone());
        }
        create_router_with_api(state, &self.config, self.api.clone())
    }

    /// Spawns the invalidation subscriber.
    pub fn start_subscriber(&self) -> JoinHandle<()> {
        Arc::clone(&self.subscriber).start(Arc::clone(&self.bus))
    }

    /// Serves HTTP until `shutdown` resolves, with the invalidation
    /// subscriber running alongside.
    pub async fn serve<F>(self, shutdown: F) -> NexusResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let subscriber_task = self.start_subscriber();
        let router = self.router();

        let addr = self.config.server.addr();
        info!("Starting REST server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| NexusError::Internal(format!("Failed to bind {}: {}", addr, e)))?;

        let result = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| NexusError::Internal(format!("REST server error: {}", e)));

        subscriber_task.abort();
        info!("Server shutdown complete");
        result
    }
}
