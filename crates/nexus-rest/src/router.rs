//! Main application router.

use crate::{
    controllers::{caching_controller, health_controller, metrics_controller::render_metrics},
    middleware::{
        admin_auth_middleware, logging_middleware, response_cache_middleware, AdminAuthState,
        ResponseCache,
    },
    openapi::ApiDoc,
    state::AppState,
};
use axum::{http::HeaderValue, middleware, routing::get, Router};
use nexus_config::{AppConfig, ServerConfig};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Creates the main application router.
///
/// `/caching` requires an admin token; health probes, the metrics endpoint
/// and the API docs are public.
pub fn create_router(state: AppState, config: &AppConfig) -> Router {
    create_router_with_api(state, config, Router::new())
}

/// Creates the main application router with additional read endpoints.
///
/// GET responses of `api` are cached in the local tier for
/// `caching.response_cache_ttl_secs` and concurrent identical requests
/// share one handler run.
pub fn create_router_with_api(state: AppState, config: &AppConfig, api: Router) -> Router {
    let responses = ResponseCache::new(state.cache.clone(), config.caching.response_cache_ttl());
    let api = api.layer(middleware::from_fn_with_state(responses, response_cache_middleware));

    let cors = create_cors_layer(&config.server);
    let auth_state = AdminAuthState::new(config.security.admin_tokens.iter().cloned());

    let admin_router = caching_controller::router()
        .layer(middleware::from_fn_with_state(auth_state, admin_auth_middleware));

    let mut router = Router::new()
        // Health endpoints (no auth required)
        .merge(health_controller::router())
        .nest("/caching", admin_router);

    if config.observability.metrics_enabled {
        router = router.route(&config.observability.metrics_path, get(render_metrics));
    }

    let router = router
        .with_state(state)
        .merge(api)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(root))
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(logging_middleware));

    info!("Router created with /caching admin endpoints and Swagger UI at /swagger-ui");
    router
}

/// Creates a CORS layer based on server configuration.
fn create_cors_layer(server_config: &ServerConfig) -> CorsLayer {
    if !server_config.cors_enabled {
        return CorsLayer::new();
    }

    if server_config.cors_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = server_config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Root endpoint handler.
async fn root() -> &'static str {
    "Nexus gateway cache admin API"
}
