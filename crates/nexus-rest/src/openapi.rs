//! OpenAPI documentation for the admin surface.

use crate::controllers::{CacheKeysResponse, CacheWrite, HealthResponse};
use nexus_core::ErrorResponse;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// OpenAPI documentation for the Nexus cache admin API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Nexus Gateway Cache Admin API",
        version = "1.0.0",
        description = "Inspection and invalidation of the gateway's two-tier cache",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    paths(
        crate::controllers::caching_controller::get_cache,
        crate::controllers::caching_controller::update_cache,
        crate::controllers::caching_controller::delete_cache,
        crate::controllers::caching_controller::list_keys,
        crate::controllers::caching_controller::flush_cache,
        crate::controllers::health_controller::health_check,
        crate::controllers::health_controller::readiness_check,
        crate::controllers::health_controller::liveness_check,
    ),
    components(
        schemas(
            ErrorResponse,
            CacheWrite,
            CacheKeysResponse,
            HealthResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "caching", description = "Cache administration, admin token required"),
        (name = "health", description = "Health check endpoints")
    )
)]
pub struct ApiDoc;

/// Bearer scheme for admin tokens.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("Admin token from security.admin_tokens"))
                        .build(),
                ),
            );
        }
    }
}
