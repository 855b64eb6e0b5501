//! Cache administration controller.

use crate::{
    responses::{ok, ApiResult, AppError},
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use nexus_cache::{pattern, ttl};
use nexus_core::{ErrorResponse, NexusError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

/// Body of `PUT /caching/{key}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CacheWrite {
    /// Any JSON value.
    #[schema(value_type = Object)]
    pub value: Value,
    /// Remote TTL in seconds, at most one year.
    pub ttl: u64,
}

/// Keys affected by an operation, or matched by a listing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CacheKeysResponse {
    pub keys: Vec<String>,
}

/// Query of `GET /caching`.
#[derive(Debug, Deserialize, IntoParams)]
pub struct KeysQuery {
    /// Substring the listed keys must contain.
    pub keys: Option<String>,
}

/// Creates the caching router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_keys).delete(flush_cache))
        .route("/:key", get(get_cache).put(update_cache).delete(delete_cache))
}

/// Read one key, local tier first.
#[utoipa::path(
    get,
    path = "/caching/{key}",
    tag = "caching",
    params(("key" = String, Path, description = "Cache key")),
    responses(
        (status = 200, description = "The cached value"),
        (status = 404, description = "Key not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_cache(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<Value> {
    debug!("Get cache request: {}", key);

    let value = state
        .cache
        .get::<Value>(&key)
        .await?
        .ok_or_else(|| NexusError::not_found("cache key", &key))?;
    ok(value)
}

/// Overwrite one key in the remote tier and invalidate it everywhere.
#[utoipa::path(
    put,
    path = "/caching/{key}",
    tag = "caching",
    params(("key" = String, Path, description = "Cache key")),
    request_body = CacheWrite,
    responses(
        (status = 200, description = "Key updated and invalidated", body = CacheKeysResponse),
        (status = 400, description = "Invalid TTL", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_cache(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<CacheWrite>,
) -> ApiResult<CacheKeysResponse> {
    debug!("Update cache request: {} (ttl {}s)", key, request.ttl);

    if request.ttl == 0 {
        return Err(AppError(NexusError::validation("ttl must be at least one second")));
    }
    let ttl = ttl::from_secs(request.ttl)?;

    state.cache.set_remote(&key, &request.value, ttl).await?;

    let keys = vec![key];
    state.publisher.delete_keys(keys.clone()).await?;
    ok(CacheKeysResponse { keys })
}

/// Delete one key, or every key matching a trailing `*`, from both tiers.
#[utoipa::path(
    delete,
    path = "/caching/{key}",
    tag = "caching",
    params(("key" = String, Path, description = "Cache key or pattern")),
    responses(
        (status = 200, description = "Keys removed", body = CacheKeysResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_cache(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<CacheKeysResponse> {
    debug!("Delete cache request: {}", key);

    let keys = state.cache.delete(&key).await?;
    state.publisher.delete_keys(keys.clone()).await?;
    ok(CacheKeysResponse { keys })
}

/// List remote keys containing a substring, matched literally. Without a
/// query nothing is listed.
#[utoipa::path(
    get,
    path = "/caching",
    tag = "caching",
    params(KeysQuery),
    responses(
        (status = 200, description = "Matching keys", body = CacheKeysResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_keys(
    State(state): State<AppState>,
    Query(query): Query<KeysQuery>,
) -> ApiResult<CacheKeysResponse> {
    let keys = match query.keys.as_deref() {
        Some(fragment) if !fragment.is_empty() => {
            state
                .cache
                .keys(&format!("*{}*", pattern::escape(fragment)))
                .await?
        }
        _ => Vec::new(),
    };
    ok(CacheKeysResponse { keys })
}

/// Clear both tiers on every instance.
#[utoipa::path(
    delete,
    path = "/caching",
    tag = "caching",
    responses(
        (status = 200, description = "Cache flushed", body = CacheKeysResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn flush_cache(State(state): State<AppState>) -> ApiResult<CacheKeysResponse> {
    state.cache.flush().await?;

    let keys = vec!["*".to_string()];
    state.publisher.delete_keys(keys.clone()).await?;
    info!("Cache flushed by admin request");
    ok(CacheKeysResponse { keys })
}
