//! Response caching for idempotent GET endpoints.
//!
//! Successful responses are kept in the local tier only, keyed by request
//! URI, so every instance answers repeated reads from memory until the TTL
//! runs out. Concurrent requests for the same URI share one handler run, and
//! its failures too.

use crate::responses::AppError;
use axum::{
    body::{to_bytes, Bytes},
    extract::{Request, State},
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use nexus_cache::{CachingService, Coalescer};
use nexus_core::{NexusError, NexusResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "response:";

/// Response as shared between coalesced requests.
#[derive(Clone)]
struct SharedResponse {
    status: StatusCode,
    content_type: Option<HeaderValue>,
    body: Bytes,
}

/// Response as stored in the local tier.
#[derive(Serialize, Deserialize)]
struct CachedResponse {
    status: u16,
    content_type: Option<String>,
    body: String,
}

impl SharedResponse {
    async fn collect(response: Response) -> NexusResult<Self> {
        let (parts, body) = response.into_parts();
        let body = to_bytes(body, usize::MAX)
            .await
            .map_err(|e| NexusError::internal(format!("Failed to buffer response body: {}", e)))?;

        Ok(Self {
            status: parts.status,
            content_type: parts.headers.get(CONTENT_TYPE).cloned(),
            body,
        })
    }

    /// Only text bodies fit the local tier's JSON values.
    fn to_cached(&self) -> Option<CachedResponse> {
        let body = std::str::from_utf8(&self.body).ok()?;
        let content_type = match &self.content_type {
            Some(value) => Some(value.to_str().ok()?.to_string()),
            None => None,
        };

        Some(CachedResponse {
            status: self.status.as_u16(),
            content_type,
            body: body.to_string(),
        })
    }
}

impl From<CachedResponse> for SharedResponse {
    fn from(cached: CachedResponse) -> Self {
        Self {
            status: StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK),
            content_type: cached
                .content_type
                .and_then(|value| HeaderValue::from_str(&value).ok()),
            body: Bytes::from(cached.body),
        }
    }
}

impl IntoResponse for SharedResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        match self.content_type {
            Some(content_type) => {
                response.headers_mut().insert(CONTENT_TYPE, content_type);
            }
            None => {
                response.headers_mut().remove(CONTENT_TYPE);
            }
        }
        response
    }
}

/// State of [`response_cache_middleware`].
#[derive(Clone)]
pub struct ResponseCache {
    cache: Arc<CachingService>,
    pending: Arc<Coalescer<SharedResponse>>,
    ttl: Duration,
}

impl ResponseCache {
    /// Caches successful GET responses in the local tier of `cache` for
    /// `ttl`. A zero TTL only coalesces.
    pub fn new(cache: Arc<CachingService>, ttl: Duration) -> Self {
        let pending = Arc::new(Coalescer::new("response", cache.metrics()));
        Self {
            cache,
            pending,
            ttl,
        }
    }

    /// Number of URIs with a request in flight.
    pub fn pending_len(&self) -> usize {
        self.pending.pending_len()
    }
}

/// Serves GET requests from the local tier and collapses concurrent
/// identical requests into one handler run. Other methods pass through.
pub async fn response_cache_middleware(
    State(responses): State<ResponseCache>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let key = format!("{}{}", KEY_PREFIX, request.uri());
    if let Some(cached) = responses.cache.get_local::<CachedResponse>(&key) {
        debug!(key = %key, "Serving cached response");
        return SharedResponse::from(cached).into_response();
    }

    let cache = Arc::clone(&responses.cache);
    let ttl = responses.ttl;
    let owned_key = key.clone();

    let result = responses
        .pending
        .run_exclusive(&key, move || async move {
            let response = SharedResponse::collect(next.run(request).await).await?;

            if response.status.is_success() && !ttl.is_zero() {
                match response.to_cached() {
                    Some(cached) => {
                        if let Err(e) = cache.set_local(&owned_key, &cached, ttl) {
                            warn!(key = %owned_key, error = %e, "Failed to cache response");
                        }
                    }
                    None => debug!(key = %owned_key, "Response body is not text, not cached"),
                }
            }

            Ok(response)
        })
        .await;

    match result {
        Ok(response) => response.into_response(),
        Err(e) => AppError(e).into_response(),
    }
}
