//! Admin authentication middleware.

use crate::responses::AppError;
use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use nexus_core::NexusError;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Bearer tokens accepted on the admin surface.
#[derive(Clone, Default)]
pub struct AdminAuthState {
    tokens: Arc<HashSet<String>>,
}

impl AdminAuthState {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: Arc::new(tokens.into_iter().map(Into::into).collect()),
        }
    }

    fn accepts(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }
}

/// Rejects requests without a configured admin token.
///
/// A missing or malformed `Authorization` header is 401; a well-formed
/// bearer token that is not an admin token is 403.
pub async fn admin_auth_middleware(
    State(state): State<AdminAuthState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| NexusError::unauthorized("Missing authorization header"))?
        .strip_prefix("Bearer ")
        .ok_or_else(|| NexusError::unauthorized("Invalid authorization format"))?;

    if !state.accepts(token) {
        debug!("Rejected admin request with unknown token");
        return Err(NexusError::Forbidden("Admin role required".to_string()).into());
    }

    Ok(next.run(request).await)
}
