//! HTTP middleware.

pub mod auth;
pub mod logging;
pub mod response_cache;

pub use auth::{admin_auth_middleware, AdminAuthState};
pub use logging::logging_middleware;
pub use response_cache::{response_cache_middleware, ResponseCache};
