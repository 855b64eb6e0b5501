//! Unified error types for every layer of the gateway cache.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// Result alias used across the workspace.
pub type NexusResult<T> = Result<T, NexusError>;

/// Unified error type for Nexus.
///
/// The type is `Clone` because a single failed coalesced operation is
/// delivered to every caller that joined it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NexusError {
    // ============ Request Errors ============
    /// Resource not found
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unauthorized access
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden access
    #[error("Forbidden: {0}")]
    Forbidden(String),

    // ============ Infrastructure Errors ============
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Remote store transport error (connection loss, timeout, protocol error).
    #[error("Cache error: {0}")]
    Cache(String),

    /// A value could not be (de)serialized at the JSON boundary.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The wrapped upstream fetch (producer or batch handler) failed.
    #[error("Upstream error: {source_name} - {message}")]
    Upstream {
        source_name: String,
        message: String,
    },

    /// Message bus transport error.
    #[error("Message bus error: {0}")]
    Bus(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // ============ Internal Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NexusError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::Upstream { .. } => 502,
            Self::Timeout(_) => 503,
            Self::Configuration(_)
            | Self::Cache(_)
            | Self::Serialization(_)
            | Self::Bus(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Cache(_) => "CACHE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::Bus(_) => "MESSAGE_BUS_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a not found error for a resource.
    #[must_use]
    pub fn not_found<T: ToString>(resource_type: &'static str, id: T) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized<T: Into<String>>(message: T) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Creates an upstream error naming the failing source.
    #[must_use]
    pub fn upstream<S: Into<String>, M: Into<String>>(source_name: S, message: M) -> Self {
        Self::Upstream {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// True for remote-store transport failures, the only errors `get_or_set`
    /// degrades on instead of propagating.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Cache(_) | Self::Timeout(_))
    }
}

impl From<serde_json::Error> for NexusError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Serializable error response for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    /// Creates a new error response from a `NexusError`.
    #[must_use]
    pub fn from_error(error: &NexusError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

impl From<&NexusError> for ErrorResponse {
    fn from(error: &NexusError) -> Self {
        Self::from_error(error)
    }
}
