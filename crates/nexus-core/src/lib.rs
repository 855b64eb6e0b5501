//! # Nexus Core
//!
//! Foundational types shared by every Nexus crate: the unified error type,
//! its HTTP-facing representation, and logging initialisation.

pub mod error;
pub mod telemetry;

pub use error::*;
pub use telemetry::*;
