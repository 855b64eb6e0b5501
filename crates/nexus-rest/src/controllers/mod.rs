//! REST API controllers.

pub mod caching_controller;
pub mod health_controller;
pub mod metrics_controller;

pub use caching_controller::{CacheKeysResponse, CacheWrite};
pub use health_controller::*;
