//! # Nexus Server Library
//!
//! Wires the cache, the invalidation bus and the admin API into a runnable
//! server.

pub mod app;
pub mod startup;

pub use app::{App, AppBuilder};
