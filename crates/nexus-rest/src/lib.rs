//! # Nexus REST
//!
//! Admin HTTP surface of the gateway cache: inspect, overwrite, delete and
//! flush cached keys, plus health probes and the Prometheus scrape endpoint.

pub mod controllers;
pub mod middleware;
pub mod openapi;
pub mod responses;
pub mod router;
pub mod state;

pub use router::*;
pub use state::*;
