//! Cache metrics.
//!
//! The orchestrator reports through a [`MetricsSink`] handed to it at
//! construction. [`PrometheusMetricsSink`] forwards to the `metrics` facade,
//! which the server binds to a Prometheus recorder.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Metric names for the cache.
pub mod names {
    /// Remote store round-trip duration in seconds.
    pub const REMOTE_OPERATION_DURATION: &str = "nexus_cache_remote_operation_duration_seconds";
    /// Total cache hits, labelled by tier.
    pub const HITS_TOTAL: &str = "nexus_cache_hits_total";
    /// Total full misses (neither tier had the key).
    pub const MISSES_TOTAL: &str = "nexus_cache_misses_total";
    /// Total callers that joined an operation already in flight.
    pub const COALESCED_TOTAL: &str = "nexus_cache_coalesced_total";
}

/// Cache tier a hit was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    /// Process-local tier.
    Local,
    /// Shared remote tier.
    Remote,
}

impl CacheTier {
    /// Label value for this tier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

/// Receiver for cache measurements.
pub trait MetricsSink: Send + Sync {
    /// One remote store round trip.
    fn record_remote_operation(&self, operation: &'static str, duration: Duration);

    /// A lookup served from `tier`.
    fn record_hit(&self, tier: CacheTier);

    /// A lookup that missed both tiers.
    fn record_miss(&self);

    /// A caller joined an in-flight operation of the given kind.
    fn record_coalesced(&self, kind: &'static str);
}

/// Sink that drops every measurement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_remote_operation(&self, _operation: &'static str, _duration: Duration) {}
    fn record_hit(&self, _tier: CacheTier) {}
    fn record_miss(&self) {}
    fn record_coalesced(&self, _kind: &'static str) {}
}

/// Sink backed by the `metrics` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetricsSink;

impl PrometheusMetricsSink {
    /// Creates the sink and describes its metrics with the installed recorder.
    #[must_use]
    pub fn new() -> Self {
        register_metrics();
        Self
    }
}

impl MetricsSink for PrometheusMetricsSink {
    fn record_remote_operation(&self, operation: &'static str, duration: Duration) {
        histogram!(names::REMOTE_OPERATION_DURATION, "operation" => operation)
            .record(duration.as_secs_f64());
    }

    fn record_hit(&self, tier: CacheTier) {
        counter!(names::HITS_TOTAL, "tier" => tier.as_str()).increment(1);
    }

    fn record_miss(&self) {
        counter!(names::MISSES_TOTAL).increment(1);
    }

    fn record_coalesced(&self, kind: &'static str) {
        counter!(names::COALESCED_TOTAL, "kind" => kind).increment(1);
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_histogram!(
        names::REMOTE_OPERATION_DURATION,
        "Remote store round-trip duration in seconds"
    );
    describe_counter!(names::HITS_TOTAL, "Total number of cache hits by tier");
    describe_counter!(names::MISSES_TOTAL, "Total number of lookups that missed both tiers");
    describe_counter!(
        names::COALESCED_TOTAL,
        "Total number of callers that joined an in-flight operation"
    );
}
