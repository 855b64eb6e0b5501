//! # Nexus Cache
//!
//! Two-tier cache for a read-heavy gateway: a process-local tier in front of
//! a shared Redis tier, with per-key request coalescing, a bounded-concurrency
//! batch engine, TTL jitter, and invalidation broadcast across instances.
//!
//! [`CachingService`] is the entry point. Invalidation events travel over an
//! [`InvalidationBus`] and are applied on every instance by an
//! [`InvalidationSubscriber`].

pub mod batch;
pub mod coalescer;
pub mod invalidation;
pub mod keys;
pub mod local;
pub mod metrics;
pub mod pattern;
pub mod remote;
pub mod retry;
mod service;
pub mod ttl;

pub use batch::{spread_ttl, BatchOptions};
pub use coalescer::Coalescer;
pub use invalidation::{
    BusMessage, CacheWarmer, InvalidationBus, InvalidationEvent, InvalidationPolicies, InvalidationPolicy,
    InvalidationPublisher, InvalidationSubscriber, LocalInvalidationBus, RedisInvalidationBus,
    TopicAliases,
};
pub use keys::CacheInfo;
pub use local::LocalStore;
pub use metrics::{CacheTier, MetricsSink, NoopMetricsSink, PrometheusMetricsSink};
pub use remote::{
    create_pool, InMemoryRemoteStore, MeteredRemoteStore, RedisRemoteStore, RemoteCache,
    RemoteStore,
};
pub use retry::RetryPolicy;
pub use service::{CacheSettings, CachingService, GetOrSetOptions};
