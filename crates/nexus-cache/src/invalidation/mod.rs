//! Cross-instance invalidation.
//!
//! A writer that changes or deletes cached state publishes an
//! [`InvalidationEvent`]. Every instance, the publisher included, runs an
//! [`InvalidationSubscriber`] that applies the event to its local tier,
//! either dropping the key or re-reading it from the remote tier depending on
//! the [`InvalidationPolicies`] table. A [`CacheWarmer`] writes fresh values
//! ahead of expiry and broadcasts a refresh for them.

mod bus;
mod event;
mod policy;
mod publisher;
mod redis_bus;
mod subscriber;
mod warmer;

pub use bus::{BusMessage, InvalidationBus, LocalInvalidationBus};
pub use event::{InvalidationEvent, TopicAliases, DELETE_CACHE_KEYS_TOPIC, REFRESH_CACHE_KEY_TOPIC};
pub use policy::{InvalidationPolicies, InvalidationPolicy, InvalidationRule};
pub use publisher::InvalidationPublisher;
pub use redis_bus::RedisInvalidationBus;
pub use subscriber::InvalidationSubscriber;
pub use warmer::CacheWarmer;
