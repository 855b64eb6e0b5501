//! Redis Pub/Sub invalidation bus.

use super::bus::{BusMessage, InvalidationBus};
use super::event::{TopicAliases, DELETE_CACHE_KEYS_TOPIC, REFRESH_CACHE_KEY_TOPIC};
use async_trait::async_trait;
use deadpool_redis::{redis::AsyncCommands, Pool};
use futures::stream::{BoxStream, StreamExt};
use nexus_core::{NexusError, NexusResult};
use tracing::{debug, info, warn};

/// Publishes through the shared connection pool and subscribes on a
/// dedicated Pub/Sub connection per subscription.
///
/// ```text
/// Instance 1: PUBLISH deleteCacheKeys ["foo"]
///   ↓
/// Instance 1: subscriber drops "foo" from its local tier
/// Instance 2: subscriber drops "foo" from its local tier
/// ```
#[derive(Clone)]
pub struct RedisInvalidationBus {
    pool: Pool,
    client: redis::Client,
    channels: Vec<String>,
}

impl RedisInvalidationBus {
    /// Creates a bus listening on the two invalidation topics and every
    /// alias topic.
    pub fn new(pool: Pool, redis_url: &str, aliases: &TopicAliases) -> NexusResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| NexusError::Configuration(format!("Invalid Redis URL: {}", e)))?;

        let mut channels = vec![DELETE_CACHE_KEYS_TOPIC.to_string(), REFRESH_CACHE_KEY_TOPIC.to_string()];
        let mut alias_topics: Vec<String> = aliases.topics().map(str::to_string).collect();
        alias_topics.sort();
        channels.extend(alias_topics);

        Ok(Self { pool, client, channels })
    }

    /// Channels a subscription listens on.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }
}

#[async_trait]
impl InvalidationBus for RedisInvalidationBus {
    async fn publish(&self, topic: &str, payload: &str) -> NexusResult<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| NexusError::Bus(format!("Failed to get Redis connection: {}", e)))?;

        let receivers: i64 = conn
            .publish(topic, payload)
            .await
            .map_err(|e| NexusError::Bus(format!("Failed to publish on '{}': {}", topic, e)))?;

        debug!(topic, receivers, "Published invalidation");
        Ok(())
    }

    async fn subscribe(&self) -> NexusResult<BoxStream<'static, BusMessage>> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| NexusError::Bus(format!("Failed to open pub/sub connection: {}", e)))?;

        for channel in &self.channels {
            pubsub
                .subscribe(channel)
                .await
                .map_err(|e| NexusError::Bus(format!("Failed to subscribe to '{}': {}", channel, e)))?;
        }

        info!(channels = ?self.channels, "Subscribed to invalidation channels");

        let messages = pubsub.into_on_message().filter_map(|msg| async move {
            let topic = msg.get_channel_name().to_string();
            match msg.get_payload::<String>() {
                Ok(payload) => Some(BusMessage { topic, payload }),
                Err(e) => {
                    warn!(topic = %topic, error = %e, "Failed to read invalidation payload");
                    None
                }
            }
        });

        Ok(messages.boxed())
    }
}
