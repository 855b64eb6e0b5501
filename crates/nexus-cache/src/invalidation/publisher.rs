//! Publishing side of invalidation.

use super::bus::InvalidationBus;
use super::event::InvalidationEvent;
use nexus_core::NexusResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Announces cache changes to every instance.
#[derive(Clone)]
pub struct InvalidationPublisher {
    bus: Arc<dyn InvalidationBus>,
}

impl InvalidationPublisher {
    /// Creates a publisher over `bus`.
    pub fn new(bus: Arc<dyn InvalidationBus>) -> Self {
        Self { bus }
    }

    /// Publishes an event on its topic.
    pub async fn publish(&self, event: &InvalidationEvent) -> NexusResult<()> {
        let payload = event.payload()?;
        debug!(topic = event.topic(), payload = %payload, "Publishing invalidation");
        self.bus.publish(event.topic(), &payload).await
    }

    /// Asks every instance to drop (or refresh, for hot keys) `keys`.
    pub async fn delete_keys(&self, keys: Vec<String>) -> NexusResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.publish(&InvalidationEvent::DeleteKeys(keys)).await
    }

    /// Asks every instance to re-read `key` into its local tier.
    pub async fn refresh_key(&self, key: impl Into<String>, ttl: Duration) -> NexusResult<()> {
        self.publish(&InvalidationEvent::RefreshKey { key: key.into(), ttl })
            .await
    }

    /// Publishes a domain alias topic with a JSON argument.
    pub async fn alias(&self, topic: &str, argument: &serde_json::Value) -> NexusResult<()> {
        let payload = serde_json::to_string(argument)?;
        self.bus.publish(topic, &payload).await
    }
}
