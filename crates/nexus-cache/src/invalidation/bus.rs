//! Publish/subscribe transport for invalidation messages.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use nexus_core::NexusResult;
use tokio::sync::broadcast;
use tracing::warn;

/// A raw message as delivered by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Channel the message was published on.
    pub topic: String,
    /// JSON payload.
    pub payload: String,
}

impl BusMessage {
    /// Creates a message.
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Fan-out transport reaching every gateway instance, the publisher included.
#[async_trait]
pub trait InvalidationBus: Send + Sync {
    /// Publishes a payload on `topic`.
    async fn publish(&self, topic: &str, payload: &str) -> NexusResult<()>;

    /// Opens a subscription. The stream ends when the connection is lost.
    async fn subscribe(&self) -> NexusResult<BoxStream<'static, BusMessage>>;
}

const DEFAULT_CAPACITY: usize = 1024;

/// In-process bus for single-instance deployments and tests.
#[derive(Debug, Clone)]
pub struct LocalInvalidationBus {
    sender: broadcast::Sender<BusMessage>,
}

impl Default for LocalInvalidationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LocalInvalidationBus {
    /// Creates a bus buffering up to `capacity` undelivered messages per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Number of open subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl InvalidationBus for LocalInvalidationBus {
    async fn publish(&self, topic: &str, payload: &str) -> NexusResult<()> {
        // No subscribers is not an error: nothing holds a local copy yet.
        let _ = self.sender.send(BusMessage::new(topic, payload));
        Ok(())
    }

    async fn subscribe(&self) -> NexusResult<BoxStream<'static, BusMessage>> {
        let receiver = self.sender.subscribe();

        let messages = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => return Some((message, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Invalidation subscriber lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(messages.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_receives_messages() {
        let bus = LocalInvalidationBus::default();
        let mut first = bus.subscribe().await.unwrap();
        let mut second = bus.subscribe().await.unwrap();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish("deleteCacheKeys", r#"["a"]"#).await.unwrap();

        let expected = BusMessage::new("deleteCacheKeys", r#"["a"]"#);
        assert_eq!(first.next().await, Some(expected.clone()));
        assert_eq!(second.next().await, Some(expected));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = LocalInvalidationBus::default();
        assert!(bus.publish("deleteCacheKeys", "[]").await.is_ok());
    }

    #[tokio::test]
    async fn test_lagged_subscriber_keeps_receiving() {
        let bus = LocalInvalidationBus::new(2);
        let mut messages = bus.subscribe().await.unwrap();

        for i in 0..5 {
            bus.publish("deleteCacheKeys", &format!(r#"["k{}"]"#, i)).await.unwrap();
        }

        let next = messages.next().await.unwrap();
        assert_eq!(next.payload, r#"["k3"]"#);
    }
}
