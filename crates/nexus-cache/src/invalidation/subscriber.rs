//! Subscribing side of invalidation: applies events to the local tier.

use super::bus::{BusMessage, InvalidationBus};
use super::event::{InvalidationEvent, TopicAliases};
use super::policy::{InvalidationPolicies, InvalidationPolicy};
use crate::pattern;
use crate::service::CachingService;
use futures::stream::{BoxStream, StreamExt};
use nexus_core::NexusResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Applies invalidation events to this instance's local tier.
///
/// Remote state is never touched here: the publisher already changed it.
pub struct InvalidationSubscriber {
    cache: Arc<CachingService>,
    policies: InvalidationPolicies,
    aliases: TopicAliases,
}

impl InvalidationSubscriber {
    /// Creates a subscriber.
    pub fn new(cache: Arc<CachingService>, policies: InvalidationPolicies, aliases: TopicAliases) -> Self {
        Self {
            cache,
            policies,
            aliases,
        }
    }

    /// Applies one event.
    ///
    /// Keys of a `DeleteKeys` event are handled by their policy: hard-deleted
    /// keys lose their local copy, soft-refresh keys are re-read from the
    /// remote tier. Patterns are expanded here, against both tiers.
    pub async fn handle(&self, event: &InvalidationEvent) {
        match event {
            InvalidationEvent::DeleteKeys(keys) => {
                for key in keys {
                    for expanded in self.expand(key).await {
                        self.apply(&expanded).await;
                    }
                }
            }
            InvalidationEvent::RefreshKey { key, ttl } => self.refresh(key, *ttl).await,
        }
    }

    /// Decodes and applies a bus message.
    pub async fn handle_message(&self, message: &BusMessage) -> NexusResult<()> {
        let event = InvalidationEvent::from_message(&message.topic, &message.payload, &self.aliases)?;
        debug!(topic = %message.topic, "Applying invalidation");
        self.handle(&event).await;
        Ok(())
    }

    /// Drains a subscription. Undecodable messages are logged and skipped.
    pub async fn run(&self, mut messages: BoxStream<'static, BusMessage>) {
        while let Some(message) = messages.next().await {
            if let Err(e) = self.handle_message(&message).await {
                warn!(topic = %message.topic, error = %e, "Ignoring invalidation message");
            }
        }
    }

    /// Subscribes to `bus` in a background task, resubscribing with
    /// exponential backoff whenever the subscription fails or ends.
    pub fn start(self: Arc<Self>, bus: Arc<dyn InvalidationBus>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff = INITIAL_BACKOFF;

            loop {
                match bus.subscribe().await {
                    Ok(messages) => {
                        info!("Invalidation subscriber connected");
                        backoff = INITIAL_BACKOFF;
                        self.run(messages).await;
                        error!(
                            backoff_secs = backoff.as_secs(),
                            "Invalidation subscription ended, reconnecting..."
                        );
                    }
                    Err(e) => {
                        error!(
                            error = %e,
                            backoff_secs = backoff.as_secs(),
                            "Invalidation subscriber error, reconnecting..."
                        );
                    }
                }

                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        })
    }

    async fn expand(&self, key: &str) -> Vec<String> {
        if !pattern::is_pattern(key) {
            return vec![key.to_string()];
        }

        let mut keys = match self.cache.keys(key).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(pattern = %key, error = %e, "Remote key listing failed, expanding locally");
                Vec::new()
            }
        };
        keys.extend(self.cache.local_keys(key));
        keys.sort();
        keys.dedup();
        keys
    }

    async fn apply(&self, key: &str) {
        match self.policies.policy_for(key) {
            InvalidationPolicy::HardDelete => {
                if self.cache.delete_local(key) {
                    debug!(key = %key, "Dropped local copy");
                }
            }
            InvalidationPolicy::SoftRefresh { ttl } => self.refresh(key, ttl).await,
        }
    }

    async fn refresh(&self, key: &str, ttl: Duration) {
        if let Err(e) = self.cache.refresh_local(key, ttl).await {
            warn!(key = %key, error = %e, "Refresh failed, dropping local copy");
            self.cache.delete_local(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invalidation::{InvalidationRule, LocalInvalidationBus};
    use crate::remote::InMemoryRemoteStore;
    use serde_json::{json, Value};

    fn setup() -> (Arc<CachingService>, InvalidationSubscriber) {
        let cache = Arc::new(CachingService::with_defaults(Arc::new(InMemoryRemoteStore::new())));
        let policies = InvalidationPolicies::new(vec![InvalidationRule::new(
            "economics",
            InvalidationPolicy::SoftRefresh {
                ttl: Duration::from_secs(60),
            },
        )]);
        let subscriber = InvalidationSubscriber::new(cache.clone(), policies, TopicAliases::default());
        (cache, subscriber)
    }

    #[tokio::test]
    async fn test_hard_delete_drops_local_only() {
        let (cache, subscriber) = setup();
        cache.set("foo", &json!(1), Duration::from_secs(60)).await.unwrap();

        subscriber
            .handle(&InvalidationEvent::DeleteKeys(vec!["foo".to_string()]))
            .await;

        assert_eq!(cache.get_local::<Value>("foo"), None);
        assert_eq!(cache.get::<Value>("foo").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_soft_refresh_rereads_remote() {
        let (cache, subscriber) = setup();
        cache.set_local("economics", &json!({"apr": 1}), Duration::from_secs(60)).unwrap();
        cache.set_remote("economics", &json!({"apr": 2}), Duration::from_secs(600)).await.unwrap();

        subscriber
            .handle(&InvalidationEvent::DeleteKeys(vec!["economics".to_string()]))
            .await;

        assert_eq!(cache.get_local::<Value>("economics"), Some(json!({"apr": 2})));
    }

    #[tokio::test]
    async fn test_pattern_expands_against_both_tiers() {
        let (cache, subscriber) = setup();
        cache.set_local("tok:1", &1, Duration::from_secs(60)).unwrap();
        cache.set_local("tok:2", &2, Duration::from_secs(60)).unwrap();
        cache.set_local("other", &3, Duration::from_secs(60)).unwrap();

        subscriber
            .handle(&InvalidationEvent::DeleteKeys(vec!["tok:*".to_string()]))
            .await;

        assert_eq!(cache.local_keys("*"), vec!["other".to_string()]);
    }

    #[tokio::test]
    async fn test_run_skips_bad_messages() {
        let (cache, subscriber) = setup();
        cache.set_local("foo", &1, Duration::from_secs(60)).unwrap();

        let bus = LocalInvalidationBus::default();
        let messages = bus.subscribe().await.unwrap();
        bus.publish("deleteCacheKeys", "not json").await.unwrap();
        bus.publish("deleteCacheKeys", r#"["foo"]"#).await.unwrap();
        drop(bus);

        subscriber.run(messages).await;

        assert_eq!(cache.get_local::<i32>("foo"), None);
    }
}
