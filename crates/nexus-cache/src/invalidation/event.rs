//! Invalidation events and their wire format.

use crate::ttl;
use nexus_core::{NexusError, NexusResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Topic carrying a JSON array of keys to delete.
pub const DELETE_CACHE_KEYS_TOPIC: &str = "deleteCacheKeys";

/// Topic carrying `{ "key": string, "ttl": seconds }`.
pub const REFRESH_CACHE_KEY_TOPIC: &str = "refreshCacheKey";

/// A change every instance must apply to its local tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationEvent {
    /// Drop (or refresh, for hot keys) each key. Entries ending in `*` are
    /// expanded by the receiver at delivery time.
    DeleteKeys(Vec<String>),
    /// Re-read `key` from the remote tier into the local tier.
    RefreshKey {
        /// Key to refresh.
        key: String,
        /// Local TTL of the refreshed copy.
        ttl: Duration,
    },
}

#[derive(Serialize, Deserialize)]
struct RefreshPayload {
    key: String,
    ttl: u64,
}

impl InvalidationEvent {
    /// Topic the event is published on.
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::DeleteKeys(_) => DELETE_CACHE_KEYS_TOPIC,
            Self::RefreshKey { .. } => REFRESH_CACHE_KEY_TOPIC,
        }
    }

    /// JSON payload of the event.
    pub fn payload(&self) -> NexusResult<String> {
        let json = match self {
            Self::DeleteKeys(keys) => serde_json::to_string(keys)?,
            Self::RefreshKey { key, ttl } => serde_json::to_string(&RefreshPayload {
                key: key.clone(),
                ttl: ttl.as_secs(),
            })?,
        };
        Ok(json)
    }

    /// Decodes a bus message. Alias topics resolve to a `DeleteKeys` for the
    /// keys derived from their argument. A refresh TTL above
    /// [`ttl::MAX_TTL_SECS`] is rejected.
    pub fn from_message(topic: &str, payload: &str, aliases: &TopicAliases) -> NexusResult<Self> {
        match topic {
            DELETE_CACHE_KEYS_TOPIC => {
                let keys: Vec<String> = serde_json::from_str(payload)?;
                Ok(Self::DeleteKeys(keys))
            }
            REFRESH_CACHE_KEY_TOPIC => {
                let RefreshPayload { key, ttl: secs } = serde_json::from_str(payload)?;
                Ok(Self::RefreshKey {
                    key,
                    ttl: ttl::from_secs(secs)?,
                })
            }
            other => aliases
                .resolve(other, payload)?
                .map(Self::DeleteKeys)
                .ok_or_else(|| NexusError::validation(format!("Unknown invalidation topic '{}'", other))),
        }
    }
}

/// Domain topics that stand for a `DeleteKeys` on one derived key.
///
/// Each alias maps to a key template whose `{}` is replaced by the message
/// argument, so `nftsCountChanged` with `"erd1..."` and template
/// `nftsCount:{}` deletes `nftsCount:erd1...`.
#[derive(Debug, Clone, Default)]
pub struct TopicAliases {
    templates: HashMap<String, String>,
}

impl TopicAliases {
    /// Creates the alias table.
    #[must_use]
    pub fn new(templates: HashMap<String, String>) -> Self {
        Self { templates }
    }

    /// Alias topic names.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    fn template(&self, topic: &str) -> Option<&str> {
        self.templates
            .get(topic)
            .or_else(|| {
                self.templates
                    .iter()
                    .find(|(alias, _)| alias.eq_ignore_ascii_case(topic))
                    .map(|(_, template)| template)
            })
            .map(String::as_str)
    }

    /// Keys named by an alias message. `Ok(None)` if `topic` is not an
    /// alias. The payload is a JSON string or number, or an array of them.
    pub fn resolve(&self, topic: &str, payload: &str) -> NexusResult<Option<Vec<String>>> {
        let Some(template) = self.template(topic) else {
            return Ok(None);
        };

        let args = match serde_json::from_str::<Value>(payload)? {
            Value::Array(items) => items,
            single => vec![single],
        };

        let keys = args
            .into_iter()
            .map(|arg| match arg {
                Value::String(s) => Ok(template.replace("{}", &s)),
                Value::Number(n) => Ok(template.replace("{}", &n.to_string())),
                other => Err(NexusError::validation(format!(
                    "Unsupported argument {} for topic '{}'",
                    other, topic
                ))),
            })
            .collect::<NexusResult<Vec<_>>>()?;

        Ok(Some(keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases() -> TopicAliases {
        TopicAliases::new(HashMap::from([(
            "nftsCountChanged".to_string(),
            "nftsCount:{}".to_string(),
        )]))
    }

    #[test]
    fn test_delete_keys_wire_format() {
        let event = InvalidationEvent::DeleteKeys(vec!["foo".to_string(), "tok:*".to_string()]);
        assert_eq!(event.topic(), "deleteCacheKeys");
        assert_eq!(event.payload().unwrap(), r#"["foo","tok:*"]"#);

        let decoded = InvalidationEvent::from_message("deleteCacheKeys", r#"["foo","tok:*"]"#, &aliases()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_refresh_key_wire_format() {
        let decoded = InvalidationEvent::from_message(
            "refreshCacheKey",
            r#"{"key":"economics","ttl":600}"#,
            &aliases(),
        )
        .unwrap();

        assert_eq!(
            decoded,
            InvalidationEvent::RefreshKey {
                key: "economics".to_string(),
                ttl: Duration::from_secs(600),
            }
        );
        assert_eq!(decoded.payload().unwrap(), r#"{"key":"economics","ttl":600}"#);
    }

    #[test]
    fn test_alias_topic_resolves_to_delete() {
        let decoded = InvalidationEvent::from_message("nftsCountChanged", r#""erd1qq""#, &aliases()).unwrap();
        assert_eq!(decoded, InvalidationEvent::DeleteKeys(vec!["nftsCount:erd1qq".to_string()]));

        let decoded = InvalidationEvent::from_message("nftscountchanged", "[1, 2]", &aliases()).unwrap();
        assert_eq!(
            decoded,
            InvalidationEvent::DeleteKeys(vec!["nftsCount:1".to_string(), "nftsCount:2".to_string()])
        );
    }

    #[test]
    fn test_refresh_ttl_out_of_range_is_rejected() {
        let result = InvalidationEvent::from_message(
            "refreshCacheKey",
            r#"{"key":"economics","ttl":18446744073709551615}"#,
            &aliases(),
        );
        assert!(matches!(result, Err(NexusError::Validation(_))));
    }

    #[test]
    fn test_unknown_topic_and_bad_payload() {
        assert!(InvalidationEvent::from_message("somethingElse", "[]", &aliases()).is_err());
        assert!(matches!(
            InvalidationEvent::from_message("deleteCacheKeys", "not json", &aliases()),
            Err(NexusError::Serialization(_))
        ));
    }
}
