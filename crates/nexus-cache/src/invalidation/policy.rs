//! Hot-key table: which invalidated keys are refreshed instead of dropped.

use crate::keys::CacheInfo;
use crate::pattern;
use nexus_config::{CachingConfig, InvalidationPolicyKind};
use std::time::Duration;

/// What a subscriber does with its local copy of an invalidated key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationPolicy {
    /// Remove the local copy.
    HardDelete,
    /// Re-read the key from the remote tier and keep it locally for `ttl`.
    SoftRefresh {
        /// Local TTL of the refreshed copy.
        ttl: Duration,
    },
}

/// One row of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRule {
    /// Exact key or glob pattern.
    pub pattern: String,
    /// Policy for matching keys.
    pub policy: InvalidationPolicy,
}

impl InvalidationRule {
    /// Creates a rule.
    pub fn new(pattern: impl Into<String>, policy: InvalidationPolicy) -> Self {
        Self {
            pattern: pattern.into(),
            policy,
        }
    }

    /// Soft-refresh rule for a catalogue entry, reusing its TTL.
    #[must_use]
    pub fn soft_refresh(info: &CacheInfo) -> Self {
        Self::new(info.key.clone(), InvalidationPolicy::SoftRefresh { ttl: info.ttl })
    }
}

/// Ordered rule table. The first matching rule wins; keys matching no rule
/// are hard-deleted.
#[derive(Debug, Clone, Default)]
pub struct InvalidationPolicies {
    rules: Vec<InvalidationRule>,
}

impl InvalidationPolicies {
    /// Creates the table from ordered rules.
    #[must_use]
    pub fn new(rules: Vec<InvalidationRule>) -> Self {
        Self { rules }
    }

    /// Builds the table from configuration. Soft-refresh rules without a TTL
    /// use the default cache TTL. An empty configuration falls back to
    /// [`InvalidationPolicies::hot_keys`].
    #[must_use]
    pub fn from_config(config: &CachingConfig) -> Self {
        if config.invalidation_rules.is_empty() {
            return Self::hot_keys();
        }

        let rules = config
            .invalidation_rules
            .iter()
            .map(|rule| {
                let policy = match rule.policy {
                    InvalidationPolicyKind::HardDelete => InvalidationPolicy::HardDelete,
                    InvalidationPolicyKind::SoftRefresh => InvalidationPolicy::SoftRefresh {
                        ttl: rule
                            .refresh_ttl_secs
                            .map_or_else(|| config.cache_ttl_default(), Duration::from_secs),
                    },
                };
                InvalidationRule::new(rule.pattern.clone(), policy)
            })
            .collect();

        Self::new(rules)
    }

    /// Aggregate keys that are cheap to re-read and expensive to rebuild.
    #[must_use]
    pub fn hot_keys() -> Self {
        Self::new(CacheInfo::hot_keys().iter().map(InvalidationRule::soft_refresh).collect())
    }

    /// Policy for `key`.
    #[must_use]
    pub fn policy_for(&self, key: &str) -> InvalidationPolicy {
        self.rules
            .iter()
            .find(|rule| pattern::matches(&rule.pattern, key))
            .map_or(InvalidationPolicy::HardDelete, |rule| rule.policy)
    }

    /// Rules in match order.
    pub fn rules(&self) -> &[InvalidationRule] {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_config::InvalidationRuleConfig;

    #[test]
    fn test_first_match_wins() {
        let policies = InvalidationPolicies::new(vec![
            InvalidationRule::new("tokens:hot", InvalidationPolicy::SoftRefresh { ttl: Duration::from_secs(30) }),
            InvalidationRule::new("tokens:*", InvalidationPolicy::HardDelete),
        ]);

        assert_eq!(
            policies.policy_for("tokens:hot"),
            InvalidationPolicy::SoftRefresh { ttl: Duration::from_secs(30) }
        );
        assert_eq!(policies.policy_for("tokens:cold"), InvalidationPolicy::HardDelete);
        assert_eq!(policies.policy_for("unrelated"), InvalidationPolicy::HardDelete);
    }

    #[test]
    fn test_from_config() {
        let config = CachingConfig {
            cache_ttl_default_secs: 6,
            invalidation_rules: vec![
                InvalidationRuleConfig {
                    pattern: "economics".to_string(),
                    policy: InvalidationPolicyKind::SoftRefresh,
                    refresh_ttl_secs: None,
                },
                InvalidationRuleConfig {
                    pattern: "identities*".to_string(),
                    policy: InvalidationPolicyKind::SoftRefresh,
                    refresh_ttl_secs: Some(900),
                },
            ],
            ..CachingConfig::default()
        };

        let policies = InvalidationPolicies::from_config(&config);
        assert_eq!(
            policies.policy_for("economics"),
            InvalidationPolicy::SoftRefresh { ttl: Duration::from_secs(6) }
        );
        assert_eq!(
            policies.policy_for("identities:v2"),
            InvalidationPolicy::SoftRefresh { ttl: Duration::from_secs(900) }
        );
    }

    #[test]
    fn test_empty_config_uses_hot_keys() {
        let policies = InvalidationPolicies::from_config(&CachingConfig::default());
        assert!(matches!(
            policies.policy_for("economics"),
            InvalidationPolicy::SoftRefresh { .. }
        ));
        assert_eq!(policies.policy_for("txCount:erd1"), InvalidationPolicy::HardDelete);
    }
}
