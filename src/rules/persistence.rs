//! Rule set persistence.
//!
//! Operators can override the built-in catalog with a TOML document stored
//! through the key/value port. `load_rules` returning `None` means no
//! override exists and the engine falls back to the catalog.

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info};

use super::errors::RuleError;
use super::types::{NotificationRule, RuleSet};
use crate::ports::kv::KeyValueStore;

pub const RULES_KEY: &str = "notification-rules";

#[async_trait]
pub trait RulesProvider: Send + Sync {
    /// Returns the persisted rule set, or `None` when no override exists.
    async fn load_rules(&self) -> Result<Option<Vec<NotificationRule>>, RuleError>;

    async fn save_rules(&self, rules: &[NotificationRule]) -> Result<(), RuleError>;
}

/// Provider with no persisted state; the engine always uses the built-in
/// catalog. Saving is a no-op. Useful in tests and trial setups.
pub struct StaticRulesProvider;

#[async_trait]
impl RulesProvider for StaticRulesProvider {
    async fn load_rules(&self) -> Result<Option<Vec<NotificationRule>>, RuleError> {
        Ok(None)
    }

    async fn save_rules(&self, _rules: &[NotificationRule]) -> Result<(), RuleError> {
        Ok(())
    }
}

/// Stores the rule set as a TOML document (kept operator-editable) inside
/// the key/value store.
pub struct TomlRulesProvider {
    kv: Arc<dyn KeyValueStore>,
    key: String,
}

impl TomlRulesProvider {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            key: RULES_KEY.to_string(),
        }
    }

    pub fn with_key(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
        }
    }
}

#[async_trait]
impl RulesProvider for TomlRulesProvider {
    async fn load_rules(&self) -> Result<Option<Vec<NotificationRule>>, RuleError> {
        let Some(value) = self.kv.get(&self.key).await? else {
            return Ok(None);
        };
        let document = value.as_str().ok_or_else(|| {
            RuleError::ParseError(format!("key '{}' does not hold a TOML string", self.key))
        })?;
        let rule_set: RuleSet = toml::from_str(document).map_err(|e| {
            error!("Failed to parse rules document under '{}': {}", self.key, e);
            RuleError::ParseError(e.to_string())
        })?;
        info!(
            "Loaded {} rules from key '{}'",
            rule_set.rules.len(),
            self.key
        );
        Ok(Some(rule_set.rules))
    }

    async fn save_rules(&self, rules: &[NotificationRule]) -> Result<(), RuleError> {
        let rule_set = RuleSet {
            rules: rules.to_vec(),
        };
        let document =
            toml::to_string_pretty(&rule_set).map_err(|e| RuleError::ParseError(e.to_string()))?;
        self.kv
            .set(&self.key, serde_json::Value::String(document))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::kv::InMemoryKeyValueStore;
    use crate::rules::catalog::builtin_rules;

    #[tokio::test]
    async fn load_without_override_returns_none() {
        let provider = TomlRulesProvider::new(Arc::new(InMemoryKeyValueStore::new()));
        assert!(provider.load_rules().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let provider = TomlRulesProvider::new(kv);
        let rules = builtin_rules();
        provider.save_rules(&rules).await.unwrap();

        let loaded = provider.load_rules().await.unwrap().unwrap();
        assert_eq!(loaded, rules);
    }

    #[tokio::test]
    async fn malformed_document_is_a_parse_error() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        kv.set(
            RULES_KEY,
            serde_json::Value::String("rules = \"not a table\"".to_string()),
        )
        .await
        .unwrap();
        let provider = TomlRulesProvider::new(kv);
        assert!(matches!(
            provider.load_rules().await.unwrap_err(),
            RuleError::ParseError(_)
        ));
    }
}
