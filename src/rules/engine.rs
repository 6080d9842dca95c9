use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::RwLock;

use super::catalog::builtin_rules;
use super::errors::RuleError;
use super::persistence::RulesProvider;
use super::types::{ConditionOperator, NotificationRule, TriggerCondition, TriggerEvent};

/// Resolves a dot-separated path (`a.b.c`) into the event data map.
pub fn nested_value<'a>(
    data: &'a HashMap<String, serde_json::Value>,
    path: &str,
) -> Option<&'a serde_json::Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = data.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn as_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Loose equality: numbers compare numerically regardless of integer or
/// float representation, everything else by structural equality.
fn loose_eq(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Evaluates a single condition against the event data. Pure and
/// side-effect free.
///
/// A missing field on an optional condition is a non-match; on a required
/// condition it is a `MissingField` error the caller decides how to treat.
pub fn check_condition(
    rule_id: &str,
    condition: &TriggerCondition,
    data: &HashMap<String, serde_json::Value>,
) -> Result<bool, RuleError> {
    let field_value = nested_value(data, &condition.field);

    let field_value = match field_value {
        Some(v) => v,
        None => {
            if condition.optional || condition.operator == ConditionOperator::Exists {
                return Ok(false);
            }
            return Err(RuleError::MissingField {
                rule_id: rule_id.to_string(),
                field: condition.field.clone(),
            });
        }
    };

    match condition.operator {
        ConditionOperator::Equals => Ok(loose_eq(field_value, &condition.value)),
        ConditionOperator::NotEquals => Ok(!loose_eq(field_value, &condition.value)),
        ConditionOperator::GreaterThan => {
            match (as_number(field_value), as_number(&condition.value)) {
                (Some(a), Some(b)) => Ok(a > b),
                _ => Ok(false),
            }
        }
        ConditionOperator::LessThan => {
            match (as_number(field_value), as_number(&condition.value)) {
                (Some(a), Some(b)) => Ok(a < b),
                _ => Ok(false),
            }
        }
        ConditionOperator::Contains => {
            let haystack = stringify(field_value);
            let needle = stringify(&condition.value);
            Ok(haystack.contains(&needle))
        }
        ConditionOperator::Exists => Ok(!field_value.is_null()),
        ConditionOperator::In => {
            let candidates =
                condition
                    .value
                    .as_array()
                    .ok_or_else(|| RuleError::InvalidCondition {
                        rule_id: rule_id.to_string(),
                        field: condition.field.clone(),
                        reason: "'in' expects an array value".to_string(),
                    })?;
            Ok(candidates.iter().any(|c| loose_eq(field_value, c)))
        }
        ConditionOperator::InRange => {
            let bounds = condition
                .value
                .as_array()
                .filter(|a| a.len() == 2)
                .ok_or_else(|| RuleError::InvalidCondition {
                    rule_id: rule_id.to_string(),
                    field: condition.field.clone(),
                    reason: "'in-range' expects a [min, max] array".to_string(),
                })?;
            match (
                as_number(field_value),
                as_number(&bounds[0]),
                as_number(&bounds[1]),
            ) {
                (Some(v), Some(min), Some(max)) => Ok(v >= min && v <= max),
                _ => Ok(false),
            }
        }
    }
}

fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Whether the rule matches the event: enabled, same event type, and every
/// condition holds (short-circuit AND).
pub fn check_rule(rule: &NotificationRule, event: &TriggerEvent) -> Result<bool, RuleError> {
    if !rule.enabled {
        return Ok(false);
    }
    if rule.trigger.event != event.event_type {
        return Ok(false);
    }
    for condition in &rule.trigger.conditions {
        if !check_condition(&rule.id, condition, &event.data)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[async_trait]
pub trait RulesEngine: Send + Sync {
    /// All rules matching the event. A rule whose evaluation errors is
    /// logged and treated as non-matching.
    async fn applicable_rules(&self, event: &TriggerEvent) -> Vec<NotificationRule>;

    /// Snapshot of the current rule set.
    async fn rules(&self) -> Vec<NotificationRule>;

    /// Re-reads the rule set from the provider.
    async fn reload_rules(&self) -> Result<(), RuleError>;

    /// Enables or disables a rule and persists the change.
    async fn set_rule_enabled(&self, rule_id: &str, enabled: bool) -> Result<(), RuleError>;
}

pub struct DefaultRulesEngine {
    rules: RwLock<Vec<NotificationRule>>,
    provider: Arc<dyn RulesProvider>,
}

impl DefaultRulesEngine {
    pub fn new(provider: Arc<dyn RulesProvider>) -> Self {
        Self {
            rules: RwLock::new(builtin_rules()),
            provider,
        }
    }
}

#[async_trait]
impl RulesEngine for DefaultRulesEngine {
    async fn applicable_rules(&self, event: &TriggerEvent) -> Vec<NotificationRule> {
        let rules = self.rules.read().await;
        let mut matched = Vec::new();
        for rule in rules.iter() {
            match check_rule(rule, event) {
                Ok(true) => matched.push(rule.clone()),
                Ok(false) => {}
                Err(e) => {
                    warn!("Skipping rule '{}' for event '{}': {}", rule.id, event.event_type, e);
                }
            }
        }
        debug!(
            "{} rule(s) applicable for event '{}'",
            matched.len(),
            event.event_type
        );
        matched
    }

    async fn rules(&self) -> Vec<NotificationRule> {
        self.rules.read().await.clone()
    }

    async fn reload_rules(&self) -> Result<(), RuleError> {
        match self.provider.load_rules().await? {
            Some(loaded) => {
                info!("Loaded {} notification rules from provider", loaded.len());
                *self.rules.write().await = loaded;
            }
            None => {
                let builtin = builtin_rules();
                info!(
                    "No persisted rules, using the {} built-in rules",
                    builtin.len()
                );
                *self.rules.write().await = builtin;
            }
        }
        Ok(())
    }

    async fn set_rule_enabled(&self, rule_id: &str, enabled: bool) -> Result<(), RuleError> {
        let snapshot = {
            let mut rules = self.rules.write().await;
            let rule = rules
                .iter_mut()
                .find(|r| r.id == rule_id)
                .ok_or_else(|| RuleError::RuleNotFound(rule_id.to_string()))?;
            rule.enabled = enabled;
            rules.clone()
        };
        self.provider.save_rules(&snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::persistence::StaticRulesProvider;
    use serde_json::json;

    fn data(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn nested_paths_resolve() {
        let d = data(&[("a", json!({"b": {"c": 42}}))]);
        assert_eq!(nested_value(&d, "a.b.c"), Some(&json!(42)));
        assert_eq!(nested_value(&d, "a.b"), Some(&json!({"c": 42})));
        assert_eq!(nested_value(&d, "a.x.c"), None);
        assert_eq!(nested_value(&d, "missing"), None);
    }

    #[test]
    fn operators_evaluate() {
        let d = data(&[
            ("score", json!(85)),
            ("severity", json!("critical")),
            ("standard", json!("ANSSI guide v2")),
            ("flag", json!(true)),
        ]);
        let check = |field: &str, op, value| {
            check_condition("r", &TriggerCondition::new(field, op, value), &d)
        };

        assert!(check("score", ConditionOperator::Equals, json!(85)).unwrap());
        assert!(check("score", ConditionOperator::Equals, json!(85.0)).unwrap());
        assert!(check("score", ConditionOperator::NotEquals, json!(100)).unwrap());
        assert!(check("score", ConditionOperator::GreaterThan, json!(80)).unwrap());
        assert!(!check("score", ConditionOperator::GreaterThan, json!(85)).unwrap());
        assert!(check("score", ConditionOperator::LessThan, json!(100)).unwrap());
        assert!(check("standard", ConditionOperator::Contains, json!("ANSSI")).unwrap());
        assert!(check("flag", ConditionOperator::Exists, json!(true)).unwrap());
        assert!(check(
            "severity",
            ConditionOperator::In,
            json!(["high", "critical"])
        )
        .unwrap());
        assert!(check("score", ConditionOperator::InRange, json!([80, 90])).unwrap());
        assert!(!check("score", ConditionOperator::InRange, json!([90, 100])).unwrap());
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let d = data(&[]);
        let condition = TriggerCondition::new("score", ConditionOperator::Equals, json!(1));
        let err = check_condition("r", &condition, &d).unwrap_err();
        assert!(matches!(err, RuleError::MissingField { .. }));
    }

    #[test]
    fn missing_optional_field_is_a_non_match() {
        let d = data(&[]);
        let mut condition = TriggerCondition::new("score", ConditionOperator::Equals, json!(1));
        condition.optional = true;
        assert!(!check_condition("r", &condition, &d).unwrap());

        // Exists on an absent field is simply false, never an error.
        let condition = TriggerCondition::new("score", ConditionOperator::Exists, json!(true));
        assert!(!check_condition("r", &condition, &d).unwrap());
    }

    #[test]
    fn malformed_in_condition_is_an_error() {
        let d = data(&[("severity", json!("high"))]);
        let condition = TriggerCondition::new("severity", ConditionOperator::In, json!("high"));
        let err = check_condition("r", &condition, &d).unwrap_err();
        assert!(matches!(err, RuleError::InvalidCondition { .. }));
    }

    #[tokio::test]
    async fn applicable_rules_match_builtin_catalog() {
        let engine = DefaultRulesEngine::new(Arc::new(StaticRulesProvider));
        let event = TriggerEvent::new("workshop_completed", "user-1")
            .with_data("score", json!(100))
            .with_data("workshop_id", json!(2))
            .with_data("user_workshop_count", json!(3));

        let matched = engine.applicable_rules(&event).await;
        let ids: Vec<&str> = matched.iter().map(|r| r.id.as_str()).collect();
        // Both the completion celebration and the perfect-score achievement
        // fire; the first-workshop milestone does not (workshop_id != 1).
        assert!(ids.contains(&"workshop_completion_celebration"));
        assert!(ids.contains(&"perfect_score_achievement"));
        assert!(!ids.contains(&"first_workshop_milestone"));
    }

    #[tokio::test]
    async fn rule_with_missing_required_field_is_skipped() {
        let engine = DefaultRulesEngine::new(Arc::new(StaticRulesProvider));
        // workshop_completed rules require `score`, absent here.
        let event = TriggerEvent::new("workshop_completed", "user-1");
        assert!(engine.applicable_rules(&event).await.is_empty());
    }

    #[tokio::test]
    async fn disabled_rule_never_matches() {
        let engine = DefaultRulesEngine::new(Arc::new(StaticRulesProvider));
        engine
            .set_rule_enabled("workshop_completion_celebration", false)
            .await
            .unwrap();

        let event = TriggerEvent::new("workshop_completed", "user-1")
            .with_data("score", json!(50));
        let ids: Vec<String> = engine
            .applicable_rules(&event)
            .await
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert!(!ids.contains(&"workshop_completion_celebration".to_string()));
    }

    #[tokio::test]
    async fn unknown_rule_toggle_errors() {
        let engine = DefaultRulesEngine::new(Arc::new(StaticRulesProvider));
        let err = engine.set_rule_enabled("nope", true).await.unwrap_err();
        assert!(matches!(err, RuleError::RuleNotFound(_)));
    }
}
