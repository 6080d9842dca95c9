use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// --- Trigger events ---

/// Application event the rule engine matches against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workshop_id: Option<u32>,
    /// Free-form event payload the conditions are evaluated over.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn new(event_type: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source: "app".to_string(),
            user_id: user_id.into(),
            session_id: None,
            mission_id: None,
            workshop_id: None,
            data: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

// --- Conditions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    Exists,
    In,
    InRange,
}

/// One condition over a (possibly nested, dot-separated) field of the event
/// data. `In` expects `value` to be an array of candidates, `InRange` a
/// two-element `[min, max]` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerCondition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub optional: bool,
}

impl TriggerCondition {
    pub fn new(
        field: impl Into<String>,
        operator: ConditionOperator,
        value: serde_json::Value,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            optional: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTrigger {
    /// Event type this rule reacts to.
    pub event: String,
    #[serde(default)]
    pub conditions: Vec<TriggerCondition>,
}

// --- Rules ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub trigger: RuleTrigger,
    /// Template id, resolved against the template catalog.
    pub template_id: String,
    /// Minimum interval between generations per (rule, user). Zero disables
    /// the cooldown.
    #[serde(default)]
    pub cooldown_ms: u64,
    /// Per (rule, user) daily cap. Zero means unlimited.
    #[serde(default)]
    pub max_per_day: u32,
    /// Empty targets every user.
    #[serde(default)]
    pub target_users: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Serialization wrapper for the operator-editable rules document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<NotificationRule>,
}
