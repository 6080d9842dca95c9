//! Notification templates.
//!
//! Rendering is a pure function over a template string and a JSON data map.
//! Supported syntax: `{{field}}` substitution and single-level
//! `{{#cond}}...{{/cond}}` conditional blocks. Unresolved placeholders
//! render empty; a conditional block is kept only when its field is present
//! and truthy.

pub mod catalog;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::notifications::types::{
    ActionStyle, NotificationCategory, NotificationPriority, NotificationType,
};

pub use catalog::{template_by_id, TEMPLATES};

/// Action blueprint carried by a template. When `navigate_template` is set
/// the rendered action navigates to that route; otherwise activation is
/// dispatched to the handler registered under the action id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateAction {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub style: ActionStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigate_template: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub id: String,
    pub name: String,
    pub category: NotificationCategory,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub priority: NotificationPriority,
    pub title_template: String,
    pub message_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<TemplateAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Renders `template` against `data`.
pub fn render(template: &str, data: &HashMap<String, serde_json::Value>) -> String {
    substitute(&expand_blocks(template, data), data)
}

/// Resolves `{{#field}}...{{/field}}` blocks. Blocks do not nest; an
/// unterminated block is emitted verbatim.
fn expand_blocks(template: &str, data: &HashMap<String, serde_json::Value>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{#") {
        result.push_str(&rest[..open]);
        let after_open = &rest[open + 3..];
        let Some(name_end) = after_open.find("}}") else {
            result.push_str(&rest[open..]);
            return result;
        };
        let name = &after_open[..name_end];
        let body_start = &after_open[name_end + 2..];
        let close_tag = format!("{{{{/{}}}}}", name);
        let Some(close) = body_start.find(&close_tag) else {
            result.push_str(&rest[open..]);
            return result;
        };
        if data.get(name).map(is_truthy).unwrap_or(false) {
            result.push_str(&body_start[..close]);
        }
        rest = &body_start[close + close_tag.len()..];
    }
    result.push_str(rest);
    result
}

fn substitute(template: &str, data: &HashMap<String, serde_json::Value>) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        result.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            result.push_str(&rest[open..]);
            return result;
        };
        let name = &after_open[..close];
        if let Some(value) = data.get(name) {
            result.push_str(&value_to_string(value));
        }
        rest = &after_open[close + 2..];
    }
    result.push_str(rest);
    result
}

/// Whether any `{{...}}` placeholder survived rendering.
pub fn has_unresolved_placeholders(rendered: &str) -> bool {
    rendered
        .find("{{")
        .map(|open| rendered[open..].contains("}}"))
        .unwrap_or(false)
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(_) => true,
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
