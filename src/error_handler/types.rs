use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::notifications::types::CreateNotificationInput;

/// Source tag the handler stamps on its own writes; operations carrying it
/// are never re-notified on failure.
pub const ERROR_HANDLER_SOURCE: &str = "error-handler";

/// Where a failed operation came from, for classification, logging and
/// fallback selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub operation: String,
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<Uuid>,
    /// Originator of the wrapped call, `"app"` unless overridden.
    pub source: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            component: component.into(),
            user_id: None,
            notification_id: None,
            source: "app".to_string(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Severity from the failed operation and the error itself. Urgent
/// notification writes are critical because the user was meant to see them.
pub fn classify(error: &DomainError, context: &ErrorContext) -> ErrorSeverity {
    if context.operation == "create_notification"
        && context.metadata.get("priority").and_then(|v| v.as_str()) == Some("urgent")
    {
        return ErrorSeverity::Critical;
    }
    if error.is_transient() || matches!(error, DomainError::ServiceUnavailable(_)) {
        return ErrorSeverity::High;
    }
    if context.operation == "execute_action" || context.operation == "navigate" {
        return ErrorSeverity::Medium;
    }
    ErrorSeverity::Low
}

/// One intercepted failure, kept in the in-memory error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub id: Uuid,
    pub message: String,
    pub severity: ErrorSeverity,
    pub context: ErrorContext,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_used: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ErrorMetrics {
    pub total_errors: u64,
    pub errors_by_severity: HashMap<String, u64>,
    pub errors_by_component: HashMap<String, u64>,
    pub fallbacks_used: HashMap<String, u64>,
    pub recovery_attempts: u64,
    pub recovery_successes: u64,
}

/// Entry of the persisted critical-error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub operation: String,
    pub component: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A create-notification call deferred while the store was unreachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedWrite {
    pub pseudo_id: String,
    pub input: CreateNotificationInput,
    pub buffered_at: DateTime<Utc>,
}

/// An action execution deferred for later replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    pub action: serde_json::Value,
    pub queued_at: DateTime<Utc>,
    pub retry_count: u32,
}
