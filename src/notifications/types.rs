use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type NotificationId = Uuid;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationType {
    #[default]
    Info,
    Success,
    Warning,
    Error,
    Action,
    Achievement,
    Reminder,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationCategory {
    Formation,
    Workshop,
    Validation,
    Report,
    Sync,
    Collaboration,
    #[default]
    System,
    Security,
}

impl NotificationCategory {
    pub const ALL: [NotificationCategory; 8] = [
        NotificationCategory::Formation,
        NotificationCategory::Workshop,
        NotificationCategory::Validation,
        NotificationCategory::Report,
        NotificationCategory::Sync,
        NotificationCategory::Collaboration,
        NotificationCategory::System,
        NotificationCategory::Security,
    ];
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationStatus {
    #[default]
    Unread,
    Read,
    Archived,
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ActionStyle {
    #[default]
    Primary,
    Secondary,
    Danger,
}

/// Where an action leads when activated.
///
/// Actions stay fully serializable; behavior lives in the action handler
/// registry, keyed by the id carried in `Handler`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum ActionTarget {
    /// In-app route.
    Navigate(String),
    /// Registered handler id, resolved by the action registry.
    Handler(String),
    /// External URL, opened outside the app.
    ExternalLink(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub style: ActionStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub target: ActionTarget,
}

/// Business context a notification was raised in. Typed fields cover the
/// common lookups; anything else rides in `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NotificationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workshop_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub category: NotificationCategory,
    pub priority: NotificationPriority,
    pub status: NotificationStatus,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
    #[serde(default)]
    pub context: NotificationContext,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub persistent: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_link: Option<String>,
}

impl Notification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| e <= now).unwrap_or(false)
    }
}

/// Input for creating a notification. The store assigns id, created_at and
/// the initial status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CreateNotificationInput {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub category: NotificationCategory,
    #[serde(default)]
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
    #[serde(default)]
    pub context: NotificationContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub persistent: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_link: Option<String>,
}

impl CreateNotificationInput {
    pub fn new(
        notification_type: NotificationType,
        category: NotificationCategory,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            notification_type,
            category,
            title: title.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// Materializes the input into a full notification record.
    pub fn into_notification(self, now: DateTime<Utc>, default_expiry: Duration) -> Notification {
        let expires_at = match (self.expires_at, self.persistent) {
            (Some(at), _) => Some(at),
            (None, true) => None,
            (None, false) => Some(now + default_expiry),
        };
        Notification {
            id: Uuid::new_v4(),
            notification_type: self.notification_type,
            category: self.category,
            priority: self.priority,
            status: NotificationStatus::Unread,
            title: self.title,
            message: self.message,
            description: self.description,
            icon: self.icon,
            actions: self.actions,
            context: self.context,
            created_at: now,
            read_at: None,
            expires_at,
            persistent: self.persistent,
            tags: self.tags,
            source: self.source,
            deep_link: self.deep_link,
        }
    }
}

// --- Filtering ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NotificationFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<NotificationType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<NotificationCategory>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub priorities: Vec<NotificationPriority>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<NotificationStatus>,
    /// Case-insensitive substring match over title, message and description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl NotificationFilter {
    pub fn matches(&self, notification: &Notification) -> bool {
        if !self.types.is_empty() && !self.types.contains(&notification.notification_type) {
            return false;
        }
        if !self.categories.is_empty() && !self.categories.contains(&notification.category) {
            return false;
        }
        if !self.priorities.is_empty() && !self.priorities.contains(&notification.priority) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&notification.status) {
            return false;
        }
        if let Some(from) = self.date_from {
            if notification.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if notification.created_at > to {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| notification.tags.contains(t)) {
            return false;
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let in_title = notification.title.to_lowercase().contains(&needle);
            let in_message = notification.message.to_lowercase().contains(&needle);
            let in_description = notification
                .description
                .as_ref()
                .map(|d| d.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if !in_title && !in_message && !in_description {
                return false;
            }
        }
        true
    }
}

// --- Settings ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuietHours {
    pub enabled: bool,
    /// Wall-clock start, e.g. "22:00".
    pub start: String,
    /// Wall-clock end, e.g. "08:00". A window wrapping midnight is allowed.
    pub end: String,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start: "22:00".to_string(),
            end: "08:00".to_string(),
        }
    }
}

impl QuietHours {
    /// Whether `time` falls inside the configured window.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if !self.enabled {
            return false;
        }
        let (start, end) = match (parse_wall_clock(&self.start), parse_wall_clock(&self.end)) {
            (Some(s), Some(e)) => (s, e),
            _ => return false,
        };
        if start <= end {
            time >= start && time < end
        } else {
            // Window wraps midnight.
            time >= start || time < end
        }
    }
}

fn parse_wall_clock(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub sound_enabled: bool,
    /// Per-category opt-out. A missing category counts as enabled.
    #[serde(default)]
    pub categories: HashMap<NotificationCategory, bool>,
    #[serde(default)]
    pub quiet_hours: QuietHours,
    pub max_notifications: usize,
    pub auto_archive_after_days: u32,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        let categories = NotificationCategory::ALL
            .iter()
            .map(|c| (*c, true))
            .collect();
        Self {
            enabled: true,
            sound_enabled: true,
            categories,
            quiet_hours: QuietHours::default(),
            max_notifications: 500,
            auto_archive_after_days: 30,
        }
    }
}

impl NotificationSettings {
    pub fn category_enabled(&self, category: NotificationCategory) -> bool {
        self.categories.get(&category).copied().unwrap_or(true)
    }
}

/// Partial settings update; `None` fields keep their current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<HashMap<NotificationCategory, bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_hours: Option<QuietHours>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_notifications: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_archive_after_days: Option<u32>,
}

// --- Stats and events ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NotificationStats {
    pub total: usize,
    pub unread: usize,
    pub by_type: HashMap<NotificationType, usize>,
    pub by_category: HashMap<NotificationCategory, usize>,
    pub by_priority: HashMap<NotificationPriority, usize>,
    pub created_today: usize,
    pub created_this_week: usize,
    pub created_this_month: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum NotificationEvent {
    Created { notification: Notification },
    Read { id: NotificationId },
    Archived { id: NotificationId },
    Dismissed { id: NotificationId },
    Deleted { id: NotificationId },
    Cleared { removed: usize },
    ActionPerformed { id: NotificationId, action_id: String },
    SettingsUpdated { settings: NotificationSettings },
}
