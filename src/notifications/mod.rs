//! Notification store module.
//!
//! Owns the durable notification list, its settings, and the lifecycle
//! event stream consumed by the UI.

pub mod errors;
pub mod store;
pub mod types;

pub use errors::NotificationError;
pub use store::NotificationStore;
pub use types::{
    ActionStyle, ActionTarget, CreateNotificationInput, Notification, NotificationAction,
    NotificationCategory, NotificationContext, NotificationEvent, NotificationFilter,
    NotificationId, NotificationPriority, NotificationSettings, NotificationStats,
    NotificationStatus, NotificationType, QuietHours, SettingsUpdate,
};
