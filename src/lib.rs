//! Notification orchestration domain layer for the RiskForge platform.
//!
//! This crate turns application events into user-facing notifications:
//! a rule engine selects applicable rules per event, a generator renders
//! templates and enforces throttling, a scheduler fires deferred and
//! recurring events back into the same pipeline, and a tiered cache plus a
//! key/value persistence port keep state durable. Every public operation is
//! routed through the error handler so callers get degraded results instead
//! of raw failures wherever a fallback exists.

pub mod actions;
pub mod cache;
pub mod error;
pub mod error_handler;
pub mod generator;
pub mod manager;
pub mod notifications;
pub mod ports;
pub mod rules;
pub mod scheduler;
pub mod templates;

pub use actions::{ActionContext, ActionRegistry, ActionResult};
pub use cache::TieredCache;
pub use error::{DomainError, DomainResult};
pub use error_handler::{ErrorContext, ErrorHandler};
pub use generator::NotificationGenerator;
pub use manager::{ComponentRegistry, NotificationManager};
pub use notifications::types::{
    CreateNotificationInput, Notification, NotificationCategory, NotificationEvent,
    NotificationFilter, NotificationId, NotificationPriority, NotificationSettings,
    NotificationStatus, NotificationType,
};
pub use notifications::NotificationStore;
pub use ports::kv::{FilesystemKeyValueStore, InMemoryKeyValueStore, KeyValueStore};
pub use rules::types::TriggerEvent;
pub use rules::{DefaultRulesEngine, NotificationRule, RulesEngine};
pub use scheduler::{JobId, NotificationScheduler, Recurrence, RecurrenceInterval, ScheduledJob};

use std::sync::Arc;

/// Initialize the notification domain layer over the platform data
/// directory, falling back to an in-memory store when none is available.
///
/// The returned manager has every component wired and initialized.
pub async fn initialize() -> DomainResult<Arc<NotificationManager>> {
    let kv: Arc<dyn KeyValueStore> = match FilesystemKeyValueStore::default_location() {
        Some(store) => Arc::new(store),
        None => {
            log::warn!("No platform data directory; notification state will not persist");
            Arc::new(InMemoryKeyValueStore::new())
        }
    };

    let manager = Arc::new(NotificationManager::new(kv).await);
    manager.initialize().await?;
    Ok(manager)
}
