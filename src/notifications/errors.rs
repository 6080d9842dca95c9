use thiserror::Error;
use uuid::Uuid;

use crate::notifications::types::NotificationStatus;
use crate::ports::kv::StorageError;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification with ID '{0}' not found.")]
    NotFound(Uuid),

    #[error("Invalid input data for notification field '{field}': {reason}")]
    InvalidInputData { field: String, reason: String },

    #[error("Invalid status transition for notification '{id}': {from:?} -> {to:?}")]
    InvalidTransition {
        id: Uuid,
        from: NotificationStatus,
        to: NotificationStatus,
    },

    #[error("Notifications are disabled for category '{0}'")]
    CategoryDisabled(String),

    #[error("Persistence error during operation '{operation}': {source}")]
    PersistenceError {
        operation: String,
        #[source]
        source: StorageError,
    },

    #[error("Internal error in notification store: {0}")]
    InternalError(String),
}

impl NotificationError {
    pub fn persistence(operation: impl Into<String>, source: StorageError) -> Self {
        NotificationError::PersistenceError {
            operation: operation.into(),
            source,
        }
    }
}
