//! Error module for the RiskForge notification domain layer.
//!
//! Each subsystem defines its own error enum; this module unifies them under
//! `DomainError` so the manager facade and the error handler can operate on a
//! single type.

use thiserror::Error;

use crate::cache::CacheError;
use crate::notifications::NotificationError;
use crate::ports::kv::StorageError;
use crate::rules::RuleError;
use crate::scheduler::SchedulerError;

/// A general Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// The primary error type for the notification domain layer.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Notification store error.
    #[error(transparent)]
    Notification(#[from] NotificationError),

    /// Rule engine error.
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// Scheduler error.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Cache error.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Persistence error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Input failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Transient failure, a retry may succeed.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// A required component is unavailable.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Operation timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Other error.
    #[error("Domain error: {0}")]
    Other(String),
}

impl DomainError {
    /// Whether a retry of the failed operation could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::Transient(_) | DomainError::Timeout(_))
    }
}
