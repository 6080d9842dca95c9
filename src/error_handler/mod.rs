//! Failure containment around every domain operation.

pub mod handler;
pub mod strategies;
pub mod types;

pub use handler::ErrorHandler;
pub use strategies::{
    BufferedWriteFallback, CacheReset, CachedReadsFallback, FallbackStrategy,
    QueuedActionFallback, RecoveryStrategy, TransientRetry, PENDING_WRITES_KEY,
    QUEUED_ACTIONS_KEY,
};
pub use types::{
    classify, BufferedWrite, CriticalErrorRecord, ErrorContext, ErrorEntry, ErrorMetrics,
    ErrorSeverity, QueuedAction, ERROR_HANDLER_SOURCE,
};
