//! Recovery and fallback strategies.
//!
//! Recovery strategies try to repair the failure cause so the original
//! operation can be retried; fallback strategies produce a degraded
//! substitute result instead. Both are matched by predicate and tried in
//! order.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::{debug, warn};
use serde_json::json;
use uuid::Uuid;

use super::types::{BufferedWrite, ErrorContext, QueuedAction};
use crate::cache::TieredCache;
use crate::error::DomainError;
use crate::notifications::types::CreateNotificationInput;
use crate::ports::kv::{self, KeyValueStore};

/// Persistence key for deferred create-notification calls.
pub const PENDING_WRITES_KEY: &str = "pending-notifications";
/// Persistence key for deferred action executions.
pub const QUEUED_ACTIONS_KEY: &str = "queued-actions";

#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Minimum interval between attempts of this strategy.
    fn cooldown(&self) -> Duration;

    fn matches(&self, error: &DomainError, context: &ErrorContext) -> bool;

    /// Returns `true` when the cause is considered repaired and the original
    /// operation may be retried.
    async fn recover(&self, error: &DomainError, context: &ErrorContext) -> bool;
}

#[async_trait]
pub trait FallbackStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn matches(&self, error: &DomainError, context: &ErrorContext) -> bool;

    /// Produces a substitute result, or `None` when the strategy cannot help
    /// after all.
    async fn substitute(
        &self,
        error: &DomainError,
        context: &ErrorContext,
    ) -> Option<serde_json::Value>;
}

/// Waits out a short pause and lets the caller retry transient failures.
pub struct TransientRetry {
    pause: std::time::Duration,
}

impl TransientRetry {
    pub fn new() -> Self {
        Self {
            pause: std::time::Duration::from_secs(1),
        }
    }

    pub fn with_pause(pause: std::time::Duration) -> Self {
        Self { pause }
    }
}

impl Default for TransientRetry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecoveryStrategy for TransientRetry {
    fn name(&self) -> &str {
        "transient-retry"
    }

    fn cooldown(&self) -> Duration {
        Duration::seconds(5)
    }

    fn matches(&self, error: &DomainError, _context: &ErrorContext) -> bool {
        error.is_transient()
    }

    async fn recover(&self, _error: &DomainError, _context: &ErrorContext) -> bool {
        tokio::time::sleep(self.pause).await;
        true
    }
}

/// Clears every cache layer when the failure points at cached or persisted
/// state, then lets the caller retry against fresh data.
pub struct CacheReset {
    cache: Arc<TieredCache>,
}

impl CacheReset {
    pub fn new(cache: Arc<TieredCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl RecoveryStrategy for CacheReset {
    fn name(&self) -> &str {
        "cache-reset"
    }

    fn cooldown(&self) -> Duration {
        Duration::seconds(10)
    }

    fn matches(&self, error: &DomainError, _context: &ErrorContext) -> bool {
        matches!(error, DomainError::Cache(_) | DomainError::Storage(_))
    }

    async fn recover(&self, _error: &DomainError, _context: &ErrorContext) -> bool {
        match self.cache.clear_all().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Cache reset failed: {}", e);
                false
            }
        }
    }
}

/// Queues a failed create-notification call durably and answers with a
/// pseudo id, so callers never block on a broken store.
pub struct BufferedWriteFallback {
    kv: Arc<dyn KeyValueStore>,
}

impl BufferedWriteFallback {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl FallbackStrategy for BufferedWriteFallback {
    fn name(&self) -> &str {
        "buffered-write"
    }

    fn matches(&self, _error: &DomainError, context: &ErrorContext) -> bool {
        context.operation == "create_notification" && context.metadata.contains_key("input")
    }

    async fn substitute(
        &self,
        _error: &DomainError,
        context: &ErrorContext,
    ) -> Option<serde_json::Value> {
        let input: CreateNotificationInput =
            serde_json::from_value(context.metadata.get("input")?.clone()).ok()?;

        let write = BufferedWrite {
            pseudo_id: format!("buffered-{}", Uuid::new_v4()),
            input,
            buffered_at: Utc::now(),
        };

        let mut pending: Vec<BufferedWrite> = kv::get_typed(&self.kv, PENDING_WRITES_KEY)
            .await
            .ok()?
            .unwrap_or_default();
        pending.push(write.clone());
        kv::set_typed(&self.kv, PENDING_WRITES_KEY, &pending)
            .await
            .ok()?;

        debug!(
            "Buffered notification write as '{}' ({} pending)",
            write.pseudo_id,
            pending.len()
        );
        Some(json!(write.pseudo_id))
    }
}

/// Serves reads from the last persisted notification snapshot, or an empty
/// list when there is none.
pub struct CachedReadsFallback {
    kv: Arc<dyn KeyValueStore>,
}

impl CachedReadsFallback {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl FallbackStrategy for CachedReadsFallback {
    fn name(&self) -> &str {
        "cached-reads"
    }

    fn matches(&self, _error: &DomainError, context: &ErrorContext) -> bool {
        context.operation == "get_notifications"
    }

    async fn substitute(
        &self,
        _error: &DomainError,
        _context: &ErrorContext,
    ) -> Option<serde_json::Value> {
        match self.kv.get("notifications").await {
            Ok(Some(snapshot)) => Some(snapshot),
            Ok(None) => Some(json!([])),
            Err(e) => {
                warn!("Cached-reads fallback could not load the snapshot: {}", e);
                Some(json!([]))
            }
        }
    }
}

/// Queues a failed action execution for later replay and answers with a
/// non-success result.
pub struct QueuedActionFallback {
    kv: Arc<dyn KeyValueStore>,
}

impl QueuedActionFallback {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl FallbackStrategy for QueuedActionFallback {
    fn name(&self) -> &str {
        "queued-action"
    }

    fn matches(&self, _error: &DomainError, context: &ErrorContext) -> bool {
        context.operation == "execute_action" && context.metadata.contains_key("action")
    }

    async fn substitute(
        &self,
        _error: &DomainError,
        context: &ErrorContext,
    ) -> Option<serde_json::Value> {
        let queued = QueuedAction {
            action: context.metadata.get("action")?.clone(),
            queued_at: Utc::now(),
            retry_count: 0,
        };

        let mut queue: Vec<QueuedAction> = kv::get_typed(&self.kv, QUEUED_ACTIONS_KEY)
            .await
            .ok()?
            .unwrap_or_default();
        queue.push(queued);
        kv::set_typed(&self.kv, QUEUED_ACTIONS_KEY, &queue)
            .await
            .ok()?;

        debug!("Queued action for later execution ({} queued)", queue.len());
        Some(json!({
            "success": false,
            "message": "Action queued for later execution",
        }))
    }
}
