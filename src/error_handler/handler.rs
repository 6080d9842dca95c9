//! Centralized failure containment.
//!
//! `safe_execute` wraps a re-invokable operation: on failure it classifies
//! the error, tries recovery strategies (then retries the operation once),
//! tries fallback strategies for a substitute result, falls back to the
//! caller-supplied default, and only then surfaces the error. Surfaced
//! errors are recorded in a bounded critical log and, best effort, turned
//! into an urgent notification.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use log::{debug, error, info, warn};
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::strategies::{
    BufferedWriteFallback, CacheReset, CachedReadsFallback, FallbackStrategy,
    QueuedActionFallback, RecoveryStrategy, TransientRetry, PENDING_WRITES_KEY,
};
use super::types::{
    classify, BufferedWrite, CriticalErrorRecord, ErrorContext, ErrorEntry, ErrorMetrics,
    ErrorSeverity, ERROR_HANDLER_SOURCE,
};
use crate::cache::TieredCache;
use crate::error::{DomainError, DomainResult};
use crate::notifications::types::{
    CreateNotificationInput, NotificationCategory, NotificationType,
};
use crate::notifications::NotificationStore;
use crate::ports::kv::{self, KeyValueStore};

const CRITICAL_ERRORS_KEY: &str = "critical-errors";
const CRITICAL_LOG_CAP: usize = 100;
const ERROR_LOG_CAP: usize = 200;

pub struct ErrorHandler {
    kv: Arc<dyn KeyValueStore>,
    store: Arc<NotificationStore>,
    recovery: Vec<Arc<dyn RecoveryStrategy>>,
    fallbacks: Vec<Arc<dyn FallbackStrategy>>,
    last_recovery: Mutex<HashMap<String, DateTime<Utc>>>,
    entries: Mutex<VecDeque<ErrorEntry>>,
    metrics: Mutex<ErrorMetrics>,
    enabled: AtomicBool,
}

impl ErrorHandler {
    /// Handler with the standard strategy set.
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        store: Arc<NotificationStore>,
        cache: Arc<TieredCache>,
    ) -> Self {
        Self::with_strategies(
            kv.clone(),
            store,
            vec![
                Arc::new(TransientRetry::new()),
                Arc::new(CacheReset::new(cache)),
            ],
            vec![
                Arc::new(BufferedWriteFallback::new(kv.clone())),
                Arc::new(CachedReadsFallback::new(kv.clone())),
                Arc::new(QueuedActionFallback::new(kv)),
            ],
        )
    }

    pub fn with_strategies(
        kv: Arc<dyn KeyValueStore>,
        store: Arc<NotificationStore>,
        recovery: Vec<Arc<dyn RecoveryStrategy>>,
        fallbacks: Vec<Arc<dyn FallbackStrategy>>,
    ) -> Self {
        Self {
            kv,
            store,
            recovery,
            fallbacks,
            last_recovery: Mutex::new(HashMap::new()),
            entries: Mutex::new(VecDeque::new()),
            metrics: Mutex::new(ErrorMetrics::default()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Runs `op`, containing any failure. Validation errors surface
    /// untouched; everything else goes through recovery, fallback and the
    /// caller default before the error escapes.
    pub async fn safe_execute<T, F>(
        &self,
        op: F,
        context: ErrorContext,
        fallback_value: Option<T>,
    ) -> DomainResult<T>
    where
        T: serde::de::DeserializeOwned,
        F: Fn() -> BoxFuture<'static, DomainResult<T>> + Send + Sync,
    {
        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if !self.enabled.load(Ordering::SeqCst) {
            return Err(error);
        }
        if matches!(error, DomainError::Validation(_)) {
            return Err(error);
        }

        let severity = classify(&error, &context);
        let entry_id = self.record(&error, severity, &context).await;
        error!(
            "[{}/{}] {} (severity {:?})",
            context.component, context.operation, error, severity
        );

        // Recovery first: repair the cause, then retry the operation once.
        let error = match self.attempt_recovery(&error, &context).await {
            true => {
                self.mark_resolved(entry_id, None).await;
                match op().await {
                    Ok(value) => {
                        info!(
                            "Operation '{}' succeeded after recovery",
                            context.operation
                        );
                        return Ok(value);
                    }
                    Err(retry_error) => {
                        warn!(
                            "Operation '{}' failed again after recovery: {}",
                            context.operation, retry_error
                        );
                        retry_error
                    }
                }
            }
            false => error,
        };

        // Degraded substitute result.
        if let Some((name, value)) = self.attempt_fallback(&error, &context).await {
            match serde_json::from_value(value) {
                Ok(substitute) => {
                    self.mark_resolved(entry_id, Some(name.clone())).await;
                    self.metrics
                        .lock()
                        .await
                        .fallbacks_used
                        .entry(name)
                        .and_modify(|c| *c += 1)
                        .or_insert(1);
                    return Ok(substitute);
                }
                Err(e) => {
                    warn!("Fallback '{}' produced an unusable value: {}", name, e);
                }
            }
        }

        if let Some(value) = fallback_value {
            debug!(
                "Operation '{}' answered with the caller default",
                context.operation
            );
            return Ok(value);
        }

        self.escalate(&error, &context).await;
        Err(error)
    }

    /// Re-submits buffered notification writes, keeping whatever still
    /// fails. Returns the number of writes that went through.
    pub async fn replay_buffered(&self) -> DomainResult<usize> {
        let pending: Vec<BufferedWrite> = kv::get_typed(&self.kv, PENDING_WRITES_KEY)
            .await
            .map_err(DomainError::Storage)?
            .unwrap_or_default();
        if pending.is_empty() {
            return Ok(0);
        }

        let mut remaining = Vec::new();
        let mut replayed = 0;
        for write in pending {
            match self.store.create(write.input.clone()).await {
                Ok(_) => replayed += 1,
                Err(e) => {
                    warn!("Replay of '{}' failed: {}", write.pseudo_id, e);
                    remaining.push(write);
                }
            }
        }
        kv::set_typed(&self.kv, PENDING_WRITES_KEY, &remaining)
            .await
            .map_err(DomainError::Storage)?;

        if replayed > 0 {
            info!("Replayed {} buffered notification write(s)", replayed);
        }
        Ok(replayed)
    }

    pub async fn error_log(&self) -> Vec<ErrorEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }

    pub async fn clear_error_log(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn metrics(&self) -> ErrorMetrics {
        self.metrics.lock().await.clone()
    }

    pub async fn critical_errors(&self) -> Vec<CriticalErrorRecord> {
        kv::get_typed(&self.kv, CRITICAL_ERRORS_KEY)
            .await
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    async fn record(
        &self,
        error: &DomainError,
        severity: ErrorSeverity,
        context: &ErrorContext,
    ) -> Uuid {
        let entry = ErrorEntry {
            id: Uuid::new_v4(),
            message: error.to_string(),
            severity,
            context: context.clone(),
            resolved: false,
            fallback_used: None,
        };
        let id = entry.id;

        let mut entries = self.entries.lock().await;
        entries.push_back(entry);
        while entries.len() > ERROR_LOG_CAP {
            entries.pop_front();
        }
        drop(entries);

        let mut metrics = self.metrics.lock().await;
        metrics.total_errors += 1;
        *metrics
            .errors_by_severity
            .entry(format!("{:?}", severity).to_lowercase())
            .or_insert(0) += 1;
        *metrics
            .errors_by_component
            .entry(context.component.clone())
            .or_insert(0) += 1;
        id
    }

    async fn mark_resolved(&self, entry_id: Uuid, fallback_used: Option<String>) {
        if let Some(entry) = self
            .entries
            .lock()
            .await
            .iter_mut()
            .find(|e| e.id == entry_id)
        {
            entry.resolved = true;
            entry.fallback_used = fallback_used;
        }
    }

    async fn attempt_recovery(&self, error: &DomainError, context: &ErrorContext) -> bool {
        let now = Utc::now();
        for strategy in &self.recovery {
            if !strategy.matches(error, context) {
                continue;
            }
            {
                let last = self.last_recovery.lock().await;
                if let Some(at) = last.get(strategy.name()) {
                    if now - *at < strategy.cooldown() {
                        debug!("Recovery '{}' still cooling down", strategy.name());
                        continue;
                    }
                }
            }
            self.last_recovery
                .lock()
                .await
                .insert(strategy.name().to_string(), now);
            self.metrics.lock().await.recovery_attempts += 1;

            if strategy.recover(error, context).await {
                info!("Recovery '{}' succeeded", strategy.name());
                self.metrics.lock().await.recovery_successes += 1;
                return true;
            }
            warn!("Recovery '{}' did not help", strategy.name());
        }
        false
    }

    async fn attempt_fallback(
        &self,
        error: &DomainError,
        context: &ErrorContext,
    ) -> Option<(String, serde_json::Value)> {
        for strategy in &self.fallbacks {
            if !strategy.matches(error, context) {
                continue;
            }
            debug!("Trying fallback '{}'", strategy.name());
            if let Some(value) = strategy.substitute(error, context).await {
                return Some((strategy.name().to_string(), value));
            }
        }
        None
    }

    /// Terminal failure: append to the persisted critical log and surface an
    /// urgent notification, unless the failing operation was this handler's
    /// own notification write.
    async fn escalate(&self, error: &DomainError, context: &ErrorContext) {
        let record = CriticalErrorRecord {
            timestamp: Utc::now(),
            message: error.to_string(),
            operation: context.operation.clone(),
            component: context.component.clone(),
            metadata: context.metadata.clone(),
        };

        let mut log: Vec<CriticalErrorRecord> = kv::get_typed(&self.kv, CRITICAL_ERRORS_KEY)
            .await
            .ok()
            .flatten()
            .unwrap_or_default();
        log.push(record);
        if log.len() > CRITICAL_LOG_CAP {
            let excess = log.len() - CRITICAL_LOG_CAP;
            log.drain(..excess);
        }
        if let Err(e) = kv::set_typed(&self.kv, CRITICAL_ERRORS_KEY, &log).await {
            error!("Could not persist the critical-error log: {}", e);
        }

        if context.source == ERROR_HANDLER_SOURCE {
            warn!("Suppressing critical notification for the handler's own write");
            return;
        }

        let mut input = CreateNotificationInput::new(
            NotificationType::Error,
            NotificationCategory::System,
            "Critical system error",
            format!("A critical error occurred: {}", error),
        );
        input.priority = crate::notifications::types::NotificationPriority::Urgent;
        input.persistent = true;
        input.tags = vec![
            "critical".to_string(),
            "error".to_string(),
            "system".to_string(),
        ];
        input.source = Some(ERROR_HANDLER_SOURCE.to_string());
        input.context.metadata.insert(
            "failed_operation".to_string(),
            json!(context.operation),
        );

        if self.store.create(input).await.is_err() {
            error!("Could not surface the critical failure as a notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicU32;

    use crate::notifications::types::{NotificationFilter, NotificationPriority};
    use crate::ports::kv::InMemoryKeyValueStore;

    fn handler() -> (Arc<ErrorHandler>, Arc<NotificationStore>, Arc<dyn KeyValueStore>) {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let store = Arc::new(NotificationStore::new(kv.clone()));
        let cache = Arc::new(TieredCache::new(kv.clone()));
        let handler = Arc::new(ErrorHandler::new(kv.clone(), store.clone(), cache));
        (handler, store, kv)
    }

    fn sample_input() -> CreateNotificationInput {
        CreateNotificationInput::new(
            NotificationType::Info,
            NotificationCategory::System,
            "Hello",
            "World",
        )
    }

    #[tokio::test]
    async fn successful_operations_pass_through_untouched() {
        let (handler, _, _) = handler();
        let result = handler
            .safe_execute(
                || async { Ok(41 + 1) }.boxed(),
                ErrorContext::new("noop", "tests"),
                None,
            )
            .await
            .unwrap();
        assert_eq!(result, 42);
        assert!(handler.error_log().await.is_empty());
    }

    #[tokio::test]
    async fn caller_default_is_returned_when_nothing_matches() {
        let (handler, _, _) = handler();
        let result: Vec<String> = handler
            .safe_execute(
                || async { Err(DomainError::Other("broken".to_string())) }.boxed(),
                ErrorContext::new("unmatched_operation", "tests"),
                Some(vec!["default".to_string()]),
            )
            .await
            .unwrap();
        assert_eq!(result, vec!["default".to_string()]);

        let metrics = handler.metrics().await;
        assert_eq!(metrics.total_errors, 1);
        // The caller default resolved it, so nothing was escalated.
        assert!(handler.critical_errors().await.is_empty());
    }

    #[tokio::test]
    async fn validation_errors_surface_immediately() {
        let (handler, _, _) = handler();
        let result: DomainResult<u32> = handler
            .safe_execute(
                || async { Err(DomainError::Validation("empty title".to_string())) }.boxed(),
                ErrorContext::new("create_notification", "store"),
                Some(0),
            )
            .await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert!(handler.error_log().await.is_empty());
    }

    #[tokio::test]
    async fn transient_failure_recovers_and_retries_once() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let store = Arc::new(NotificationStore::new(kv.clone()));
        let handler = ErrorHandler::with_strategies(
            kv,
            store,
            vec![Arc::new(TransientRetry::with_pause(
                std::time::Duration::from_millis(1),
            ))],
            vec![],
        );

        let calls = Arc::new(AtomicU32::new(0));
        let op_calls = calls.clone();
        let result = handler
            .safe_execute(
                move || {
                    let calls = op_calls.clone();
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(DomainError::Transient("blip".to_string()))
                        } else {
                            Ok("recovered".to_string())
                        }
                    }
                    .boxed()
                },
                ErrorContext::new("get_notifications", "store"),
                None,
            )
            .await
            .unwrap();

        assert_eq!(result, "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let metrics = handler.metrics().await;
        assert_eq!(metrics.recovery_attempts, 1);
        assert_eq!(metrics.recovery_successes, 1);
        assert!(handler.error_log().await[0].resolved);
    }

    #[tokio::test]
    async fn recovery_cooldown_blocks_immediate_reattempts() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let store = Arc::new(NotificationStore::new(kv.clone()));
        let handler = ErrorHandler::with_strategies(
            kv,
            store,
            vec![Arc::new(TransientRetry::with_pause(
                std::time::Duration::from_millis(1),
            ))],
            vec![],
        );

        for _ in 0..2 {
            let _: DomainResult<u32> = handler
                .safe_execute(
                    || async { Err(DomainError::Timeout("slow".to_string())) }.boxed(),
                    ErrorContext::new("get_notifications", "store"),
                    Some(0),
                )
                .await;
        }

        // The five-second cooldown leaves only the first attempt.
        assert_eq!(handler.metrics().await.recovery_attempts, 1);
    }

    #[tokio::test]
    async fn failed_create_is_buffered_and_replayable() {
        let (handler, store, kv) = handler();
        let input = sample_input();

        let pseudo_id: String = handler
            .safe_execute(
                || async { Err(DomainError::Other("store offline".to_string())) }.boxed(),
                ErrorContext::new("create_notification", "store")
                    .with_metadata("input", serde_json::to_value(&input).unwrap()),
                None,
            )
            .await
            .unwrap();
        assert!(pseudo_id.starts_with("buffered-"));

        let pending: Vec<BufferedWrite> = kv::get_typed(&kv, PENDING_WRITES_KEY)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].input.title, "Hello");

        assert_eq!(handler.replay_buffered().await.unwrap(), 1);
        assert_eq!(store.unread_count().await, 1);
        let pending: Vec<BufferedWrite> = kv::get_typed(&kv, PENDING_WRITES_KEY)
            .await
            .unwrap()
            .unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn failed_reads_fall_back_to_an_empty_snapshot() {
        let (handler, _, _) = handler();
        let result: Vec<crate::notifications::types::Notification> = handler
            .safe_execute(
                || async { Err(DomainError::Other("store offline".to_string())) }.boxed(),
                ErrorContext::new("get_notifications", "store")
                    .with_metadata("filter", serde_json::to_value(NotificationFilter::default()).unwrap()),
                None,
            )
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn failed_actions_are_queued_with_a_non_success_result() {
        let (handler, _, kv) = handler();
        let result: serde_json::Value = handler
            .safe_execute(
                || async { Err(DomainError::Other("handler crashed".to_string())) }.boxed(),
                ErrorContext::new("execute_action", "actions")
                    .with_metadata("action", json!({"action_id": "retry_sync"})),
                None,
            )
            .await
            .unwrap();
        assert_eq!(result["success"], json!(false));

        let queued: Vec<super::super::types::QueuedAction> =
            kv::get_typed(&kv, super::super::strategies::QUEUED_ACTIONS_KEY)
                .await
                .unwrap()
                .unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].action["action_id"], json!("retry_sync"));
    }

    #[tokio::test]
    async fn terminal_errors_are_logged_and_surfaced_as_urgent() {
        let (handler, store, _) = handler();
        let result: DomainResult<u32> = handler
            .safe_execute(
                || async { Err(DomainError::Other("unrecoverable".to_string())) }.boxed(),
                ErrorContext::new("unmatched_operation", "tests"),
                None,
            )
            .await;
        assert!(result.is_err());

        let critical = handler.critical_errors().await;
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].operation, "unmatched_operation");

        let all = store
            .get_notifications(&NotificationFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].priority, NotificationPriority::Urgent);
        assert_eq!(all[0].source.as_deref(), Some(ERROR_HANDLER_SOURCE));
    }

    #[tokio::test]
    async fn critical_notification_failure_does_not_recurse() {
        let (handler, store, _) = handler();
        let result: DomainResult<u32> = handler
            .safe_execute(
                || async { Err(DomainError::Other("store write failed".to_string())) }.boxed(),
                ErrorContext::new("create_notification", "store")
                    .with_source(ERROR_HANDLER_SOURCE),
                None,
            )
            .await;
        assert!(result.is_err());

        // The failure is logged but never re-enters the notification path.
        assert_eq!(handler.critical_errors().await.len(), 1);
        let all = store
            .get_notifications(&NotificationFilter::default())
            .await
            .unwrap();
        assert!(all.is_empty());
    }
}
