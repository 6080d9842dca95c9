//! Central facade over the notification components.
//!
//! The registry wires every component once at startup; `initialize()` brings
//! them up with bounded retries, and every public operation is routed
//! through the error handler so callers see degraded results instead of raw
//! failures wherever a fallback exists.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::actions::{ActionContext, ActionRegistry, ActionResult};
use crate::cache::{TieredCache, L1_RECENT};
use crate::error::{DomainError, DomainResult};
use crate::error_handler::{ErrorContext, ErrorHandler};
use crate::generator::NotificationGenerator;
use crate::notifications::types::{
    CreateNotificationInput, Notification, NotificationEvent, NotificationFilter,
    NotificationId, NotificationSettings, SettingsUpdate,
};
use crate::notifications::NotificationStore;
use crate::ports::kv::KeyValueStore;
use crate::rules::{DefaultRulesEngine, RulesEngine, TomlRulesProvider};
use crate::scheduler::{JobId, NotificationScheduler, Recurrence};
use crate::rules::types::TriggerEvent;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Initialization attempts per component.
    pub max_init_attempts: u32,
    /// Base delay between attempts; grows linearly with the attempt number.
    pub init_retry_delay: std::time::Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_init_attempts: 3,
            init_retry_delay: std::time::Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServiceStatus {
    pub initialized: bool,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ManagerMetrics {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    /// Rolling mean wall-clock time per operation, in milliseconds.
    pub average_latency_ms: f64,
    /// Percentage of cache reads served without a miss.
    pub cache_hit_rate: f64,
    pub components: HashMap<String, ServiceStatus>,
}

/// Every component, constructed once and shared by reference.
pub struct ComponentRegistry {
    pub kv: Arc<dyn KeyValueStore>,
    pub store: Arc<NotificationStore>,
    pub rules: Arc<dyn RulesEngine>,
    pub generator: Arc<NotificationGenerator>,
    pub cache: Arc<TieredCache>,
    pub scheduler: Arc<NotificationScheduler>,
    pub actions: Arc<ActionRegistry>,
    pub errors: Arc<ErrorHandler>,
}

impl ComponentRegistry {
    pub async fn build(kv: Arc<dyn KeyValueStore>) -> Self {
        let store = Arc::new(NotificationStore::new(kv.clone()));
        let rules: Arc<dyn RulesEngine> = Arc::new(DefaultRulesEngine::new(Arc::new(
            TomlRulesProvider::new(kv.clone()),
        )));
        let generator = Arc::new(NotificationGenerator::new(rules.clone(), store.clone()));
        let cache = Arc::new(TieredCache::new(kv.clone()));
        let scheduler = Arc::new(NotificationScheduler::new(generator.clone(), kv.clone()));
        let actions = Arc::new(ActionRegistry::new(store.clone()).await);
        let errors = Arc::new(ErrorHandler::new(kv.clone(), store.clone(), cache.clone()));
        Self {
            kv,
            store,
            rules,
            generator,
            cache,
            scheduler,
            actions,
            errors,
        }
    }
}

#[derive(Default)]
struct OperationCounters {
    total: u64,
    successful: u64,
    failed: u64,
    average_latency_ms: f64,
}

pub struct NotificationManager {
    components: ComponentRegistry,
    config: ManagerConfig,
    counters: Mutex<OperationCounters>,
    statuses: RwLock<HashMap<String, ServiceStatus>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    initialized: AtomicBool,
}

impl NotificationManager {
    pub async fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_config(kv, ManagerConfig::default()).await
    }

    pub async fn with_config(kv: Arc<dyn KeyValueStore>, config: ManagerConfig) -> Self {
        Self {
            components: ComponentRegistry::build(kv).await,
            config,
            counters: Mutex::new(OperationCounters::default()),
            statuses: RwLock::new(HashMap::new()),
            sweeper: Mutex::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Brings every component up, retrying each with linear backoff.
    pub async fn initialize(&self) -> DomainResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        info!("Initializing notification manager");

        let store = self.components.store.clone();
        self.init_component("store", move || {
            let store = store.clone();
            async move {
                store.load().await?;
                Ok(())
            }
            .boxed()
        })
        .await?;

        let rules = self.components.rules.clone();
        self.init_component("rules", move || {
            let rules = rules.clone();
            async move {
                rules.reload_rules().await?;
                Ok(())
            }
            .boxed()
        })
        .await?;

        let cache = self.components.cache.clone();
        self.init_component("cache", move || {
            let cache = cache.clone();
            async move {
                cache.load().await?;
                Ok(())
            }
            .boxed()
        })
        .await?;
        *self.sweeper.lock().await = Some(self.components.cache.spawn_sweeper());

        let scheduler = self.components.scheduler.clone();
        self.init_component("scheduler", move || {
            let scheduler = scheduler.clone();
            async move {
                scheduler.start().await?;
                Ok(())
            }
            .boxed()
        })
        .await?;

        // Writes deferred during a previous outage go back through the store.
        let errors = self.components.errors.clone();
        self.init_component("error-handler", move || {
            let errors = errors.clone();
            async move {
                errors.replay_buffered().await?;
                Ok(())
            }
            .boxed()
        })
        .await?;

        self.statuses.write().await.insert(
            "actions".to_string(),
            ServiceStatus {
                initialized: true,
                attempts: 1,
                last_error: None,
            },
        );

        self.initialized.store(true, Ordering::SeqCst);
        info!("Notification manager initialized");
        Ok(())
    }

    /// Stops timers and background tasks. Pending state stays persisted.
    pub async fn shutdown(&self) {
        self.components.scheduler.stop().await;
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
        self.initialized.store(false, Ordering::SeqCst);
        info!("Notification manager stopped");
    }

    // --- Notification API ---

    /// Creates a notification. `Ok(None)` means current settings suppressed
    /// it; a `buffered-` prefixed id means the write was deferred.
    pub async fn create_notification(
        &self,
        input: CreateNotificationInput,
    ) -> DomainResult<Option<String>> {
        let started = std::time::Instant::now();
        let context = ErrorContext::new("create_notification", "store")
            .with_metadata(
                "input",
                serde_json::to_value(&input).unwrap_or(serde_json::Value::Null),
            )
            .with_metadata(
                "priority",
                serde_json::to_value(input.priority).unwrap_or(serde_json::Value::Null),
            );

        let store = self.components.store.clone();
        let cache = self.components.cache.clone();
        let result = self
            .components
            .errors
            .safe_execute(
                move || {
                    let store = store.clone();
                    let cache = cache.clone();
                    let input = input.clone();
                    async move {
                        let created = store.create(input).await?;
                        if let Some(n) = &created {
                            if let Err(e) = cache.set_notification(n, L1_RECENT).await {
                                log::debug!("Could not cache notification {}: {}", n.id, e);
                            }
                        }
                        Ok(created.map(|n| n.id.to_string()))
                    }
                    .boxed()
                },
                context,
                None,
            )
            .await;
        self.track(result, started).await
    }

    pub async fn get_notifications(
        &self,
        filter: NotificationFilter,
    ) -> DomainResult<Vec<Notification>> {
        let started = std::time::Instant::now();
        let store = self.components.store.clone();
        let result = self
            .components
            .errors
            .safe_execute(
                move || {
                    let store = store.clone();
                    let filter = filter.clone();
                    async move { Ok(store.get_notifications(&filter).await?) }.boxed()
                },
                ErrorContext::new("get_notifications", "store"),
                Some(Vec::new()),
            )
            .await;
        self.track(result, started).await
    }

    pub async fn mark_as_read(&self, id: NotificationId) -> DomainResult<()> {
        let started = std::time::Instant::now();
        let store = self.components.store.clone();
        let result = self
            .components
            .errors
            .safe_execute(
                move || {
                    let store = store.clone();
                    async move { Ok(store.mark_as_read(id).await?) }.boxed()
                },
                ErrorContext::new("mark_as_read", "store"),
                None,
            )
            .await;
        self.track(result, started).await
    }

    pub async fn delete_notification(&self, id: NotificationId) -> DomainResult<()> {
        let started = std::time::Instant::now();
        let store = self.components.store.clone();
        let cache = self.components.cache.clone();
        let result = self
            .components
            .errors
            .safe_execute(
                move || {
                    let store = store.clone();
                    let cache = cache.clone();
                    async move {
                        store.delete(id).await?;
                        if let Err(e) = cache.delete_notification(id).await {
                            log::debug!("Could not evict notification {}: {}", id, e);
                        }
                        Ok(())
                    }
                    .boxed()
                },
                ErrorContext::new("delete_notification", "store"),
                None,
            )
            .await;
        self.track(result, started).await
    }

    pub async fn clear_all(&self) -> DomainResult<usize> {
        let started = std::time::Instant::now();
        let store = self.components.store.clone();
        let result = self
            .components
            .errors
            .safe_execute(
                move || {
                    let store = store.clone();
                    async move { Ok(store.clear_all().await?) }.boxed()
                },
                ErrorContext::new("clear_all", "store"),
                None,
            )
            .await;
        self.track(result, started).await
    }

    pub async fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> DomainResult<NotificationSettings> {
        let started = std::time::Instant::now();
        let store = self.components.store.clone();
        let result = self
            .components
            .errors
            .safe_execute(
                move || {
                    let store = store.clone();
                    let update = update.clone();
                    async move { Ok(store.update_settings(update).await?) }.boxed()
                },
                ErrorContext::new("update_settings", "store"),
                None,
            )
            .await;
        self.track(result, started).await
    }

    /// Notification and lifecycle events for the UI layer; dropping the
    /// receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.components.store.subscribe()
    }

    // --- Event pipeline ---

    pub async fn process_event(&self, event: TriggerEvent) -> DomainResult<Vec<NotificationId>> {
        let started = std::time::Instant::now();
        let generator = self.components.generator.clone();
        let store = self.components.store.clone();
        let cache = self.components.cache.clone();
        let context = ErrorContext::new("process_event", "generator")
            .with_user(event.user_id.clone());
        let result = self
            .components
            .errors
            .safe_execute(
                move || {
                    let generator = generator.clone();
                    let store = store.clone();
                    let cache = cache.clone();
                    let event = event.clone();
                    async move {
                        let ids = generator.process_event(&event).await;
                        for id in &ids {
                            if let Some(n) = store.get(*id).await {
                                if let Err(e) = cache.set_notification(&n, L1_RECENT).await {
                                    log::debug!("Could not cache notification {}: {}", id, e);
                                }
                            }
                        }
                        Ok(ids)
                    }
                    .boxed()
                },
                context,
                Some(Vec::new()),
            )
            .await;
        self.track(result, started).await
    }

    // --- Scheduling API ---

    pub async fn schedule_notification(
        &self,
        rule_id: impl Into<String>,
        trigger_time: DateTime<Utc>,
        event: TriggerEvent,
        recurring: Option<Recurrence>,
    ) -> DomainResult<JobId> {
        let started = std::time::Instant::now();
        let scheduler = self.components.scheduler.clone();
        let rule_id = rule_id.into();
        let context = ErrorContext::new("schedule_notification", "scheduler")
            .with_user(event.user_id.clone());
        let result = self
            .components
            .errors
            .safe_execute(
                move || {
                    let scheduler = scheduler.clone();
                    let rule_id = rule_id.clone();
                    let event = event.clone();
                    let recurring = recurring.clone();
                    async move {
                        Ok(scheduler
                            .schedule(rule_id, trigger_time, event, recurring)
                            .await?)
                    }
                    .boxed()
                },
                context,
                None,
            )
            .await;
        self.track(result, started).await
    }

    pub async fn cancel_scheduled(&self, id: JobId) -> DomainResult<bool> {
        let started = std::time::Instant::now();
        let scheduler = self.components.scheduler.clone();
        let result = self
            .components
            .errors
            .safe_execute(
                move || {
                    let scheduler = scheduler.clone();
                    async move { Ok(scheduler.cancel(id).await?) }.boxed()
                },
                ErrorContext::new("cancel_scheduled", "scheduler"),
                Some(false),
            )
            .await;
        self.track(result, started).await
    }

    // --- Actions ---

    pub async fn execute_action(
        &self,
        action_id: impl Into<String>,
        action_context: ActionContext,
    ) -> DomainResult<ActionResult> {
        let started = std::time::Instant::now();
        let actions = self.components.actions.clone();
        let action_id = action_id.into();
        let context = ErrorContext::new("execute_action", "actions")
            .with_user(action_context.user_id.clone())
            .with_metadata(
                "action",
                serde_json::json!({
                    "action_id": action_id,
                    "context": serde_json::to_value(&action_context)
                        .unwrap_or(serde_json::Value::Null),
                }),
            );
        let result = self
            .components
            .errors
            .safe_execute(
                move || {
                    let actions = actions.clone();
                    let action_id = action_id.clone();
                    let action_context = action_context.clone();
                    async move { Ok(actions.execute(&action_id, &action_context).await) }.boxed()
                },
                context,
                None,
            )
            .await;
        self.track(result, started).await
    }

    // --- Introspection ---

    pub async fn health_check(&self) -> HashMap<String, bool> {
        let statuses = self.statuses.read().await;
        let initialized =
            |name: &str| statuses.get(name).map(|s| s.initialized).unwrap_or(false);

        let mut health = HashMap::new();
        health.insert("store".to_string(), initialized("store"));
        health.insert("rules".to_string(), initialized("rules"));
        health.insert("cache".to_string(), initialized("cache"));
        health.insert("error-handler".to_string(), initialized("error-handler"));
        health.insert(
            "scheduler".to_string(),
            self.components.scheduler.is_running(),
        );
        health.insert(
            "actions".to_string(),
            !self.components.actions.handler_ids().await.is_empty(),
        );
        health
    }

    pub async fn metrics(&self) -> ManagerMetrics {
        let counters = self.counters.lock().await;
        ManagerMetrics {
            total_operations: counters.total,
            successful_operations: counters.successful,
            failed_operations: counters.failed,
            average_latency_ms: counters.average_latency_ms,
            cache_hit_rate: self.components.cache.metrics().await.hit_rate,
            components: self.statuses.read().await.clone(),
        }
    }

    // --- Internals ---

    async fn init_component<F>(&self, name: &str, init: F) -> DomainResult<()>
    where
        F: Fn() -> BoxFuture<'static, DomainResult<()>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match init().await {
                Ok(()) => {
                    self.statuses.write().await.insert(
                        name.to_string(),
                        ServiceStatus {
                            initialized: true,
                            attempts,
                            last_error: None,
                        },
                    );
                    info!("Component '{}' initialized", name);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Component '{}' failed to initialize (attempt {}): {}",
                        name, attempts, e
                    );
                    self.statuses.write().await.insert(
                        name.to_string(),
                        ServiceStatus {
                            initialized: false,
                            attempts,
                            last_error: Some(e.to_string()),
                        },
                    );
                    if attempts >= self.config.max_init_attempts {
                        return Err(DomainError::ServiceUnavailable(format!(
                            "component '{}' failed to initialize: {}",
                            name, e
                        )));
                    }
                    tokio::time::sleep(self.config.init_retry_delay * attempts).await;
                }
            }
        }
    }

    async fn track<T>(
        &self,
        result: DomainResult<T>,
        started: std::time::Instant,
    ) -> DomainResult<T> {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let mut counters = self.counters.lock().await;
        counters.total += 1;
        counters.average_latency_ms +=
            (elapsed_ms - counters.average_latency_ms) / counters.total as f64;
        match &result {
            Ok(_) => counters.successful += 1,
            Err(_) => counters.failed += 1,
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use uuid::Uuid;

    use crate::notifications::types::{NotificationCategory, NotificationType};
    use crate::ports::kv::InMemoryKeyValueStore;

    async fn manager() -> NotificationManager {
        let manager = NotificationManager::new(Arc::new(InMemoryKeyValueStore::new())).await;
        manager.initialize().await.unwrap();
        manager
    }

    #[tokio::test]
    async fn initialization_brings_every_component_up() {
        let manager = manager().await;
        assert!(manager.is_initialized());

        let health = manager.health_check().await;
        assert!(health.values().all(|healthy| *healthy));

        let metrics = manager.metrics().await;
        assert!(metrics.components["store"].initialized);
        assert_eq!(metrics.components["scheduler"].attempts, 1);

        manager.shutdown().await;
        assert!(!manager.health_check().await["scheduler"]);
    }

    #[tokio::test]
    async fn create_read_and_mutate_through_the_facade() {
        let manager = manager().await;

        let id = manager
            .create_notification(CreateNotificationInput::new(
                NotificationType::Info,
                NotificationCategory::System,
                "Maintenance",
                "Scheduled maintenance tonight",
            ))
            .await
            .unwrap()
            .unwrap();
        let id: Uuid = id.parse().unwrap();

        let all = manager
            .get_notifications(NotificationFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);

        manager.mark_as_read(id).await.unwrap();
        manager.delete_notification(id).await.unwrap();
        assert!(manager
            .get_notifications(NotificationFilter::default())
            .await
            .unwrap()
            .is_empty());

        let metrics = manager.metrics().await;
        assert_eq!(metrics.total_operations, 5);
        assert_eq!(metrics.failed_operations, 0);
        assert!(metrics.average_latency_ms > 0.0);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn events_flow_through_the_generation_pipeline() {
        let manager = manager().await;

        let event = TriggerEvent {
            mission_id: Some("m1".to_string()),
            workshop_id: Some(2),
            ..TriggerEvent::new("workshop_completed", "user-1")
        }
        .with_data("score", json!(85))
        .with_data("workshop_id", json!(2))
        .with_data("user_workshop_count", json!(3));

        let ids = manager.process_event(event).await.unwrap();
        assert_eq!(ids.len(), 1);

        let all = manager
            .get_notifications(NotificationFilter::default())
            .await
            .unwrap();
        assert_eq!(all[0].title, "Workshop 2 completed!");

        // Generated notifications land in the recent cache layer too.
        let cached = manager.components().cache.get_notification(ids[0]).await;
        assert_eq!(cached.unwrap().id, ids[0]);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn events_matching_no_rule_are_a_quiet_no_op() {
        let manager = manager().await;
        let ids = manager
            .process_event(TriggerEvent::new("unknown_event", "user-1"))
            .await
            .unwrap();
        assert!(ids.is_empty());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn scheduling_and_cancellation_round_trip() {
        let manager = manager().await;

        let job_id = manager
            .schedule_notification(
                "inactivity_reminder_progressive",
                Utc::now() + Duration::hours(1),
                TriggerEvent::new("user_inactive", "user-1"),
                None,
            )
            .await
            .unwrap();

        assert!(manager.cancel_scheduled(job_id).await.unwrap());
        assert!(!manager.cancel_scheduled(job_id).await.unwrap());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_actions_are_contained() {
        let manager = manager().await;
        let result = manager
            .execute_action(
                "does_not_exist",
                ActionContext::new(Uuid::new_v4(), "user-1"),
            )
            .await
            .unwrap();
        assert!(!result.success);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn settings_updates_apply_partially() {
        let manager = manager().await;
        let settings = manager
            .update_settings(SettingsUpdate {
                sound_enabled: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!settings.sound_enabled);
        assert!(settings.enabled);
        manager.shutdown().await;
    }
}
