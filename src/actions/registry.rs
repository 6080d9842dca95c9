//! Action handler registry.
//!
//! Notifications carry serializable action descriptors; the behavior behind
//! a `Handler` target lives here, keyed by action id. Executing an unknown
//! id is a not-found result, never an error.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::notifications::types::{NotificationContext, NotificationId};
use crate::notifications::NotificationStore;

const HISTORY_CAP: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            redirect_url: None,
        }
    }

    pub fn redirect(message: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            redirect_url: Some(url.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            redirect_url: None,
        }
    }
}

/// What a handler gets to work with: the notification's context plus
/// call-site metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionContext {
    pub notification_id: NotificationId,
    pub user_id: String,
    #[serde(default)]
    pub notification: NotificationContext,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ActionContext {
    pub fn new(notification_id: NotificationId, user_id: impl Into<String>) -> Self {
        Self {
            notification_id,
            user_id: user_id.into(),
            notification: NotificationContext::default(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_notification(mut self, context: NotificationContext) -> Self {
        self.notification = context;
        self
    }
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn id(&self) -> &str;

    fn label(&self) -> &str;

    async fn execute(&self, context: &ActionContext) -> ActionResult;
}

/// One executed action, kept in the bounded history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionExecution {
    pub action_id: String,
    pub notification_id: NotificationId,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub result: ActionResult,
}

pub struct ActionRegistry {
    store: Arc<NotificationStore>,
    handlers: RwLock<HashMap<String, Arc<dyn ActionHandler>>>,
    history: Mutex<VecDeque<ActionExecution>>,
}

impl ActionRegistry {
    /// Registry pre-populated with the default handlers.
    pub async fn new(store: Arc<NotificationStore>) -> Self {
        let registry = Self::empty(store.clone());
        for handler in default_handlers(store) {
            registry.register(handler).await;
        }
        registry
    }

    pub fn empty(store: Arc<NotificationStore>) -> Self {
        Self {
            store,
            handlers: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Registers a handler, replacing any previous handler with the same id.
    pub async fn register(&self, handler: Arc<dyn ActionHandler>) {
        let id = handler.id().to_string();
        if self
            .handlers
            .write()
            .await
            .insert(id.clone(), handler)
            .is_some()
        {
            warn!("Action handler '{}' replaced", id);
        }
    }

    pub async fn handler_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Dispatches to the handler registered for `action_id` and records the
    /// execution.
    pub async fn execute(&self, action_id: &str, context: &ActionContext) -> ActionResult {
        let handler = self.handlers.read().await.get(action_id).cloned();
        let result = match handler {
            Some(handler) => {
                debug!("Executing action '{}'", action_id);
                handler.execute(context).await
            }
            None => {
                warn!("Unknown action '{}'", action_id);
                ActionResult::failed(format!("Unknown action '{}'", action_id))
            }
        };

        if result.success {
            // Best effort; the action outcome stands even if the event
            // cannot be recorded.
            if let Err(e) = self
                .store
                .record_action(context.notification_id, action_id)
                .await
            {
                debug!("Could not record action '{}': {}", action_id, e);
            }
            info!("Action '{}' executed for {}", action_id, context.user_id);
        }

        let mut history = self.history.lock().await;
        history.push_back(ActionExecution {
            action_id: action_id.to_string(),
            notification_id: context.notification_id,
            user_id: context.user_id.clone(),
            timestamp: Utc::now(),
            result: result.clone(),
        });
        while history.len() > HISTORY_CAP {
            history.pop_front();
        }

        result
    }

    pub async fn history(&self) -> Vec<ActionExecution> {
        self.history.lock().await.iter().cloned().collect()
    }

    pub async fn user_history(&self, user_id: &str) -> Vec<ActionExecution> {
        self.history
            .lock()
            .await
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }
}

// --- Default handlers ---

fn default_handlers(store: Arc<NotificationStore>) -> Vec<Arc<dyn ActionHandler>> {
    vec![
        Arc::new(NavigateToWorkshop),
        Arc::new(NavigateToMission),
        Arc::new(NavigateToResults),
        Arc::new(DownloadReport),
        Arc::new(DismissNotification { store }),
        Arc::new(RetrySync),
    ]
}

struct NavigateToWorkshop;

#[async_trait]
impl ActionHandler for NavigateToWorkshop {
    fn id(&self) -> &str {
        "navigate_to_workshop"
    }

    fn label(&self) -> &str {
        "Open workshop"
    }

    async fn execute(&self, context: &ActionContext) -> ActionResult {
        match (
            &context.notification.mission_id,
            &context.notification.workshop_id,
        ) {
            (Some(mission), Some(workshop)) => ActionResult::redirect(
                "Opening workshop",
                format!("/missions/{}/workshops/{}", mission, workshop),
            ),
            _ => ActionResult::failed("Workshop context is missing"),
        }
    }
}

struct NavigateToMission;

#[async_trait]
impl ActionHandler for NavigateToMission {
    fn id(&self) -> &str {
        "navigate_to_mission"
    }

    fn label(&self) -> &str {
        "Open mission"
    }

    async fn execute(&self, context: &ActionContext) -> ActionResult {
        match &context.notification.mission_id {
            Some(mission) => {
                ActionResult::redirect("Opening mission", format!("/missions/{}", mission))
            }
            None => ActionResult::failed("Mission id is missing"),
        }
    }
}

struct NavigateToResults;

#[async_trait]
impl ActionHandler for NavigateToResults {
    fn id(&self) -> &str {
        "navigate_to_results"
    }

    fn label(&self) -> &str {
        "View results"
    }

    async fn execute(&self, context: &ActionContext) -> ActionResult {
        match (
            &context.notification.mission_id,
            &context.notification.workshop_id,
        ) {
            (Some(mission), Some(workshop)) => ActionResult::redirect(
                "Opening results",
                format!("/missions/{}/workshops/{}/results", mission, workshop),
            ),
            _ => ActionResult::failed("Results context is missing"),
        }
    }
}

struct DownloadReport;

#[async_trait]
impl ActionHandler for DownloadReport {
    fn id(&self) -> &str {
        "download_report"
    }

    fn label(&self) -> &str {
        "Download report"
    }

    async fn execute(&self, context: &ActionContext) -> ActionResult {
        match &context.notification.report_id {
            Some(report) => ActionResult::redirect(
                "Report download started",
                format!("/api/reports/{}/download", report),
            ),
            None => ActionResult::failed("Report id is missing"),
        }
    }
}

struct DismissNotification {
    store: Arc<NotificationStore>,
}

#[async_trait]
impl ActionHandler for DismissNotification {
    fn id(&self) -> &str {
        "dismiss_notification"
    }

    fn label(&self) -> &str {
        "Dismiss"
    }

    async fn execute(&self, context: &ActionContext) -> ActionResult {
        match self.store.dismiss(context.notification_id).await {
            Ok(()) => ActionResult::ok("Notification dismissed"),
            Err(e) => ActionResult::failed(format!("Could not dismiss: {}", e)),
        }
    }
}

struct RetrySync;

#[async_trait]
impl ActionHandler for RetrySync {
    fn id(&self) -> &str {
        "retry_sync"
    }

    fn label(&self) -> &str {
        "Retry synchronization"
    }

    async fn execute(&self, _context: &ActionContext) -> ActionResult {
        info!("Synchronization retry requested");
        ActionResult::ok("Synchronization restarted")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    use crate::notifications::types::{
        CreateNotificationInput, NotificationCategory, NotificationStatus, NotificationType,
    };
    use crate::ports::kv::InMemoryKeyValueStore;

    async fn registry() -> (ActionRegistry, Arc<NotificationStore>) {
        let store = Arc::new(NotificationStore::new(Arc::new(InMemoryKeyValueStore::new())));
        (ActionRegistry::new(store.clone()).await, store)
    }

    fn workshop_context() -> ActionContext {
        let mut context = ActionContext::new(Uuid::new_v4(), "user-1");
        context.notification.mission_id = Some("m1".to_string());
        context.notification.workshop_id = Some("2".to_string());
        context
    }

    #[tokio::test]
    async fn navigation_actions_resolve_redirect_urls() {
        let (registry, _) = registry().await;
        let context = workshop_context();

        let result = registry.execute("navigate_to_workshop", &context).await;
        assert!(result.success);
        assert_eq!(result.redirect_url.as_deref(), Some("/missions/m1/workshops/2"));

        let result = registry.execute("navigate_to_results", &context).await;
        assert_eq!(
            result.redirect_url.as_deref(),
            Some("/missions/m1/workshops/2/results")
        );
    }

    #[tokio::test]
    async fn missing_context_is_a_handled_failure() {
        let (registry, _) = registry().await;
        let context = ActionContext::new(Uuid::new_v4(), "user-1");

        let result = registry.execute("navigate_to_workshop", &context).await;
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("Workshop context is missing"));
    }

    #[tokio::test]
    async fn unknown_action_is_not_found_not_an_error() {
        let (registry, _) = registry().await;
        let result = registry
            .execute("does_not_exist", &ActionContext::new(Uuid::new_v4(), "u"))
            .await;
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("Unknown action 'does_not_exist'"));
    }

    #[tokio::test]
    async fn dismiss_action_updates_the_notification() {
        let (registry, store) = registry().await;
        let notification = store
            .create(CreateNotificationInput::new(
                NotificationType::Info,
                NotificationCategory::System,
                "Title",
                "Message",
            ))
            .await
            .unwrap()
            .unwrap();

        let context = ActionContext::new(notification.id, "user-1");
        let result = registry.execute("dismiss_notification", &context).await;
        assert!(result.success);
        assert_eq!(
            store.get(notification.id).await.unwrap().status,
            NotificationStatus::Dismissed
        );
    }

    #[tokio::test]
    async fn custom_handlers_can_be_registered() {
        struct Reply;

        #[async_trait]
        impl ActionHandler for Reply {
            fn id(&self) -> &str {
                "reply_to_comment"
            }

            fn label(&self) -> &str {
                "Reply"
            }

            async fn execute(&self, context: &ActionContext) -> ActionResult {
                match context.metadata.get("comment_id").and_then(|v| v.as_str()) {
                    Some(comment) => ActionResult::redirect(
                        "Opening reply",
                        format!("/comments/{}/reply", comment),
                    ),
                    None => ActionResult::failed("Comment id is missing"),
                }
            }
        }

        let (registry, _) = registry().await;
        registry.register(Arc::new(Reply)).await;

        let mut context = ActionContext::new(Uuid::new_v4(), "user-1");
        context
            .metadata
            .insert("comment_id".to_string(), serde_json::json!("c42"));
        let result = registry.execute("reply_to_comment", &context).await;
        assert_eq!(result.redirect_url.as_deref(), Some("/comments/c42/reply"));
    }

    #[tokio::test]
    async fn history_is_recorded_and_bounded() {
        let (registry, _) = registry().await;
        let context = workshop_context();

        for _ in 0..(HISTORY_CAP + 5) {
            registry.execute("navigate_to_mission", &context).await;
        }
        assert_eq!(registry.history().await.len(), HISTORY_CAP);
        assert_eq!(registry.user_history("user-1").await.len(), HISTORY_CAP);
        assert!(registry.user_history("someone-else").await.is_empty());

        registry.clear_history().await;
        assert!(registry.history().await.is_empty());
    }
}
