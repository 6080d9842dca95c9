//! Event-driven notification generation.
//!
//! Pipeline per event: applicable rules, per-rule gating (cooldown, daily
//! cap, user targeting), dynamic priority, template rendering, contextual
//! actions, deep link, store write. A gated rule is a normal skip, not a
//! failure.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Local, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use super::deep_link::deep_link_for;
use super::throttle::ThrottleTracker;
use crate::notifications::types::{
    ActionTarget, CreateNotificationInput, NotificationAction, NotificationContext,
    NotificationId, NotificationPriority,
};
use crate::notifications::{NotificationError, NotificationStore};
use crate::rules::types::{NotificationRule, TriggerEvent};
use crate::rules::RulesEngine;
use crate::templates::{render, template_by_id, NotificationTemplate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GenerationStats {
    pub total_events: u64,
    pub rules_triggered: u64,
    pub notifications_generated: u64,
    pub notifications_skipped: u64,
    pub error_count: u64,
    /// Rolling mean wall-clock time per processed event, in milliseconds.
    pub average_processing_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_type: Option<String>,
}

/// Escalates or de-escalates the template's base priority from event data.
pub fn dynamic_priority(
    base: NotificationPriority,
    data: &HashMap<String, serde_json::Value>,
) -> NotificationPriority {
    if data.get("urgency_level").and_then(|v| v.as_str()) == Some("urgent")
        || data.get("severity").and_then(|v| v.as_str()) == Some("critical")
        || data.get("compliance_issue").and_then(|v| v.as_bool()) == Some(true)
    {
        return NotificationPriority::Urgent;
    }
    if data
        .get("user_preference_low_priority")
        .and_then(|v| v.as_bool())
        == Some(true)
    {
        return NotificationPriority::Low;
    }
    base
}

pub struct NotificationGenerator {
    rules_engine: Arc<dyn RulesEngine>,
    store: Arc<NotificationStore>,
    throttle: Mutex<ThrottleTracker>,
    stats: Mutex<GenerationStats>,
}

impl NotificationGenerator {
    pub fn new(rules_engine: Arc<dyn RulesEngine>, store: Arc<NotificationStore>) -> Self {
        Self {
            rules_engine,
            store,
            throttle: Mutex::new(ThrottleTracker::new()),
            stats: Mutex::new(GenerationStats::default()),
        }
    }

    /// Processes one event through every applicable rule. Per-rule failures
    /// are logged and counted without aborting the remaining rules.
    pub async fn process_event(&self, event: &TriggerEvent) -> Vec<NotificationId> {
        let started = std::time::Instant::now();
        {
            let mut stats = self.stats.lock().await;
            stats.total_events += 1;
            stats.last_event_type = Some(event.event_type.clone());
        }
        self.throttle
            .lock()
            .await
            .purge_stale(Local::now().date_naive());

        let applicable = self.rules_engine.applicable_rules(event).await;
        debug!(
            "Event '{}': {} applicable rule(s)",
            event.event_type,
            applicable.len()
        );

        let mut generated = Vec::new();
        for rule in &applicable {
            let mut stats = self.stats.lock().await;
            stats.rules_triggered += 1;
            drop(stats);

            match self.process_rule(rule, event).await {
                Ok(Some(id)) => {
                    generated.push(id);
                    self.stats.lock().await.notifications_generated += 1;
                }
                Ok(None) => {
                    self.stats.lock().await.notifications_skipped += 1;
                }
                Err(e) => {
                    error!("Rule '{}' failed for event '{}': {}", rule.id, event.event_type, e);
                    self.stats.lock().await.error_count += 1;
                }
            }
        }

        {
            let mut stats = self.stats.lock().await;
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            stats.average_processing_ms +=
                (elapsed_ms - stats.average_processing_ms) / stats.total_events as f64;
        }

        info!(
            "Event '{}' processed: {} notification(s) generated",
            event.event_type,
            generated.len()
        );
        generated
    }

    /// Applies gating then generates. `Ok(None)` is a throttle or targeting
    /// skip, or a store-side suppression (settings).
    async fn process_rule(
        &self,
        rule: &NotificationRule,
        event: &TriggerEvent,
    ) -> Result<Option<NotificationId>, NotificationError> {
        let now = Utc::now();
        let today = Local::now().date_naive();

        {
            let throttle = self.throttle.lock().await;
            if !throttle.cooldown_elapsed(&rule.id, &event.user_id, rule.cooldown_ms, now) {
                debug!("Cooldown active for rule '{}'", rule.id);
                return Ok(None);
            }
            if !throttle.under_daily_cap(&rule.id, &event.user_id, rule.max_per_day, today) {
                debug!("Daily cap reached for rule '{}'", rule.id);
                return Ok(None);
            }
        }
        if !rule.target_users.is_empty() && !rule.target_users.contains(&event.user_id) {
            debug!("User '{}' not targeted by rule '{}'", event.user_id, rule.id);
            return Ok(None);
        }

        let Some(template) = template_by_id(&rule.template_id) else {
            return Err(NotificationError::InternalError(format!(
                "rule '{}' references unknown template '{}'",
                rule.id, rule.template_id
            )));
        };

        let input = build_input(rule, template, event);
        let created = self.store.create(input).await?;

        match created {
            Some(notification) => {
                self.throttle
                    .lock()
                    .await
                    .record(&rule.id, &event.user_id, now, today);
                debug!(
                    "Generated '{}' ({}) from rule '{}'",
                    notification.title, notification.id, rule.id
                );
                Ok(Some(notification.id))
            }
            None => {
                warn!("Store suppressed notification for rule '{}'", rule.id);
                Ok(None)
            }
        }
    }

    pub async fn stats(&self) -> GenerationStats {
        self.stats.lock().await.clone()
    }

    pub async fn reset_stats(&self) {
        *self.stats.lock().await = GenerationStats::default();
    }
}

/// Event data plus the event's context identifiers, for template rendering.
fn render_data(event: &TriggerEvent) -> HashMap<String, serde_json::Value> {
    let mut data = event.data.clone();
    if let Some(mission_id) = &event.mission_id {
        data.entry("mission_id".to_string())
            .or_insert_with(|| json!(mission_id));
    }
    if let Some(workshop_id) = event.workshop_id {
        data.entry("workshop_id".to_string())
            .or_insert_with(|| json!(workshop_id));
    }
    data.entry("user_id".to_string())
        .or_insert_with(|| json!(event.user_id));
    data
}

fn build_input(
    rule: &NotificationRule,
    template: &NotificationTemplate,
    event: &TriggerEvent,
) -> CreateNotificationInput {
    let data = render_data(event);
    let priority = dynamic_priority(template.priority, &data);

    let actions = template
        .actions
        .iter()
        .map(|a| NotificationAction {
            id: a.id.clone(),
            label: a.label.clone(),
            style: a.style,
            icon: a.icon.clone(),
            target: match &a.navigate_template {
                Some(route) => ActionTarget::Navigate(render(route, &data)),
                None => ActionTarget::Handler(a.id.clone()),
            },
        })
        .collect();

    let mut tags = template.tags.clone();
    tags.push("auto-generated".to_string());
    tags.push(format!("rule:{}", rule.id));

    let mut metadata = HashMap::new();
    metadata.insert("rule_id".to_string(), json!(rule.id));
    metadata.insert("event_type".to_string(), json!(event.event_type));
    metadata.insert("generated_at".to_string(), json!(Utc::now().to_rfc3339()));

    CreateNotificationInput {
        notification_type: template.notification_type,
        category: template.category,
        priority,
        title: render(&template.title_template, &data),
        message: render(&template.message_template, &data),
        description: template
            .description_template
            .as_ref()
            .map(|d| render(d, &data)),
        icon: template.icon.clone(),
        actions,
        context: NotificationContext {
            mission_id: event.mission_id.clone(),
            workshop_id: event.workshop_id.map(|w| w.to_string()),
            user_id: Some(event.user_id.clone()),
            session_id: event.session_id.clone(),
            metadata,
            ..Default::default()
        },
        expires_at: None,
        persistent: priority == NotificationPriority::Urgent,
        tags,
        source: Some(format!("auto-generator:{}", rule.id)),
        deep_link: deep_link_for(&rule.id, &data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::types::NotificationStatus;
    use crate::ports::kv::InMemoryKeyValueStore;
    use crate::rules::{DefaultRulesEngine, StaticRulesProvider};

    fn generator() -> (NotificationGenerator, Arc<NotificationStore>) {
        let store = Arc::new(NotificationStore::new(Arc::new(InMemoryKeyValueStore::new())));
        let engine = Arc::new(DefaultRulesEngine::new(Arc::new(StaticRulesProvider)));
        (NotificationGenerator::new(engine, store.clone()), store)
    }

    fn completion_event(score: u64) -> TriggerEvent {
        TriggerEvent {
            mission_id: Some("m1".to_string()),
            workshop_id: Some(2),
            ..TriggerEvent::new("workshop_completed", "user-1")
        }
        .with_data("score", json!(score))
        .with_data("workshop_id", json!(2))
        .with_data("user_workshop_count", json!(4))
    }

    #[tokio::test]
    async fn event_generates_notifications_for_matching_rules() {
        let (generator, store) = generator();
        let ids = generator.process_event(&completion_event(100)).await;
        // Celebration and perfect-score rules both fire.
        assert_eq!(ids.len(), 2);

        let stored = store.get(ids[0]).await.unwrap();
        assert_eq!(stored.status, NotificationStatus::Unread);
        assert!(stored.tags.contains(&"auto-generated".to_string()));

        let stats = generator.stats().await;
        assert_eq!(stats.total_events, 1);
        assert_eq!(stats.notifications_generated, 2);
        assert_eq!(stats.error_count, 0);
        assert!(stats.average_processing_ms > 0.0);
        assert_eq!(stats.last_event_type.as_deref(), Some("workshop_completed"));
    }

    #[tokio::test]
    async fn rendered_title_carries_event_data() {
        let (generator, store) = generator();
        let ids = generator.process_event(&completion_event(85)).await;
        assert_eq!(ids.len(), 1);
        let n = store.get(ids[0]).await.unwrap();
        assert_eq!(n.title, "Workshop 2 completed!");
        assert!(n.message.contains("85/100"));
    }

    #[tokio::test]
    async fn cooldown_skips_repeat_generation() {
        let (generator, _) = generator();
        let event = TriggerEvent::new("validation_error", "user-1")
            .with_data("severity", json!("high"))
            .with_data("workshop_id", json!(1))
            .with_data("error_message", json!("boom"))
            .with_data("step_name", json!("scoping"));

        assert_eq!(generator.process_event(&event).await.len(), 1);
        // Five-minute cooldown on the rule blocks the second generation.
        assert_eq!(generator.process_event(&event).await.len(), 0);

        let stats = generator.stats().await;
        assert_eq!(stats.notifications_generated, 1);
        assert_eq!(stats.notifications_skipped, 1);
    }

    #[tokio::test]
    async fn daily_cap_limits_generation() {
        let (generator, _) = generator();
        // first_workshop_milestone has no cooldown but max one per day.
        let event = TriggerEvent::new("workshop_completed", "user-1")
            .with_data("score", json!(0)) // celebration rule will not fire
            .with_data("workshop_id", json!(1))
            .with_data("user_workshop_count", json!(1));

        assert_eq!(generator.process_event(&event).await.len(), 1);
        assert_eq!(generator.process_event(&event).await.len(), 0);
    }

    #[tokio::test]
    async fn critical_severity_escalates_to_urgent_and_persistent() {
        let (generator, store) = generator();
        let event = TriggerEvent::new("validation_error", "user-1")
            .with_data("severity", json!("critical"))
            .with_data("workshop_id", json!(3))
            .with_data("error_message", json!("invalid scope"))
            .with_data("step_name", json!("assets"));

        let ids = generator.process_event(&event).await;
        let n = store.get(ids[0]).await.unwrap();
        assert_eq!(n.priority, NotificationPriority::Urgent);
        assert!(n.persistent);
    }

    #[tokio::test]
    async fn deep_link_is_attached_when_resolvable() {
        let (generator, store) = generator();
        let ids = generator.process_event(&completion_event(85)).await;
        let n = store.get(ids[0]).await.unwrap();
        assert_eq!(
            n.deep_link.as_deref(),
            Some("/missions/m1/workshops/2/results")
        );

        // Without a mission id the link is omitted.
        let mut event = completion_event(85);
        event.mission_id = None;
        let ids = generator.process_event(&event).await;
        assert!(store.get(ids[0]).await.unwrap().deep_link.is_none());
    }

    #[tokio::test]
    async fn actions_resolve_to_handler_targets() {
        let (generator, store) = generator();
        let ids = generator.process_event(&completion_event(85)).await;
        let n = store.get(ids[0]).await.unwrap();
        assert_eq!(n.actions.len(), 2);
        assert_eq!(
            n.actions[0].target,
            ActionTarget::Handler("view_results".to_string())
        );
    }

    #[test]
    fn dynamic_priority_rules() {
        let base = NotificationPriority::Medium;
        let mut data = HashMap::new();
        assert_eq!(dynamic_priority(base, &data), base);

        data.insert("compliance_issue".to_string(), json!(true));
        assert_eq!(dynamic_priority(base, &data), NotificationPriority::Urgent);

        let mut data = HashMap::new();
        data.insert("user_preference_low_priority".to_string(), json!(true));
        assert_eq!(dynamic_priority(base, &data), NotificationPriority::Low);
    }
}
