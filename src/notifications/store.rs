//! Durable notification list.
//!
//! Owns creation policy (validation, per-category opt-outs, quiet hours,
//! stored cap, default expiry), status transitions, filtered reads, stats
//! and settings. State is kept in memory and mirrored to the key/value
//! store under `notifications` / `notification-settings`.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Local, NaiveTime, Utc};
use log::{debug, info, warn};
use tokio::sync::{broadcast, RwLock};

use crate::notifications::errors::NotificationError;
use crate::notifications::types::{
    CreateNotificationInput, Notification, NotificationEvent, NotificationFilter, NotificationId,
    NotificationPriority, NotificationSettings, NotificationStats, NotificationStatus,
    SettingsUpdate,
};
use crate::ports::kv::{self, KeyValueStore};

const NOTIFICATIONS_KEY: &str = "notifications";
const SETTINGS_KEY: &str = "notification-settings";
const EVENT_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_EXPIRY_DAYS: i64 = 7;

pub struct NotificationStore {
    kv: Arc<dyn KeyValueStore>,
    // Newest notifications sit at the front.
    notifications: RwLock<VecDeque<Notification>>,
    settings: RwLock<NotificationSettings>,
    events: broadcast::Sender<NotificationEvent>,
}

impl NotificationStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            kv,
            notifications: RwLock::new(VecDeque::new()),
            settings: RwLock::new(NotificationSettings::default()),
            events,
        }
    }

    /// Loads persisted notifications and settings. Expired entries are
    /// dropped during the load.
    pub async fn load(&self) -> Result<(), NotificationError> {
        let now = Utc::now();
        if let Some(stored) = kv::get_typed::<Vec<Notification>>(&self.kv, NOTIFICATIONS_KEY)
            .await
            .map_err(|e| NotificationError::persistence("load", e))?
        {
            let before = stored.len();
            let mut live: VecDeque<Notification> =
                stored.into_iter().filter(|n| !n.is_expired(now)).collect();
            live.make_contiguous()
                .sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let dropped = before - live.len();
            if dropped > 0 {
                debug!("Dropped {} expired notifications during load", dropped);
            }
            info!("Loaded {} notifications", live.len());
            *self.notifications.write().await = live;
        }
        if let Some(settings) = kv::get_typed::<NotificationSettings>(&self.kv, SETTINGS_KEY)
            .await
            .map_err(|e| NotificationError::persistence("load", e))?
        {
            *self.settings.write().await = settings;
        }
        Ok(())
    }

    /// Subscribes to notification lifecycle events. Dropping the receiver
    /// unsubscribes; a lagging receiver never affects others.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.events.subscribe()
    }

    /// Creates a notification. Returns `Ok(None)` when current settings
    /// suppress it (globally disabled or the category is opted out).
    pub async fn create(
        &self,
        input: CreateNotificationInput,
    ) -> Result<Option<Notification>, NotificationError> {
        self.create_with_clock(input, Utc::now(), Local::now().time())
            .await
    }

    async fn create_with_clock(
        &self,
        input: CreateNotificationInput,
        now: DateTime<Utc>,
        local_time: NaiveTime,
    ) -> Result<Option<Notification>, NotificationError> {
        if input.title.trim().is_empty() {
            return Err(NotificationError::InvalidInputData {
                field: "title".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if input.message.trim().is_empty() {
            return Err(NotificationError::InvalidInputData {
                field: "message".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let settings = self.settings.read().await.clone();
        if !settings.enabled {
            debug!("Notifications disabled, suppressing '{}'", input.title);
            return Ok(None);
        }
        if !settings.category_enabled(input.category) {
            debug!(
                "Category {:?} disabled, suppressing '{}'",
                input.category, input.title
            );
            return Ok(None);
        }

        let mut notification =
            input.into_notification(now, Duration::days(DEFAULT_EXPIRY_DAYS));

        // During quiet hours, non-urgent notifications are stored already
        // read so they do not raise badges or sounds.
        if settings.quiet_hours.contains(local_time)
            && notification.priority != NotificationPriority::Urgent
        {
            notification.status = NotificationStatus::Read;
            notification.read_at = Some(now);
            debug!("Quiet hours: storing '{}' as read", notification.title);
        }

        {
            let mut notifications = self.notifications.write().await;
            notifications.push_front(notification.clone());
            Self::enforce_cap(&mut notifications, settings.max_notifications);
        }
        self.persist().await?;

        let _ = self.events.send(NotificationEvent::Created {
            notification: notification.clone(),
        });
        Ok(Some(notification))
    }

    /// Evicts from the back (oldest first), preferring non-persistent
    /// entries, until the cap is met.
    fn enforce_cap(notifications: &mut VecDeque<Notification>, max: usize) {
        while notifications.len() > max {
            let victim = notifications
                .iter()
                .enumerate()
                .rev()
                .find(|(_, n)| !n.persistent)
                .map(|(i, _)| i)
                .unwrap_or(notifications.len() - 1);
            if let Some(evicted) = notifications.remove(victim) {
                warn!(
                    "Stored notification cap reached, evicting '{}' ({})",
                    evicted.title, evicted.id
                );
            }
        }
    }

    pub async fn get(&self, id: NotificationId) -> Option<Notification> {
        self.notifications
            .read()
            .await
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    /// Filtered read, newest first. Expired notifications are removed on
    /// the way through.
    pub async fn get_notifications(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>, NotificationError> {
        self.sweep_expired().await?;
        let notifications = self.notifications.read().await;
        let matched = notifications
            .iter()
            .filter(|n| filter.matches(n))
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(matched)
    }

    pub async fn unread_count(&self) -> usize {
        self.notifications
            .read()
            .await
            .iter()
            .filter(|n| n.status == NotificationStatus::Unread)
            .count()
    }

    /// Marks an unread notification read. Already-read is a no-op;
    /// archived or dismissed notifications cannot transition back.
    pub async fn mark_as_read(&self, id: NotificationId) -> Result<(), NotificationError> {
        {
            let mut notifications = self.notifications.write().await;
            let notification = notifications
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or(NotificationError::NotFound(id))?;
            match notification.status {
                NotificationStatus::Unread => {
                    notification.status = NotificationStatus::Read;
                    notification.read_at = Some(Utc::now());
                }
                NotificationStatus::Read => return Ok(()),
                from => {
                    return Err(NotificationError::InvalidTransition {
                        id,
                        from,
                        to: NotificationStatus::Read,
                    })
                }
            }
        }
        self.persist().await?;
        let _ = self.events.send(NotificationEvent::Read { id });
        Ok(())
    }

    pub async fn mark_all_as_read(&self) -> Result<usize, NotificationError> {
        let mut marked = Vec::new();
        {
            let mut notifications = self.notifications.write().await;
            let now = Utc::now();
            for n in notifications
                .iter_mut()
                .filter(|n| n.status == NotificationStatus::Unread)
            {
                n.status = NotificationStatus::Read;
                n.read_at = Some(now);
                marked.push(n.id);
            }
        }
        if marked.is_empty() {
            return Ok(0);
        }
        self.persist().await?;
        for id in &marked {
            let _ = self.events.send(NotificationEvent::Read { id: *id });
        }
        Ok(marked.len())
    }

    /// Archives a read notification. Any other starting status is an
    /// invalid transition.
    pub async fn archive(&self, id: NotificationId) -> Result<(), NotificationError> {
        {
            let mut notifications = self.notifications.write().await;
            let notification = notifications
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or(NotificationError::NotFound(id))?;
            match notification.status {
                NotificationStatus::Read => notification.status = NotificationStatus::Archived,
                from => {
                    return Err(NotificationError::InvalidTransition {
                        id,
                        from,
                        to: NotificationStatus::Archived,
                    })
                }
            }
        }
        self.persist().await?;
        let _ = self.events.send(NotificationEvent::Archived { id });
        Ok(())
    }

    /// Dismisses a notification from any status.
    pub async fn dismiss(&self, id: NotificationId) -> Result<(), NotificationError> {
        {
            let mut notifications = self.notifications.write().await;
            let notification = notifications
                .iter_mut()
                .find(|n| n.id == id)
                .ok_or(NotificationError::NotFound(id))?;
            notification.status = NotificationStatus::Dismissed;
        }
        self.persist().await?;
        let _ = self.events.send(NotificationEvent::Dismissed { id });
        Ok(())
    }

    pub async fn delete(&self, id: NotificationId) -> Result<(), NotificationError> {
        {
            let mut notifications = self.notifications.write().await;
            let index = notifications
                .iter()
                .position(|n| n.id == id)
                .ok_or(NotificationError::NotFound(id))?;
            notifications.remove(index);
        }
        self.persist().await?;
        let _ = self.events.send(NotificationEvent::Deleted { id });
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<usize, NotificationError> {
        let removed = {
            let mut notifications = self.notifications.write().await;
            let removed = notifications.len();
            notifications.clear();
            removed
        };
        self.persist().await?;
        let _ = self.events.send(NotificationEvent::Cleared { removed });
        info!("Cleared {} notifications", removed);
        Ok(removed)
    }

    pub async fn record_action(
        &self,
        id: NotificationId,
        action_id: &str,
    ) -> Result<(), NotificationError> {
        let _ = self.events.send(NotificationEvent::ActionPerformed {
            id,
            action_id: action_id.to_string(),
        });
        Ok(())
    }

    /// Removes strictly-expired notifications. Returns how many were
    /// removed.
    pub async fn sweep_expired(&self) -> Result<usize, NotificationError> {
        let now = Utc::now();
        let removed = {
            let mut notifications = self.notifications.write().await;
            let before = notifications.len();
            notifications.retain(|n| !n.is_expired(now));
            before - notifications.len()
        };
        if removed > 0 {
            debug!("Swept {} expired notifications", removed);
            self.persist().await?;
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> NotificationStats {
        let notifications = self.notifications.read().await;
        let now = Utc::now();
        let today = now.date_naive();
        let week_start = now - Duration::days(i64::from(now.weekday().num_days_from_monday()));
        let mut stats = NotificationStats {
            total: notifications.len(),
            ..Default::default()
        };
        for n in notifications.iter() {
            if n.status == NotificationStatus::Unread {
                stats.unread += 1;
            }
            *stats.by_type.entry(n.notification_type).or_insert(0) += 1;
            *stats.by_category.entry(n.category).or_insert(0) += 1;
            *stats.by_priority.entry(n.priority).or_insert(0) += 1;
            if n.created_at.date_naive() == today {
                stats.created_today += 1;
            }
            if n.created_at.date_naive() >= week_start.date_naive() {
                stats.created_this_week += 1;
            }
            if n.created_at.date_naive().month() == today.month()
                && n.created_at.date_naive().year() == today.year()
            {
                stats.created_this_month += 1;
            }
        }
        stats
    }

    pub async fn settings(&self) -> NotificationSettings {
        self.settings.read().await.clone()
    }

    /// Applies a partial settings update and persists the result.
    pub async fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> Result<NotificationSettings, NotificationError> {
        let updated = {
            let mut settings = self.settings.write().await;
            if let Some(enabled) = update.enabled {
                settings.enabled = enabled;
            }
            if let Some(sound_enabled) = update.sound_enabled {
                settings.sound_enabled = sound_enabled;
            }
            if let Some(categories) = update.categories {
                settings.categories.extend(categories);
            }
            if let Some(quiet_hours) = update.quiet_hours {
                settings.quiet_hours = quiet_hours;
            }
            if let Some(max) = update.max_notifications {
                settings.max_notifications = max;
            }
            if let Some(days) = update.auto_archive_after_days {
                settings.auto_archive_after_days = days;
            }
            settings.clone()
        };
        kv::set_typed(&self.kv, SETTINGS_KEY, &updated)
            .await
            .map_err(|e| NotificationError::persistence("update_settings", e))?;
        let _ = self.events.send(NotificationEvent::SettingsUpdated {
            settings: updated.clone(),
        });
        Ok(updated)
    }

    async fn persist(&self) -> Result<(), NotificationError> {
        let snapshot: Vec<Notification> =
            self.notifications.read().await.iter().cloned().collect();
        kv::set_typed(&self.kv, NOTIFICATIONS_KEY, &snapshot)
            .await
            .map_err(|e| NotificationError::persistence("persist", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::types::{NotificationCategory, NotificationType};
    use crate::ports::kv::InMemoryKeyValueStore;
    use std::collections::HashMap;

    fn store() -> NotificationStore {
        NotificationStore::new(Arc::new(InMemoryKeyValueStore::new()))
    }

    fn input(title: &str) -> CreateNotificationInput {
        CreateNotificationInput::new(
            NotificationType::Info,
            NotificationCategory::Workshop,
            title,
            "message",
        )
    }

    #[tokio::test]
    async fn create_assigns_id_and_unread_status() {
        let store = store();
        let n = store.create(input("hello")).await.unwrap().unwrap();
        assert_eq!(n.status, NotificationStatus::Unread);
        assert!(n.expires_at.is_some());
        assert_eq!(store.unread_count().await, 1);
    }

    #[tokio::test]
    async fn create_rejects_empty_title() {
        let store = store();
        let err = store.create(input("  ")).await.unwrap_err();
        assert!(matches!(
            err,
            NotificationError::InvalidInputData { ref field, .. } if field == "title"
        ));
    }

    #[tokio::test]
    async fn disabled_category_suppresses_creation() {
        let store = store();
        let mut categories = HashMap::new();
        categories.insert(NotificationCategory::Workshop, false);
        store
            .update_settings(SettingsUpdate {
                categories: Some(categories),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(store.create(input("blocked")).await.unwrap().is_none());
        // Other categories still pass.
        let other = CreateNotificationInput::new(
            NotificationType::Info,
            NotificationCategory::Report,
            "ok",
            "m",
        );
        assert!(store.create(other).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn quiet_hours_store_non_urgent_as_read() {
        let store = store();
        store
            .update_settings(SettingsUpdate {
                quiet_hours: Some(crate::notifications::types::QuietHours {
                    enabled: true,
                    start: "22:00".to_string(),
                    end: "08:00".to_string(),
                }),
                ..Default::default()
            })
            .await
            .unwrap();

        let now = Utc::now();
        let quiet_time = NaiveTime::from_hms_opt(23, 0, 0).unwrap();
        let n = store
            .create_with_clock(input("quiet"), now, quiet_time)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n.status, NotificationStatus::Read);

        let mut urgent = input("loud");
        urgent.priority = NotificationPriority::Urgent;
        let n = store
            .create_with_clock(urgent, now, quiet_time)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n.status, NotificationStatus::Unread);
    }

    #[tokio::test]
    async fn status_transitions_are_enforced() {
        let store = store();
        let n = store.create(input("n")).await.unwrap().unwrap();

        // Archive before read is invalid.
        let err = store.archive(n.id).await.unwrap_err();
        assert!(matches!(err, NotificationError::InvalidTransition { .. }));

        store.mark_as_read(n.id).await.unwrap();
        // Second mark_as_read is a no-op.
        store.mark_as_read(n.id).await.unwrap();
        store.archive(n.id).await.unwrap();

        // Reading an archived notification is invalid.
        let err = store.mark_as_read(n.id).await.unwrap_err();
        assert!(matches!(err, NotificationError::InvalidTransition { .. }));

        // Dismiss works from any status.
        store.dismiss(n.id).await.unwrap();
        assert_eq!(
            store.get(n.id).await.unwrap().status,
            NotificationStatus::Dismissed
        );
    }

    #[tokio::test]
    async fn cap_evicts_oldest_non_persistent_first() {
        let store = store();
        store
            .update_settings(SettingsUpdate {
                max_notifications: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();

        let mut first = input("first");
        first.persistent = true;
        let first = store.create(first).await.unwrap().unwrap();
        let second = store.create(input("second")).await.unwrap().unwrap();
        let third = store.create(input("third")).await.unwrap().unwrap();

        assert!(store.get(first.id).await.is_some());
        assert!(store.get(second.id).await.is_none());
        assert!(store.get(third.id).await.is_some());
    }

    #[tokio::test]
    async fn filter_by_status_and_limit() {
        let store = store();
        let a = store.create(input("a")).await.unwrap().unwrap();
        store.create(input("b")).await.unwrap();
        store.mark_as_read(a.id).await.unwrap();

        let unread = store
            .get_notifications(&NotificationFilter {
                statuses: vec![NotificationStatus::Unread],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].title, "b");

        let limited = store
            .get_notifications(&NotificationFilter {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn expired_notifications_are_swept_on_read() {
        let store = store();
        let mut expired = input("old");
        expired.expires_at = Some(Utc::now() - Duration::hours(1));
        store.create(expired).await.unwrap();
        store.create(input("fresh")).await.unwrap();

        let all = store
            .get_notifications(&NotificationFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "fresh");
    }

    #[tokio::test]
    async fn persists_and_reloads() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let store = NotificationStore::new(kv.clone());
        let n = store.create(input("durable")).await.unwrap().unwrap();

        let reloaded = NotificationStore::new(kv);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.get(n.id).await.unwrap().title, "durable");
    }

    #[tokio::test]
    async fn events_are_broadcast_to_subscribers() {
        let store = store();
        let mut rx = store.subscribe();
        let n = store.create(input("evt")).await.unwrap().unwrap();
        store.mark_as_read(n.id).await.unwrap();

        match rx.recv().await.unwrap() {
            NotificationEvent::Created { notification } => assert_eq!(notification.id, n.id),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            NotificationEvent::Read { id } => assert_eq!(id, n.id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn stats_count_by_dimension() {
        let store = store();
        store.create(input("a")).await.unwrap();
        let mut urgent = input("b");
        urgent.priority = NotificationPriority::Urgent;
        store.create(urgent).await.unwrap();

        let stats = store.stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.unread, 2);
        assert_eq!(
            stats.by_priority.get(&NotificationPriority::Urgent),
            Some(&1)
        );
        assert_eq!(stats.created_today, 2);
    }
}
