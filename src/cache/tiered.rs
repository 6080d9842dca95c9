//! Tiered TTL+LRU cache.
//!
//! Named layers with individual capacity, TTL and persistence. Reads of
//! notifications probe recent -> active -> archive and promote archive hits
//! back into the active layer. At capacity a layer evicts its least
//! recently used entry; a global memory budget evicts across layers in a
//! fixed least-critical-first order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::types::{
    notification_ttl_ms, standard_layers, CacheEntry, CacheError, CacheMetrics, LayerConfig,
    EVICTION_ORDER, L1_RECENT, L2_ACTIVE, L3_ARCHIVE,
};
use crate::notifications::types::{Notification, NotificationId};
use crate::ports::kv::KeyValueStore;

const DEFAULT_MEMORY_BUDGET: usize = 50 * 1024 * 1024;
const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(5 * 60);

struct Layer {
    config: LayerConfig,
    entries: HashMap<String, CacheEntry>,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
}

#[derive(Serialize, Deserialize)]
struct PersistedLayer {
    entries: Vec<(String, CacheEntry)>,
}

pub struct TieredCache {
    kv: Arc<dyn KeyValueStore>,
    layers: RwLock<HashMap<String, Layer>>,
    counters: RwLock<Counters>,
    memory_budget: usize,
}

impl TieredCache {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_layers(kv, standard_layers(), DEFAULT_MEMORY_BUDGET)
    }

    pub fn with_layers(
        kv: Arc<dyn KeyValueStore>,
        configs: Vec<LayerConfig>,
        memory_budget: usize,
    ) -> Self {
        let layers = configs
            .into_iter()
            .map(|config| {
                (
                    config.name.clone(),
                    Layer {
                        config,
                        entries: HashMap::new(),
                    },
                )
            })
            .collect();
        Self {
            kv,
            layers: RwLock::new(layers),
            counters: RwLock::new(Counters::default()),
            memory_budget,
        }
    }

    /// Loads persistent layers, dropping entries whose TTL already elapsed.
    pub async fn load(&self) -> Result<(), CacheError> {
        let now = Utc::now();
        let mut layers = self.layers.write().await;
        for layer in layers.values_mut() {
            if !layer.config.persistent {
                continue;
            }
            let key = persistence_key(&layer.config.name);
            let Some(value) = self.kv.get(&key).await? else {
                continue;
            };
            let persisted: PersistedLayer = serde_json::from_value(value)
                .map_err(|e| CacheError::Serialization(e.to_string()))?;
            let before = persisted.entries.len();
            layer.entries = persisted
                .entries
                .into_iter()
                .filter(|(_, entry)| !entry.is_expired(now))
                .collect();
            info!(
                "Cache layer '{}' loaded: {} entries ({} expired dropped)",
                layer.config.name,
                layer.entries.len(),
                before - layer.entries.len()
            );
        }
        Ok(())
    }

    /// Stores a value. `ttl_ms` of `None` uses the layer default.
    pub async fn set<T: Serialize>(
        &self,
        layer_name: &str,
        key: &str,
        value: &T,
        ttl_ms: Option<u64>,
    ) -> Result<(), CacheError> {
        let data =
            serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let now = Utc::now();
        let persistent = {
            let mut layers = self.layers.write().await;
            let mut evicted = 0u64;

            {
                let layer = layers
                    .get_mut(layer_name)
                    .ok_or_else(|| CacheError::UnknownLayer(layer_name.to_string()))?;
                let ttl = ttl_ms.unwrap_or(layer.config.default_ttl_ms);

                while layer.entries.len() >= layer.config.max_entries {
                    if evict_lru(layer) {
                        evicted += 1;
                    } else {
                        break;
                    }
                }
                layer
                    .entries
                    .insert(key.to_string(), CacheEntry::new(data, ttl, now));
            }

            evicted += enforce_memory_budget(&mut layers, self.memory_budget);
            if evicted > 0 {
                self.counters.write().await.evictions += evicted;
            }
            layers
                .get(layer_name)
                .map(|l| l.config.persistent)
                .unwrap_or(false)
        };
        if persistent {
            self.persist_layer(layer_name).await?;
        }
        Ok(())
    }

    /// Typed read. Expired entries are removed and counted as misses.
    pub async fn get<T: DeserializeOwned>(
        &self,
        layer_name: &str,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        match self.get_value(layer_name, key).await {
            Some(value) => {
                let typed = serde_json::from_value(value)
                    .map_err(|e| CacheError::Serialization(e.to_string()))?;
                Ok(Some(typed))
            }
            None => Ok(None),
        }
    }

    async fn get_value(&self, layer_name: &str, key: &str) -> Option<serde_json::Value> {
        let now = Utc::now();
        let mut layers = self.layers.write().await;
        let Some(layer) = layers.get_mut(layer_name) else {
            self.counters.write().await.misses += 1;
            return None;
        };
        match layer.entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                layer.entries.remove(key);
                let mut counters = self.counters.write().await;
                counters.misses += 1;
                counters.evictions += 1;
                None
            }
            Some(entry) => {
                entry.access_count += 1;
                entry.last_accessed = now;
                let data = entry.data.clone();
                self.counters.write().await.hits += 1;
                Some(data)
            }
            None => {
                self.counters.write().await.misses += 1;
                None
            }
        }
    }

    pub async fn delete(&self, layer_name: &str, key: &str) -> Result<bool, CacheError> {
        let (deleted, persistent) = {
            let mut layers = self.layers.write().await;
            let Some(layer) = layers.get_mut(layer_name) else {
                return Ok(false);
            };
            (
                layer.entries.remove(key).is_some(),
                layer.config.persistent,
            )
        };
        if deleted && persistent {
            self.persist_layer(layer_name).await?;
        }
        Ok(deleted)
    }

    // --- Notification helpers ---

    pub async fn set_notification(
        &self,
        notification: &Notification,
        layer_name: &str,
    ) -> Result<(), CacheError> {
        let key = notification_key(notification.id);
        let ttl = notification_ttl_ms(notification.priority);
        self.set(layer_name, &key, notification, Some(ttl)).await
    }

    /// Probes recent -> active -> archive. An archive hit is promoted into
    /// the active layer for subsequent reads.
    pub async fn get_notification(&self, id: NotificationId) -> Option<Notification> {
        let key = notification_key(id);
        for layer_name in [L1_RECENT, L2_ACTIVE, L3_ARCHIVE] {
            let hit: Option<Notification> = self
                .get(layer_name, &key)
                .await
                .unwrap_or_else(|e| {
                    warn!("Cache read failed on layer '{}': {}", layer_name, e);
                    None
                });
            if let Some(notification) = hit {
                if layer_name == L3_ARCHIVE {
                    if let Err(e) = self.set_notification(&notification, L2_ACTIVE).await {
                        warn!("Promotion to '{}' failed: {}", L2_ACTIVE, e);
                    }
                }
                return Some(notification);
            }
        }
        None
    }

    pub async fn delete_notification(&self, id: NotificationId) -> Result<(), CacheError> {
        let key = notification_key(id);
        let names: Vec<String> = self.layers.read().await.keys().cloned().collect();
        for name in names {
            self.delete(&name, &key).await?;
        }
        Ok(())
    }

    // --- Maintenance ---

    /// Removes strictly-expired entries from every layer. Returns how many
    /// were removed.
    pub async fn sweep_expired(&self) -> Result<usize, CacheError> {
        let now = Utc::now();
        let mut touched_persistent = Vec::new();
        let removed = {
            let mut layers = self.layers.write().await;
            let mut removed = 0;
            for layer in layers.values_mut() {
                let before = layer.entries.len();
                layer.entries.retain(|_, entry| !entry.is_expired(now));
                let cleaned = before - layer.entries.len();
                removed += cleaned;
                if cleaned > 0 && layer.config.persistent {
                    touched_persistent.push(layer.config.name.clone());
                }
            }
            removed
        };
        if removed > 0 {
            debug!("Cache sweep removed {} expired entries", removed);
            self.counters.write().await.evictions += removed as u64;
            for name in touched_persistent {
                self.persist_layer(&name).await?;
            }
        }
        Ok(removed)
    }

    /// Spawns the periodic expiry sweep.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = cache.sweep_expired().await {
                    warn!("Cache sweep failed: {}", e);
                }
            }
        })
    }

    pub async fn clear_layer(&self, layer_name: &str) -> Result<(), CacheError> {
        let persistent = {
            let mut layers = self.layers.write().await;
            let layer = layers
                .get_mut(layer_name)
                .ok_or_else(|| CacheError::UnknownLayer(layer_name.to_string()))?;
            layer.entries.clear();
            layer.config.persistent
        };
        if persistent {
            self.kv.remove(&persistence_key(layer_name)).await?;
        }
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<(), CacheError> {
        let names: Vec<String> = self.layers.read().await.keys().cloned().collect();
        for name in names {
            self.clear_layer(&name).await?;
        }
        info!("All cache layers cleared");
        Ok(())
    }

    pub async fn metrics(&self) -> CacheMetrics {
        let layers = self.layers.read().await;
        let counters = self.counters.read().await;
        let entry_count = layers.values().map(|l| l.entries.len()).sum();
        let total_size = layers
            .values()
            .flat_map(|l| l.entries.values())
            .map(|e| e.size)
            .sum();
        let lookups = counters.hits + counters.misses;
        CacheMetrics {
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
            entry_count,
            total_size,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                counters.hits as f64 / lookups as f64 * 100.0
            },
        }
    }

    async fn persist_layer(&self, layer_name: &str) -> Result<(), CacheError> {
        let snapshot = {
            let layers = self.layers.read().await;
            let Some(layer) = layers.get(layer_name) else {
                return Ok(());
            };
            PersistedLayer {
                entries: layer
                    .entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            }
        };
        let value = serde_json::to_value(&snapshot)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.kv.set(&persistence_key(layer_name), value).await?;
        Ok(())
    }

    #[cfg(test)]
    async fn backdate(&self, layer_name: &str, key: &str, by: chrono::Duration) {
        let mut layers = self.layers.write().await;
        if let Some(entry) = layers
            .get_mut(layer_name)
            .and_then(|l| l.entries.get_mut(key))
        {
            entry.stored_at -= by;
            entry.last_accessed -= by;
        }
    }
}

fn notification_key(id: NotificationId) -> String {
    format!("notification:{}", id)
}

fn persistence_key(layer_name: &str) -> String {
    format!("cache:{}", layer_name)
}

/// Removes the least recently used entry. Returns false on an empty layer.
fn evict_lru(layer: &mut Layer) -> bool {
    let victim = layer
        .entries
        .iter()
        .min_by_key(|(_, entry)| entry.last_accessed)
        .map(|(key, _)| key.clone());
    match victim {
        Some(key) => {
            layer.entries.remove(&key);
            true
        }
        None => false,
    }
}

/// Evicts across layers, least critical first, until the total size fits
/// the budget. Returns the eviction count.
fn enforce_memory_budget(layers: &mut HashMap<String, Layer>, budget: usize) -> u64 {
    let mut evicted = 0;
    loop {
        let total: usize = layers
            .values()
            .flat_map(|l| l.entries.values())
            .map(|e| e.size)
            .sum();
        if total <= budget {
            return evicted;
        }
        let mut any = false;
        for name in EVICTION_ORDER {
            if let Some(layer) = layers.get_mut(name) {
                if !layer.entries.is_empty() && evict_lru(layer) {
                    evicted += 1;
                    any = true;
                    break;
                }
            }
        }
        if !any {
            return evicted;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::types::{METRICS, SERVICES};
    use crate::notifications::types::{
        CreateNotificationInput, NotificationCategory, NotificationType,
    };
    use crate::ports::kv::InMemoryKeyValueStore;
    use chrono::Duration;

    fn cache() -> TieredCache {
        TieredCache::new(Arc::new(InMemoryKeyValueStore::new()))
    }

    fn sample_notification() -> Notification {
        CreateNotificationInput::new(
            NotificationType::Info,
            NotificationCategory::System,
            "cached",
            "message",
        )
        .into_notification(Utc::now(), Duration::days(7))
    }

    #[tokio::test]
    async fn set_get_roundtrip() {
        let cache = cache();
        cache
            .set(SERVICES, "svc", &vec![1, 2, 3], None)
            .await
            .unwrap();
        let value: Option<Vec<i32>> = cache.get(SERVICES, "svc").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn unknown_layer_is_an_error() {
        let cache = cache();
        let err = cache.set("nope", "k", &1, None).await.unwrap_err();
        assert!(matches!(err, CacheError::UnknownLayer(_)));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_miss_and_is_removed() {
        let cache = cache();
        cache.set(METRICS, "m", &42, None).await.unwrap();
        cache
            .backdate(METRICS, "m", Duration::minutes(11))
            .await;

        let value: Option<i32> = cache.get(METRICS, "m").await.unwrap();
        assert!(value.is_none());

        let metrics = cache.metrics().await;
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.evictions, 1);
        assert_eq!(metrics.entry_count, 0);
    }

    #[tokio::test]
    async fn lru_eviction_at_layer_capacity() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let layers = vec![LayerConfig::new("tiny", 2, 60_000, false)];
        let cache = TieredCache::with_layers(kv, layers, usize::MAX);

        cache.set("tiny", "a", &1, None).await.unwrap();
        cache.set("tiny", "b", &2, None).await.unwrap();
        // Touch "a" so "b" becomes the LRU victim.
        cache.backdate("tiny", "b", Duration::seconds(5)).await;
        let _: Option<i32> = cache.get("tiny", "a").await.unwrap();

        cache.set("tiny", "c", &3, None).await.unwrap();
        assert!(cache.get::<i32>("tiny", "b").await.unwrap().is_none());
        assert!(cache.get::<i32>("tiny", "a").await.unwrap().is_some());
        assert!(cache.get::<i32>("tiny", "c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn archive_hit_promotes_to_active_layer() {
        let cache = cache();
        let notification = sample_notification();
        cache
            .set_notification(&notification, L3_ARCHIVE)
            .await
            .unwrap();

        let found = cache.get_notification(notification.id).await.unwrap();
        assert_eq!(found.id, notification.id);

        // Now present in the active layer directly.
        let key = notification_key(notification.id);
        let promoted: Option<Notification> = cache.get(L2_ACTIVE, &key).await.unwrap();
        assert!(promoted.is_some());
    }

    #[tokio::test]
    async fn memory_budget_evicts_least_critical_layer_first() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let layers = vec![
            LayerConfig::new(L1_RECENT, 100, 60_000, false),
            LayerConfig::new(L3_ARCHIVE, 100, 60_000, false),
        ];
        // Budget below the size of two entries.
        let cache = TieredCache::with_layers(kv, layers, 40);

        cache.set(L1_RECENT, "keep", &"0123456789", None).await.unwrap();
        cache.set(L3_ARCHIVE, "drop", &"0123456789", None).await.unwrap();
        cache.set(L1_RECENT, "more", &"0123456789", None).await.unwrap();

        // The archive layer was drained before any recent entry.
        assert!(cache.get::<String>(L3_ARCHIVE, "drop").await.unwrap().is_none());
        assert!(cache.get::<String>(L1_RECENT, "keep").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn persistent_layer_survives_reload() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let cache = TieredCache::new(kv.clone());
        cache.set(SERVICES, "svc", &"state", None).await.unwrap();

        let reloaded = TieredCache::new(kv);
        reloaded.load().await.unwrap();
        let value: Option<String> = reloaded.get(SERVICES, "svc").await.unwrap();
        assert_eq!(value.as_deref(), Some("state"));
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let cache = cache();
        cache.set(METRICS, "old", &1, None).await.unwrap();
        cache.set(METRICS, "new", &2, None).await.unwrap();
        cache
            .backdate(METRICS, "old", Duration::minutes(11))
            .await;

        let removed = cache.sweep_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get::<i32>(METRICS, "new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn hit_rate_reflects_lookups() {
        let cache = cache();
        cache.set(SERVICES, "k", &1, None).await.unwrap();
        let _: Option<i32> = cache.get(SERVICES, "k").await.unwrap();
        let _: Option<i32> = cache.get(SERVICES, "absent").await.unwrap();

        let metrics = cache.metrics().await;
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert!((metrics.hit_rate - 50.0).abs() < f64::EPSILON);
    }
}
