use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::notifications::types::NotificationPriority;
use crate::ports::kv::StorageError;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Unknown cache layer: {0}")]
    UnknownLayer(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),

    #[error("Cache persistence error: {0}")]
    Persistence(#[from] StorageError),
}

/// One cached value. Data is held as JSON so heterogeneous values can share
/// a layer; typed access converts at the edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: serde_json::Value,
    pub stored_at: DateTime<Utc>,
    pub ttl_ms: u64,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    /// Approximate serialized size in bytes.
    pub size: usize,
}

impl CacheEntry {
    pub fn new(data: serde_json::Value, ttl_ms: u64, now: DateTime<Utc>) -> Self {
        let size = data.to_string().len();
        Self {
            data,
            stored_at: now,
            ttl_ms,
            access_count: 0,
            last_accessed: now,
            size,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.stored_at > Duration::milliseconds(self.ttl_ms as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    pub max_entries: usize,
    pub default_ttl_ms: u64,
    pub persistent: bool,
}

impl LayerConfig {
    pub fn new(name: &str, max_entries: usize, default_ttl_ms: u64, persistent: bool) -> Self {
        Self {
            name: name.to_string(),
            max_entries,
            default_ttl_ms,
            persistent,
        }
    }
}

const MINUTE_MS: u64 = 60_000;
const HOUR_MS: u64 = 60 * MINUTE_MS;

pub const L1_RECENT: &str = "l1-recent";
pub const L2_ACTIVE: &str = "l2-active";
pub const L3_ARCHIVE: &str = "l3-archive";
pub const SERVICES: &str = "services";
pub const METRICS: &str = "metrics";

/// Global eviction order, least critical layer first.
pub const EVICTION_ORDER: [&str; 5] = [L3_ARCHIVE, METRICS, L2_ACTIVE, SERVICES, L1_RECENT];

/// The standard layer layout.
pub fn standard_layers() -> Vec<LayerConfig> {
    vec![
        LayerConfig::new(L1_RECENT, 100, 5 * MINUTE_MS, false),
        LayerConfig::new(L2_ACTIVE, 1000, 30 * MINUTE_MS, false),
        LayerConfig::new(L3_ARCHIVE, 5000, 24 * HOUR_MS, true),
        LayerConfig::new(SERVICES, 50, HOUR_MS, true),
        LayerConfig::new(METRICS, 100, 10 * MINUTE_MS, false),
    ]
}

/// Cache TTL for a notification, scaled by urgency: the more urgent, the
/// sooner it must be re-read from the store.
pub fn notification_ttl_ms(priority: NotificationPriority) -> u64 {
    match priority {
        NotificationPriority::Urgent => HOUR_MS,
        NotificationPriority::High => 4 * HOUR_MS,
        NotificationPriority::Medium => 12 * HOUR_MS,
        NotificationPriority::Low => 24 * HOUR_MS,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entry_count: usize,
    pub total_size: usize,
    /// Percentage of reads served from the cache.
    pub hit_rate: f64,
}
