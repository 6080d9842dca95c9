//! Tiered notification cache module.

pub mod tiered;
pub mod types;

pub use tiered::TieredCache;
pub use types::{
    notification_ttl_ms, standard_layers, CacheEntry, CacheError, CacheMetrics, LayerConfig,
    EVICTION_ORDER, L1_RECENT, L2_ACTIVE, L3_ARCHIVE, METRICS, SERVICES,
};
