//! Key/value persistence port.
//!
//! Every component that persists state (notifications, settings, cache
//! layers, scheduled jobs, buffered writes) goes through this string-keyed
//! JSON store so the domain layer stays decoupled from the host platform.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use thiserror::Error;
use tokio::sync::RwLock;

/// Persistence error type.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Read failure.
    #[error("Failed to read key '{key}': {reason}")]
    ReadError { key: String, reason: String },

    /// Write failure.
    #[error("Failed to write key '{key}': {reason}")]
    WriteError { key: String, reason: String },

    /// Stored payload could not be (de)serialized.
    #[error("Serialization error for key '{key}': {reason}")]
    SerializationError { key: String, reason: String },

    /// Other error.
    #[error("Storage error: {0}")]
    Other(String),
}

/// Async string-keyed JSON store.
///
/// Implementations must be safe for concurrent use; callers hold them behind
/// `Arc<dyn KeyValueStore>`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory store, used in tests and as a fallback when no data directory
/// is available.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Default::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Filesystem store: one JSON document per key under a data directory.
///
/// Keys may contain `:` separators (e.g. `cache:l3-archive`); they are
/// mapped to file names by replacing separators, so keys must not collide
/// after mapping.
pub struct FilesystemKeyValueStore {
    base_dir: PathBuf,
}

impl FilesystemKeyValueStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Store rooted at the platform data directory, e.g.
    /// `~/.local/share/riskforge/notifications` on Linux.
    pub fn default_location() -> Option<Self> {
        dirs::data_dir().map(|d| Self::new(d.join("riskforge").join("notifications")))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name = key.replace([':', '/'], "_");
        self.base_dir.join(format!("{}.json", file_name))
    }
}

#[async_trait]
impl KeyValueStore for FilesystemKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let value = serde_json::from_str(&contents).map_err(|e| {
                    StorageError::SerializationError {
                        key: key.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No persisted value for key '{}'", key);
                Ok(None)
            }
            Err(e) => Err(StorageError::ReadError {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::WriteError {
                    key: key.to_string(),
                    reason: format!("create_dir_all failed: {}", e),
                })?;
        }
        let contents =
            serde_json::to_string_pretty(&value).map_err(|e| StorageError::SerializationError {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| StorageError::WriteError {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Failed to remove persisted key '{}': {}", key, e);
                Err(StorageError::WriteError {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Convenience helpers for typed access over the JSON store.
pub async fn get_typed<T: serde::de::DeserializeOwned>(
    store: &Arc<dyn KeyValueStore>,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key).await? {
        Some(value) => {
            let typed =
                serde_json::from_value(value).map_err(|e| StorageError::SerializationError {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(Some(typed))
        }
        None => Ok(None),
    }
}

pub async fn set_typed<T: serde::Serialize>(
    store: &Arc<dyn KeyValueStore>,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let json = serde_json::to_value(value).map_err(|e| StorageError::SerializationError {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    store.set(key, json).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn in_memory_roundtrip_and_remove() {
        let store = InMemoryKeyValueStore::new();
        assert!(store.get("missing").await.unwrap().is_none());

        store.set("k", json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));

        store.remove("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
        // Removing again is fine.
        store.remove("k").await.unwrap();
    }

    #[tokio::test]
    async fn filesystem_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemKeyValueStore::new(dir.path().to_path_buf());
        store
            .set("cache:l3-archive", json!([1, 2, 3]))
            .await
            .unwrap();

        let reopened = FilesystemKeyValueStore::new(dir.path().to_path_buf());
        assert_eq!(
            reopened.get("cache:l3-archive").await.unwrap(),
            Some(json!([1, 2, 3]))
        );
    }

    #[tokio::test]
    async fn filesystem_store_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemKeyValueStore::new(dir.path().to_path_buf());
        assert!(store.get("nothing-here").await.unwrap().is_none());
        store.remove("nothing-here").await.unwrap();
    }
}
