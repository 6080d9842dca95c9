// This module defines traits (ports) that the domain logic expects
// to be implemented by outer layers (e.g., application or infrastructure).

pub mod kv;

pub use kv::{FilesystemKeyValueStore, InMemoryKeyValueStore, KeyValueStore, StorageError};
