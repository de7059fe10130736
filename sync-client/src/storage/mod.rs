//! Local key-value storage abstraction.
//!
//! The engine never owns a database. Hosts inject a [`Storage`]
//! implementation; the engine reads and writes application values through
//! it and keeps its own bookkeeping (queue, conflicts, counters) under the
//! reserved `__driftsync/` prefix.
//!
//! # Design
//!
//! The trait is async and value-oriented:
//! - `get()` reads a key (absent keys are `None`, not errors)
//! - `set()` writes a whole value
//! - `delete()` removes a key (removing an absent key is not an error)
//! - `keys()` lists every stored key

mod memory;

pub use memory::MemoryStorage;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Prefix of keys owned by the engine. Tracked changes never use it.
pub const RESERVED_PREFIX: &str = "__driftsync/";

/// Persisted snapshot of the sync queue.
pub const QUEUE_KEY: &str = "__driftsync/queue";

/// Persisted snapshot of the conflict store.
pub const CONFLICTS_KEY: &str = "__driftsync/conflicts";

/// Per-device version counter.
pub const VERSION_KEY: &str = "__driftsync/version";

/// Start time of the last completed sync cycle.
pub const LAST_SYNC_KEY: &str = "__driftsync/last_sync";

/// Whether `key` belongs to the engine rather than the application.
pub fn is_reserved(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend failed to read.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// The backend failed to write.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A stored value could not be decoded.
    #[error("corrupt value at {key}: {reason}")]
    Corrupt {
        /// The offending key.
        key: String,
        /// Decoder message.
        reason: String,
    },
}

/// Key-value store holding application values and engine snapshots.
///
/// Implementations must be safe to share between tasks.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Remove a value.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// List all keys.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Read a typed snapshot stored as JSON.
pub(crate) async fn load_json<S, T>(storage: &S, key: &str) -> Result<Option<T>, StorageError>
where
    S: Storage + ?Sized,
    T: serde::de::DeserializeOwned,
{
    match storage.get(key).await? {
        None => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            }),
    }
}

/// Write a typed snapshot as JSON.
pub(crate) async fn save_json<S, T>(storage: &S, key: &str, value: &T) -> Result<(), StorageError>
where
    S: Storage + ?Sized,
    T: serde::Serialize,
{
    let value =
        serde_json::to_value(value).map_err(|e| StorageError::WriteFailed(e.to_string()))?;
    storage.set(key, value).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_keys_are_recognized() {
        for key in [QUEUE_KEY, CONFLICTS_KEY, VERSION_KEY, LAST_SYNC_KEY] {
            assert!(is_reserved(key), "{key}");
        }
        assert!(!is_reserved("notes/1"));
        assert!(!is_reserved("__driftsync"));
    }

    #[tokio::test]
    async fn json_helpers_round_trip() {
        let storage = MemoryStorage::new();
        save_json(&storage, "k", &vec![1u32, 2, 3]).await.unwrap();

        let loaded: Option<Vec<u32>> = load_json(&storage, "k").await.unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));

        let missing: Option<Vec<u32>> = load_json(&storage, "absent").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn load_json_reports_corrupt_snapshot() {
        let storage = MemoryStorage::new();
        storage
            .set("k", serde_json::json!("not a list"))
            .await
            .unwrap();

        let result: Result<Option<Vec<u32>>, _> = load_json(&storage, "k").await;
        assert!(matches!(result, Err(StorageError::Corrupt { key, .. }) if key == "k"));
    }
}
