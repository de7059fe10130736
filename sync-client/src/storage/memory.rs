//! In-memory storage for tests and ephemeral hosts.
//!
//! Allows injecting failures and inspecting stored values.

use super::{Storage, StorageError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// In-memory storage.
///
/// Clones share the same map, so a test can keep a handle while the engine
/// owns another.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Debug, Default)]
struct MemoryStorageInner {
    values: BTreeMap<String, Value>,
    fail_next_get: Option<String>,
    fail_next_set: Option<String>,
    writes: usize,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with values.
    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let storage = Self::new();
        {
            let mut inner = storage.inner.lock().unwrap();
            inner.values = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        }
        storage
    }

    /// Read a value without going through the async trait.
    pub fn peek(&self, key: &str) -> Option<Value> {
        let inner = self.inner.lock().unwrap();
        inner.values.get(key).cloned()
    }

    /// Number of successful `set()` and `delete()` calls.
    pub fn write_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.writes
    }

    /// Cause the next get() to fail with the given error.
    pub fn fail_next_get(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_get = Some(error.to_string());
    }

    /// Cause the next set() or delete() to fail with the given error.
    pub fn fail_next_set(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_set = Some(error.to_string());
    }
}

impl Clone for MemoryStorage {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let mut inner = self.inner.lock().unwrap();

        // Check for forced failure
        if let Some(error) = inner.fail_next_get.take() {
            return Err(StorageError::ReadFailed(error));
        }

        Ok(inner.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_set.take() {
            return Err(StorageError::WriteFailed(error));
        }

        inner.values.insert(key.to_string(), value);
        inner.writes += 1;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_set.take() {
            return Err(StorageError::WriteFailed(error));
        }

        inner.values.remove(key);
        inner.writes += 1;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.values.keys().cloned().collect())
    }
}
