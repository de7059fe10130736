//! JSON-file storage for a device's values and sync bookkeeping.
//!
//! The whole map is kept in memory and rewritten on every change. Writes go
//! to a temporary file first and are renamed into place.

use async_trait::async_trait;
use driftsync_client::{Storage, StorageError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// [`Storage`] backed by one JSON file.
pub struct FileStorage {
    path: PathBuf,
    values: Mutex<BTreeMap<String, Value>>,
}

impl FileStorage {
    /// Open the store at `path` (empty when the file does not exist yet).
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        let values = match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|e| StorageError::Corrupt {
                    key: path.display().to_string(),
                    reason: e.to_string(),
                })?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StorageError::ReadFailed(e.to_string())),
        };
        Ok(Self {
            path: path.to_path_buf(),
            values: Mutex::new(values),
        })
    }

    async fn flush(&self, values: &BTreeMap<String, Value>) -> Result<(), StorageError> {
        let contents = serde_json::to_string_pretty(values)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut values = self.values.lock().await;
        values.insert(key.to_string(), value);
        self.flush(&values).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().await;
        if values.remove(key).is_some() {
            self.flush(&values).await?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.values.lock().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStorage::open(&path).await.unwrap();
        store.set("a", json!({"n": 1})).await.unwrap();
        store.set("b", json!("two")).await.unwrap();
        store.delete("b").await.unwrap();
        drop(store);

        let reopened = FileStorage::open(&path).await.unwrap();
        assert_eq!(reopened.get("a").await.unwrap(), Some(json!({"n": 1})));
        assert_eq!(reopened.get("b").await.unwrap(), None);
        assert_eq!(reopened.keys().await.unwrap(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileStorage::open(&dir.path().join("store.json"))
            .await
            .unwrap();
        assert!(store.keys().await.unwrap().is_empty());
        store.delete("absent").await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        assert!(matches!(
            FileStorage::open(&path).await,
            Err(StorageError::Corrupt { .. })
        ));
    }
}
