//! Persisted sync queue.
//!
//! [`SyncQueue`] wraps the pure [`EntryQueue`] and writes a full snapshot to
//! storage (under [`QUEUE_KEY`]) after every mutation, so queued work
//! survives restarts.

use crate::storage::{load_json, save_json, Storage, StorageError, QUEUE_KEY};
use driftsync_core::{EntryQueue, QueueError, RetryPolicy};
use driftsync_types::{EntryId, SyncEntry, Timestamp};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors from persisted queue operations.
#[derive(Debug, Error)]
pub enum SyncQueueError {
    /// The entry is not queued.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The snapshot could not be written.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Queue of pending local mutations, persisted on every change.
pub struct SyncQueue<S: Storage> {
    storage: Arc<S>,
    queue: EntryQueue,
}

impl<S: Storage> SyncQueue<S> {
    /// Restore the queue from storage (empty when no snapshot exists).
    pub async fn load(storage: Arc<S>) -> Result<Self, StorageError> {
        let entries: Vec<SyncEntry> = load_json(storage.as_ref(), QUEUE_KEY)
            .await?
            .unwrap_or_default();
        debug!("restored {} queued entries", entries.len());
        Ok(Self {
            storage,
            queue: EntryQueue::from_entries(entries),
        })
    }

    /// Add an entry, or overwrite the entry with the same id.
    pub async fn enqueue(&mut self, entry: SyncEntry) -> Result<(), StorageError> {
        self.queue.enqueue(entry);
        self.persist().await
    }

    /// Remove an entry.
    pub async fn dequeue(&mut self, id: &EntryId) -> Result<Option<SyncEntry>, StorageError> {
        let removed = self.queue.dequeue(id);
        if removed.is_some() {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Look up an entry.
    pub fn get(&self, id: &EntryId) -> Option<&SyncEntry> {
        self.queue.get(id)
    }

    /// Entries not yet accepted by the remote store, in insertion order.
    pub fn pending(&self) -> Vec<SyncEntry> {
        self.queue.pending().cloned().collect()
    }

    /// Number of pending entries.
    pub fn pending_count(&self) -> usize {
        self.queue.pending_count()
    }

    /// Pending entries under the uncapped `base_delay × 2^attempts` rule.
    pub fn get_retryable(
        &self,
        max_retries: u32,
        base_delay: Duration,
        now: Timestamp,
    ) -> Vec<SyncEntry> {
        self.queue
            .get_retryable(max_retries, base_delay, now)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Pending entries due under `policy`.
    pub fn retryable(&self, policy: &RetryPolicy, now: Timestamp) -> Vec<SyncEntry> {
        self.queue
            .retryable(policy, now)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Record acceptance by the remote store.
    pub async fn mark_synced(&mut self, id: &EntryId) -> Result<(), SyncQueueError> {
        self.queue.mark_synced(id)?;
        self.persist().await?;
        Ok(())
    }

    /// Record a failed push attempt.
    pub async fn mark_failed(
        &mut self,
        id: &EntryId,
        error: &str,
        now: Timestamp,
    ) -> Result<(), SyncQueueError> {
        self.queue.mark_failed(id, error, now)?;
        self.persist().await?;
        Ok(())
    }

    /// Drop all synced entries. Returns how many were removed.
    pub async fn clear_synced(&mut self) -> Result<usize, StorageError> {
        let removed = self.queue.clear_synced();
        if removed > 0 {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// The most recent unsynced entry for a key.
    pub fn latest_unsynced_for_key(&self, key: &str) -> Option<&SyncEntry> {
        self.queue.latest_unsynced_for_key(key)
    }

    /// Mark every unsynced entry for `key` as synced.
    ///
    /// Used once a conflict on `key` is resolved: whatever was queued before
    /// the conflict is superseded by the resolution.
    pub async fn settle_key(&mut self, key: &str) -> Result<usize, SyncQueueError> {
        let ids: Vec<EntryId> = self.queue.unsynced_for_key(key).map(|e| e.id).collect();
        for id in &ids {
            self.queue.mark_synced(id)?;
        }
        if !ids.is_empty() {
            self.persist().await?;
        }
        Ok(ids.len())
    }

    /// Give exhausted entries a fresh set of attempts.
    pub async fn reset_failed(&mut self, max_retries: u32) -> Result<usize, StorageError> {
        let reset = self.queue.reset_failed(max_retries);
        if reset > 0 {
            self.persist().await?;
        }
        Ok(reset)
    }

    /// Number of entries (synced or not).
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    async fn persist(&self) -> Result<(), StorageError> {
        save_json(self.storage.as_ref(), QUEUE_KEY, &self.queue.entries()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use driftsync_types::{DeviceId, Operation};
    use serde_json::json;

    fn make_entry(key: &str, version: u64) -> SyncEntry {
        SyncEntry::new(
            key,
            Operation::Update,
            Some(json!({"v": version})),
            DeviceId::new("device-a"),
            version,
            Timestamp::from_millis(version),
        )
    }

    async fn new_queue() -> (SyncQueue<MemoryStorage>, MemoryStorage) {
        let storage = MemoryStorage::new();
        let queue = SyncQueue::load(Arc::new(storage.clone())).await.unwrap();
        (queue, storage)
    }

    // ===========================================
    // Persistence Tests
    // ===========================================

    #[tokio::test]
    async fn every_mutation_writes_a_snapshot() {
        let (mut queue, storage) = new_queue().await;
        let entry = make_entry("a", 1);
        let id = entry.id;

        queue.enqueue(entry).await.unwrap();
        assert_eq!(storage.write_count(), 1);

        queue.mark_failed(&id, "503", Timestamp::ZERO).await.unwrap();
        queue.mark_synced(&id).await.unwrap();
        assert_eq!(storage.write_count(), 3);

        let snapshot = storage.peek(QUEUE_KEY).unwrap();
        assert_eq!(snapshot[0]["synced"], json!(true));
        assert_eq!(snapshot[0]["attempts"], json!(1));
    }

    #[tokio::test]
    async fn load_restores_snapshot() {
        let (mut queue, storage) = new_queue().await;
        queue.enqueue(make_entry("a", 1)).await.unwrap();
        queue.enqueue(make_entry("b", 2)).await.unwrap();

        let restored = SyncQueue::load(Arc::new(storage)).await.unwrap();
        let keys: Vec<_> = restored.pending().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[tokio::test]
    async fn failed_write_surfaces_error() {
        let (mut queue, storage) = new_queue().await;
        storage.fail_next_set("disk full");

        let result = queue.enqueue(make_entry("a", 1)).await;
        assert!(matches!(result, Err(StorageError::WriteFailed(_))));
    }

    #[tokio::test]
    async fn load_rejects_corrupt_snapshot() {
        let storage = MemoryStorage::with_values([(QUEUE_KEY, json!({"not": "a list"}))]);
        let result = SyncQueue::load(Arc::new(storage)).await;
        assert!(matches!(result, Err(StorageError::Corrupt { .. })));
    }

    // ===========================================
    // Queue Operation Tests
    // ===========================================

    #[tokio::test]
    async fn clear_synced_removes_only_synced() {
        let (mut queue, _) = new_queue().await;
        let a = make_entry("a", 1);
        let a_id = a.id;
        queue.enqueue(a).await.unwrap();
        queue.enqueue(make_entry("b", 2)).await.unwrap();
        queue.mark_synced(&a_id).await.unwrap();

        assert_eq!(queue.clear_synced().await.unwrap(), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pending_count(), 1);
    }

    #[tokio::test]
    async fn dequeue_returns_entry() {
        let (mut queue, _) = new_queue().await;
        let entry = make_entry("a", 1);
        let id = entry.id;
        queue.enqueue(entry).await.unwrap();

        let removed = queue.dequeue(&id).await.unwrap().unwrap();
        assert_eq!(removed.key, "a");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn mark_unknown_entry_is_an_error() {
        let (mut queue, _) = new_queue().await;
        let result = queue.mark_synced(&EntryId::new()).await;
        assert!(matches!(result, Err(SyncQueueError::Queue(QueueError::NotFound(_)))));
    }

    #[tokio::test]
    async fn settle_key_marks_all_entries_for_key() {
        let (mut queue, _) = new_queue().await;
        queue.enqueue(make_entry("doc", 1)).await.unwrap();
        queue.enqueue(make_entry("doc", 2)).await.unwrap();
        queue.enqueue(make_entry("other", 3)).await.unwrap();

        assert_eq!(queue.settle_key("doc").await.unwrap(), 2);
        assert_eq!(queue.pending_count(), 1);
        assert!(queue.latest_unsynced_for_key("doc").is_none());
    }

    #[tokio::test]
    async fn retryable_uses_policy() {
        let (mut queue, _) = new_queue().await;
        let entry = make_entry("a", 1);
        let id = entry.id;
        queue.enqueue(entry).await.unwrap();
        queue
            .mark_failed(&id, "503", Timestamp::from_millis(1_000))
            .await
            .unwrap();

        let policy = RetryPolicy::uncapped(5, Duration::from_millis(100));
        assert!(queue.retryable(&policy, Timestamp::from_millis(1_100)).is_empty());
        assert_eq!(queue.retryable(&policy, Timestamp::from_millis(1_200)).len(), 1);
        assert_eq!(
            queue
                .get_retryable(5, Duration::from_millis(100), Timestamp::from_millis(1_200))
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn reset_failed_requeues_exhausted_entries() {
        let (mut queue, _) = new_queue().await;
        let entry = make_entry("a", 1);
        let id = entry.id;
        queue.enqueue(entry).await.unwrap();
        for _ in 0..2 {
            queue.mark_failed(&id, "503", Timestamp::ZERO).await.unwrap();
        }

        assert_eq!(queue.reset_failed(2).await.unwrap(), 1);
        let policy = RetryPolicy::uncapped(2, Duration::from_millis(100));
        assert_eq!(queue.retryable(&policy, Timestamp::ZERO).len(), 1);
    }
}
