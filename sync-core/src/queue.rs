//! In-memory queue of pending local mutations.
//!
//! Entries flow through the queue in this order:
//! 1. `enqueue()` - append, or overwrite in place by id
//! 2. `retryable()` - select entries due for a push attempt
//! 3. `mark_synced()` / `mark_failed()` - record the push outcome
//! 4. `clear_synced()` - drop accepted entries
//!
//! Failed entries that exhaust their retries stay in the queue; they are
//! never dropped silently. Persistence is handled by sync-client, which
//! stores a full snapshot of [`EntryQueue::entries`] after every mutation.

use crate::retry::RetryPolicy;
use driftsync_types::{EntryId, SyncEntry, Timestamp};
use std::time::Duration;
use thiserror::Error;

/// Error type for queue operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// No entry with this id is queued.
    #[error("entry not found: {0}")]
    NotFound(EntryId),
}

/// Ordered queue of sync entries, keyed by entry id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryQueue {
    /// Entries in insertion order.
    entries: Vec<SyncEntry>,
}

impl EntryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a queue from a persisted snapshot.
    pub fn from_entries(entries: Vec<SyncEntry>) -> Self {
        Self { entries }
    }

    /// All entries in insertion order (the persisted snapshot).
    pub fn entries(&self) -> &[SyncEntry] {
        &self.entries
    }

    /// Add an entry, or overwrite the entry with the same id in place.
    ///
    /// Returns `true` when an existing entry was overwritten.
    pub fn enqueue(&mut self, entry: SyncEntry) -> bool {
        match self.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => {
                *existing = entry;
                true
            }
            None => {
                self.entries.push(entry);
                false
            }
        }
    }

    /// Remove and return an entry.
    pub fn dequeue(&mut self, id: &EntryId) -> Option<SyncEntry> {
        let index = self.entries.iter().position(|e| &e.id == id)?;
        Some(self.entries.remove(index))
    }

    /// Look up an entry by id.
    pub fn get(&self, id: &EntryId) -> Option<&SyncEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Entries not yet accepted by the remote store.
    pub fn pending(&self) -> impl Iterator<Item = &SyncEntry> {
        self.entries.iter().filter(|e| e.is_pending())
    }

    /// Number of entries not yet accepted by the remote store.
    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }

    /// Pending entries due for a push attempt under `policy`.
    pub fn retryable(&self, policy: &RetryPolicy, now: Timestamp) -> Vec<&SyncEntry> {
        self.entries
            .iter()
            .filter(|e| policy.is_eligible(e, now))
            .collect()
    }

    /// Pending entries with fewer than `max_retries` attempts whose
    /// uncapped backoff `base_delay × 2^attempts` has elapsed.
    pub fn get_retryable(
        &self,
        max_retries: u32,
        base_delay: Duration,
        now: Timestamp,
    ) -> Vec<&SyncEntry> {
        self.retryable(&RetryPolicy::uncapped(max_retries, base_delay), now)
    }

    /// Record that the remote store accepted an entry.
    pub fn mark_synced(&mut self, id: &EntryId) -> Result<(), QueueError> {
        let entry = self.get_mut(id)?;
        entry.mark_synced();
        Ok(())
    }

    /// Record a failed push attempt.
    pub fn mark_failed(
        &mut self,
        id: &EntryId,
        error: impl Into<String>,
        now: Timestamp,
    ) -> Result<(), QueueError> {
        let entry = self.get_mut(id)?;
        entry.record_failure(error, now);
        Ok(())
    }

    /// Remove all synced entries. Returns how many were removed.
    pub fn clear_synced(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !e.synced);
        before - self.entries.len()
    }

    /// Unsynced entries for a key, oldest first.
    pub fn unsynced_for_key<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a SyncEntry> {
        self.entries
            .iter()
            .filter(move |e| e.is_pending() && e.key == key)
    }

    /// The most recent (highest version) unsynced entry for a key.
    pub fn latest_unsynced_for_key(&self, key: &str) -> Option<&SyncEntry> {
        self.entries
            .iter()
            .filter(|e| e.is_pending() && e.key == key)
            .max_by_key(|e| e.version)
    }

    /// Give entries that exhausted `max_retries` a fresh set of attempts.
    ///
    /// Returns how many entries were reset.
    pub fn reset_failed(&mut self, max_retries: u32) -> usize {
        let mut reset = 0;
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.is_pending() && e.attempts >= max_retries)
        {
            entry.attempts = 0;
            entry.last_attempt = None;
            reset += 1;
        }
        reset
    }

    /// Number of entries (synced or not).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_mut(&mut self, id: &EntryId) -> Result<&mut SyncEntry, QueueError> {
        self.entries
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or(QueueError::NotFound(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_types::{DeviceId, Operation};
    use serde_json::json;

    fn make_entry(key: &str, version: u64) -> SyncEntry {
        SyncEntry::new(
            key,
            Operation::Update,
            Some(json!({"v": version})),
            DeviceId::new("device-a"),
            version,
            Timestamp::from_millis(version * 10),
        )
    }

    #[test]
    fn queue_keeps_insertion_order() {
        let mut queue = EntryQueue::new();
        queue.enqueue(make_entry("a", 1));
        queue.enqueue(make_entry("b", 2));
        queue.enqueue(make_entry("c", 3));

        let keys: Vec<_> = queue.pending().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }

    #[test]
    fn enqueue_same_id_overwrites_in_place() {
        let mut queue = EntryQueue::new();
        let mut entry = make_entry("a", 1);
        queue.enqueue(entry.clone());
        queue.enqueue(make_entry("b", 2));

        entry.value = Some(json!("rewritten"));
        assert!(queue.enqueue(entry.clone()));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.entries()[0].value, Some(json!("rewritten")));
    }

    #[test]
    fn dequeue_removes_entry() {
        let mut queue = EntryQueue::new();
        let entry = make_entry("a", 1);
        let id = entry.id;
        queue.enqueue(entry);

        assert!(queue.dequeue(&id).is_some());
        assert!(queue.is_empty());
        assert!(queue.dequeue(&id).is_none());
    }

    #[test]
    fn mark_synced_removes_from_pending() {
        let mut queue = EntryQueue::new();
        let entry = make_entry("a", 1);
        let id = entry.id;
        queue.enqueue(entry);
        queue.enqueue(make_entry("b", 2));

        queue.mark_synced(&id).unwrap();

        assert_eq!(queue.pending_count(), 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.clear_synced(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn mark_unknown_entry_fails() {
        let mut queue = EntryQueue::new();
        let id = EntryId::new();
        assert_eq!(queue.mark_synced(&id), Err(QueueError::NotFound(id)));
        assert!(queue
            .mark_failed(&id, "boom", Timestamp::ZERO)
            .is_err());
    }

    #[test]
    fn get_retryable_respects_max_retries() {
        let mut queue = EntryQueue::new();
        let entry = make_entry("a", 1);
        let id = entry.id;
        queue.enqueue(entry);

        for i in 0..3 {
            queue.mark_failed(&id, "503", Timestamp::from_millis(i)).unwrap();
        }

        let far_future = Timestamp::from_millis(u64::MAX);
        assert!(queue
            .get_retryable(3, Duration::from_millis(1), far_future)
            .is_empty());
        assert_eq!(
            queue
                .get_retryable(4, Duration::from_millis(1), far_future)
                .len(),
            1
        );
    }

    #[test]
    fn get_retryable_waits_for_backoff() {
        let mut queue = EntryQueue::new();
        let entry = make_entry("a", 1);
        let id = entry.id;
        queue.enqueue(entry);
        queue.enqueue(make_entry("b", 2));

        queue.mark_failed(&id, "timeout", Timestamp::from_millis(1_000)).unwrap();

        // One failure: 100ms × 2^1 = 200ms
        let base = Duration::from_millis(100);
        let early = queue.get_retryable(5, base, Timestamp::from_millis(1_199));
        assert_eq!(early.len(), 1);
        assert_eq!(early[0].key, "b");

        let due = queue.get_retryable(5, base, Timestamp::from_millis(1_200));
        assert_eq!(due.len(), 2);
    }

    #[test]
    fn latest_unsynced_for_key_picks_highest_version() {
        let mut queue = EntryQueue::new();
        queue.enqueue(make_entry("doc", 1));
        queue.enqueue(make_entry("other", 2));
        queue.enqueue(make_entry("doc", 3));
        let synced = make_entry("doc", 4);
        let synced_id = synced.id;
        queue.enqueue(synced);
        queue.mark_synced(&synced_id).unwrap();

        let latest = queue.latest_unsynced_for_key("doc").unwrap();
        assert_eq!(latest.version, 3);
        assert_eq!(queue.unsynced_for_key("doc").count(), 2);
        assert!(queue.latest_unsynced_for_key("missing").is_none());
    }

    #[test]
    fn reset_failed_only_touches_exhausted_entries() {
        let mut queue = EntryQueue::new();
        let exhausted = make_entry("a", 1);
        let exhausted_id = exhausted.id;
        let retrying = make_entry("b", 2);
        let retrying_id = retrying.id;
        queue.enqueue(exhausted);
        queue.enqueue(retrying);

        for _ in 0..3 {
            queue.mark_failed(&exhausted_id, "503", Timestamp::ZERO).unwrap();
        }
        queue.mark_failed(&retrying_id, "503", Timestamp::ZERO).unwrap();

        assert_eq!(queue.reset_failed(3), 1);
        assert_eq!(queue.get(&exhausted_id).unwrap().attempts, 0);
        assert_eq!(queue.get(&retrying_id).unwrap().attempts, 1);
    }

    #[test]
    fn snapshot_roundtrip_preserves_entries() {
        let mut queue = EntryQueue::new();
        queue.enqueue(make_entry("a", 1));
        queue.enqueue(make_entry("b", 2));

        let restored = EntryQueue::from_entries(queue.entries().to_vec());
        assert_eq!(restored, queue);
    }
}
