//! Mock provider for testing.
//!
//! Keeps an in-memory remote log that any number of engines can share, and
//! allows injecting outages, rejections, latency and remote writes.

use super::{ProviderError, PushResult, SyncProvider};
use async_trait::async_trait;
use driftsync_core::apply_delta;
use driftsync_types::{DeviceId, EntryId, Operation, SyncEntry, Timestamp};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Mock provider for testing.
///
/// Clones share the same remote log, so several engines built from clones
/// of one `MockProvider` behave like devices syncing through one server.
#[derive(Debug)]
pub struct MockProvider {
    inner: Arc<Mutex<MockProviderInner>>,
}

#[derive(Debug)]
struct MockProviderInner {
    online: bool,
    realtime: bool,
    latency: Duration,
    log: Vec<SyncEntry>,
    /// Materialized value per key (`None` after a delete).
    values: BTreeMap<String, Option<Value>>,
    rejected_ids: HashSet<EntryId>,
    pushed_batches: Vec<Vec<SyncEntry>>,
    pull_requests: Vec<(Option<Timestamp>, DeviceId)>,
    subscribers: Vec<mpsc::UnboundedSender<SyncEntry>>,
    fail_next_push: Option<String>,
    fail_next_pull: Option<String>,
}

impl Default for MockProviderInner {
    fn default() -> Self {
        Self {
            online: true,
            realtime: false,
            latency: Duration::ZERO,
            log: Vec::new(),
            values: BTreeMap::new(),
            rejected_ids: HashSet::new(),
            pushed_batches: Vec::new(),
            pull_requests: Vec::new(),
            subscribers: Vec::new(),
            fail_next_push: None,
            fail_next_pull: None,
        }
    }
}

impl MockProviderInner {
    /// Append an entry to the log and notify subscribers.
    fn accept(&mut self, entry: &SyncEntry) {
        let mut stored = entry.clone();
        stored.synced = true;
        stored.attempts = 0;
        stored.last_attempt = None;
        stored.error = None;

        let value = match (&stored.operation, &stored.value, &stored.delta) {
            (Operation::Delete, _, _) => None,
            (_, Some(value), _) => Some(value.clone()),
            (_, None, Some(delta)) => {
                let base = self
                    .values
                    .get(&stored.key)
                    .cloned()
                    .flatten()
                    .unwrap_or(Value::Null);
                Some(apply_delta(&base, delta))
            }
            (_, None, None) => None,
        };
        self.values.insert(stored.key.clone(), value);

        self.subscribers.retain(|tx| tx.send(stored.clone()).is_ok());
        self.log.push(stored);
    }
}

impl MockProvider {
    /// Create a new, online mock provider.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockProviderInner::default())),
        }
    }

    /// Enable the real-time channel returned by `subscribe()`.
    pub fn with_realtime(self) -> Self {
        self.inner.lock().unwrap().realtime = true;
        self
    }

    /// Toggle reachability.
    pub fn set_online(&self, online: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.online = online;
    }

    /// Delay every push, pull and get_remote call by `latency`.
    ///
    /// Connectivity checks stay instant so timeouts can be exercised on
    /// the data calls alone.
    pub fn set_latency(&self, latency: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.latency = latency;
    }

    /// Refuse the entry with this id on every push.
    pub fn reject(&self, id: EntryId) {
        let mut inner = self.inner.lock().unwrap();
        inner.rejected_ids.insert(id);
    }

    /// Accept the entry with this id again.
    pub fn unreject(&self, id: &EntryId) {
        let mut inner = self.inner.lock().unwrap();
        inner.rejected_ids.remove(id);
    }

    /// Cause the next push() to fail as a whole with the given error.
    pub fn fail_next_push(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_push = Some(error.to_string());
    }

    /// Cause the next pull() to fail with the given error.
    pub fn fail_next_pull(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_pull = Some(error.to_string());
    }

    /// Write an entry as if another device had pushed it.
    pub fn inject_remote(&self, entry: SyncEntry) {
        let mut inner = self.inner.lock().unwrap();
        inner.accept(&entry);
    }

    /// Everything accepted so far, in arrival order.
    pub fn remote_entries(&self) -> Vec<SyncEntry> {
        let inner = self.inner.lock().unwrap();
        inner.log.clone()
    }

    /// The current materialized value for a key.
    pub fn remote_value(&self, key: &str) -> Option<Value> {
        let inner = self.inner.lock().unwrap();
        inner.values.get(key).cloned().flatten()
    }

    /// Every batch passed to push(), including refused ones.
    pub fn pushed_batches(&self) -> Vec<Vec<SyncEntry>> {
        let inner = self.inner.lock().unwrap();
        inner.pushed_batches.clone()
    }

    /// Arguments of every pull() call.
    pub fn pull_requests(&self) -> Vec<(Option<Timestamp>, DeviceId)> {
        let inner = self.inner.lock().unwrap();
        inner.pull_requests.clone()
    }

    /// Number of live real-time subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }

    async fn simulate_latency(&self) {
        let latency = self.inner.lock().unwrap().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn ensure_online(inner: &MockProviderInner) -> Result<(), ProviderError> {
        if inner.online {
            Ok(())
        } else {
            Err(ProviderError::ConnectionFailed("remote unreachable".into()))
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockProvider {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl SyncProvider for MockProvider {
    async fn push(&self, entries: &[SyncEntry]) -> Result<PushResult, ProviderError> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().unwrap();
        Self::ensure_online(&inner)?;
        inner.pushed_batches.push(entries.to_vec());

        // Check for forced failure
        if let Some(error) = inner.fail_next_push.take() {
            return Err(ProviderError::Remote(error));
        }

        let mut failed_ids = Vec::new();
        for entry in entries {
            if inner.rejected_ids.contains(&entry.id) {
                failed_ids.push(entry.id);
            } else {
                inner.accept(entry);
            }
        }
        Ok(PushResult::partial(failed_ids))
    }

    async fn pull(
        &self,
        since: Option<Timestamp>,
        device_id: &DeviceId,
    ) -> Result<Vec<SyncEntry>, ProviderError> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().unwrap();
        Self::ensure_online(&inner)?;
        inner.pull_requests.push((since, device_id.clone()));

        if let Some(error) = inner.fail_next_pull.take() {
            return Err(ProviderError::Remote(error));
        }

        Ok(inner
            .log
            .iter()
            .filter(|e| since.map_or(true, |since| e.timestamp > since))
            .cloned()
            .collect())
    }

    async fn get_remote(&self, key: &str) -> Result<Option<SyncEntry>, ProviderError> {
        self.simulate_latency().await;
        let inner = self.inner.lock().unwrap();
        Self::ensure_online(&inner)?;

        let Some(latest) = inner.log.iter().rev().find(|e| e.key == key) else {
            return Ok(None);
        };
        let mut full = latest.clone();
        full.value = inner.values.get(key).cloned().flatten();
        full.delta = None;
        Ok(Some(full))
    }

    async fn check_connection(&self) -> bool {
        self.inner.lock().unwrap().online
    }

    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<SyncEntry>> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.realtime {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.push(tx);
        Some(rx)
    }
}
