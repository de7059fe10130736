//! Remote store kept in a shared directory.
//!
//! The directory holds `log.json`, the list of every accepted entry in
//! arrival order. Any number of devices can point at the same directory.
//! Delta-only entries are stored with their value rebuilt against the
//! previous value for the key, so readers always get full values.
//!
//! Pushes hold `log.lock` (created exclusively) while they rewrite the log,
//! so separate processes never overwrite each other's entries. A lock left
//! behind by a crashed process has to be removed by hand.

use async_trait::async_trait;
use driftsync_client::{ProviderError, PushResult, SyncProvider};
use driftsync_core::apply_delta;
use driftsync_types::{DeviceId, Operation, SyncEntry, Timestamp};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

const LOG_FILE: &str = "log.json";
const LOCK_FILE: &str = "log.lock";
const LOCK_POLL: Duration = Duration::from_millis(20);
const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

/// [`SyncProvider`] backed by a directory.
pub struct DirectoryProvider {
    dir: PathBuf,
    write_lock: Mutex<()>,
    lock_wait: Duration,
}

impl DirectoryProvider {
    /// Use `dir` as the remote store. The directory must already exist.
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    /// How long a push waits for another process to release the log.
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    /// Create the remote directory if needed.
    pub async fn create(dir: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(dir).await
    }

    async fn read_log(&self) -> Result<Vec<SyncEntry>, ProviderError> {
        let path = self.dir.join(LOG_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| ProviderError::Remote(format!("corrupt remote log: {}", e))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.ensure_reachable().await?;
                Ok(Vec::new())
            }
            Err(e) => Err(ProviderError::ConnectionFailed(e.to_string())),
        }
    }

    async fn write_log(&self, log: &[SyncEntry]) -> Result<(), ProviderError> {
        let contents = serde_json::to_string_pretty(log)
            .map_err(|e| ProviderError::Remote(e.to_string()))?;
        let path = self.dir.join(LOG_FILE);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| ProviderError::ConnectionFailed(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| ProviderError::ConnectionFailed(e.to_string()))
    }

    async fn ensure_reachable(&self) -> Result<(), ProviderError> {
        if self.check_connection().await {
            Ok(())
        } else {
            Err(ProviderError::ConnectionFailed(format!(
                "remote directory {} not found",
                self.dir.display()
            )))
        }
    }
}

/// Exclusive hold on the remote log, shared across processes.
///
/// The lock file is removed on drop.
struct LogLock {
    path: PathBuf,
}

impl LogLock {
    async fn acquire(dir: &Path, wait: Duration) -> Result<Self, ProviderError> {
        let path = dir.join(LOCK_FILE);
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let created = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match created {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(ProviderError::Remote(format!(
                            "remote log is locked by another process (remove {} if none is running)",
                            path.display()
                        )));
                    }
                    tokio::time::sleep(LOCK_POLL).await;
                }
                Err(e) => return Err(ProviderError::ConnectionFailed(e.to_string())),
            }
        }
    }
}

impl Drop for LogLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// The entry as it is stored: synced, with a full value.
fn stored_form(log: &[SyncEntry], entry: &SyncEntry) -> SyncEntry {
    let mut stored = entry.clone();
    stored.synced = true;
    stored.attempts = 0;
    stored.last_attempt = None;
    stored.error = None;

    if stored.operation != Operation::Delete && stored.value.is_none() {
        if let Some(delta) = stored.delta.take() {
            let base = log
                .iter()
                .rev()
                .find(|e| e.key == stored.key)
                .and_then(|e| e.value.clone())
                .unwrap_or(Value::Null);
            stored.value = Some(apply_delta(&base, &delta));
        }
    }
    stored
}

#[async_trait]
impl SyncProvider for DirectoryProvider {
    async fn push(&self, entries: &[SyncEntry]) -> Result<PushResult, ProviderError> {
        let _guard = self.write_lock.lock().await;
        self.ensure_reachable().await?;
        let _lock = LogLock::acquire(&self.dir, self.lock_wait).await?;
        let mut log = self.read_log().await?;

        for entry in entries {
            let stored = stored_form(&log, entry);
            // A retried push replaces the earlier copy of the same entry.
            match log.iter_mut().find(|e| e.id == stored.id) {
                Some(existing) => *existing = stored,
                None => log.push(stored),
            }
        }
        self.write_log(&log).await?;
        debug!("remote log now holds {} entries", log.len());
        Ok(PushResult::accepted())
    }

    async fn pull(
        &self,
        since: Option<Timestamp>,
        _device_id: &DeviceId,
    ) -> Result<Vec<SyncEntry>, ProviderError> {
        let log = self.read_log().await?;
        Ok(log
            .into_iter()
            .filter(|e| since.map_or(true, |since| e.timestamp > since))
            .collect())
    }

    async fn get_remote(&self, key: &str) -> Result<Option<SyncEntry>, ProviderError> {
        let log = self.read_log().await?;
        Ok(log.into_iter().rev().find(|e| e.key == key))
    }

    async fn check_connection(&self) -> bool {
        tokio::fs::metadata(&self.dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}
