//! SyncEngine - the Sync Orchestrator.
//!
//! This module provides [`SyncEngine`], the primary API for applications
//! to record local changes and reconcile them with a remote store.
//!
//! # Architecture
//!
//! SyncEngine uses a pure state machine (from sync-core) for lifecycle
//! logic and interprets its actions to perform the actual I/O via the
//! [`Storage`] and [`SyncProvider`] traits.
//!
//! ```text
//! Application → SyncEngine → SyncProvider → Remote store
//!                   ↓    ↘
//!                   ↓     Storage (values, queue, conflicts)
//!              sync-core (pure state machine, conflict rules, deltas)
//! ```
//!
//! A cycle pushes retry-eligible queued entries in batches, then pulls
//! remote entries changed since the last cycle, checking each against the
//! local queue for conflicts before applying it.
//!
//! # Example
//!
//! ```ignore
//! use driftsync_client::{MemoryStorage, MockProvider, SyncConfig, SyncEngine};
//!
//! let engine = SyncEngine::new(SyncConfig::default(), MemoryStorage::new(), MockProvider::new()).await?;
//! engine.start();
//!
//! engine.put("notes/1", json!({"title": "groceries"})).await?;
//! let report = engine.sync().await?;
//! ```

mod cycle;
mod tasks;

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, SyncConfig};
use crate::conflict::{ConflictError, ConflictManager, ConflictResolver};
use crate::events::EventBus;
use crate::provider::{ProviderError, SyncProvider};
use crate::queue::{SyncQueue, SyncQueueError};
use crate::storage::{
    is_reserved, load_json, save_json, Storage, StorageError, LAST_SYNC_KEY, VERSION_KEY,
};
use driftsync_core::{calculate_checksum, Action, Event, StatusMachine, SyncEvent};
use driftsync_types::{
    ConflictId, DeviceId, Operation, ResolutionStrategy, SyncConflict, SyncEntry, SyncProgress,
    SyncState, SyncStatus, Timestamp,
};
use serde_json::Value;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use tasks::Tasks;

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Local storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Queue bookkeeping failed.
    #[error("queue error: {0}")]
    Queue(#[from] SyncQueueError),

    /// Conflict bookkeeping failed.
    #[error("conflict error: {0}")]
    Conflict(#[from] ConflictError),

    /// The remote store failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The configuration could not be loaded or validated.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The engine is set up in a way it cannot run with.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The key belongs to the engine's own bookkeeping.
    #[error("key is reserved: {0}")]
    ReservedKey(String),
}

impl EngineError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider(e) => !matches!(e, ProviderError::Rejected(_)),
            Self::Storage(e) => storage_is_transient(e),
            Self::Queue(SyncQueueError::Storage(e)) => storage_is_transient(e),
            Self::Conflict(ConflictError::Storage(e)) => storage_is_transient(e),
            _ => false,
        }
    }
}

fn storage_is_transient(error: &StorageError) -> bool {
    matches!(
        error,
        StorageError::ReadFailed(_) | StorageError::WriteFailed(_)
    )
}

/// Result of one [`SyncEngine::sync`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// True when the cycle ran to completion without errors.
    pub success: bool,
    /// Entries the remote store accepted.
    pub pushed: usize,
    /// Entries the remote store refused (or that failed with the transport).
    pub failed: usize,
    /// Remote entries applied locally without a conflict.
    pub pulled: usize,
    /// Conflicts detected.
    pub conflicts: usize,
    /// Conflicts resolved automatically.
    pub resolved: usize,
    /// Every error recorded during the cycle.
    pub errors: Vec<String>,
    /// Wall-clock time the cycle took.
    pub duration: Duration,
}

impl SyncReport {
    fn rejected(reason: &str) -> Self {
        Self {
            errors: vec![reason.to_string()],
            ..Self::default()
        }
    }
}

/// Result of [`SyncEngine::cleanup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Synced entries removed from the queue.
    pub entries: usize,
    /// Resolved conflicts removed from the store.
    pub conflicts: usize,
}

/// Runtime status behind the engine's state lock.
#[derive(Debug)]
struct EngineState {
    machine: StatusMachine,
    last_sync: Option<Timestamp>,
    online: bool,
    progress: Option<SyncProgress>,
    last_error: Option<String>,
}

struct EngineInner<S: Storage, P: SyncProvider> {
    config: SyncConfig,
    device_id: DeviceId,
    storage: Arc<S>,
    provider: Arc<P>,
    clock: Arc<dyn Clock>,
    queue: Mutex<SyncQueue<S>>,
    conflicts: Mutex<ConflictManager<S>>,
    version: Mutex<u64>,
    state: Mutex<EngineState>,
    events: EventBus,
    tasks: StdMutex<Tasks>,
}

impl<S: Storage, P: SyncProvider> Drop for EngineInner<S, P> {
    fn drop(&mut self) {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .abort_all();
    }
}

/// Builder for [`SyncEngine`] with optional clock and custom resolver.
pub struct EngineBuilder<S, P> {
    config: SyncConfig,
    storage: S,
    provider: P,
    clock: Arc<dyn Clock>,
    resolver: Option<Arc<dyn ConflictResolver>>,
}

impl<S, P> EngineBuilder<S, P>
where
    S: Storage + 'static,
    P: SyncProvider + 'static,
{
    /// Use a custom time source.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Supply the resolver used by the `Custom` strategy.
    pub fn resolver(mut self, resolver: impl ConflictResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Restore persisted state and create the engine.
    pub async fn build(self) -> Result<SyncEngine<S, P>, EngineError> {
        self.config.validate()?;

        let device_id = self
            .config
            .device_id
            .clone()
            .unwrap_or_else(DeviceId::random);
        let storage = Arc::new(self.storage);

        let queue = SyncQueue::load(Arc::clone(&storage)).await?;
        let conflicts = ConflictManager::load(
            Arc::clone(&storage),
            self.config.conflict_strategy,
            self.resolver,
        )
        .await?;
        if conflicts.is_misconfigured() {
            warn!("custom conflict strategy configured without a resolver");
        }
        let version: u64 = load_json(storage.as_ref(), VERSION_KEY)
            .await?
            .unwrap_or(0);
        let last_sync: Option<Timestamp> = load_json(storage.as_ref(), LAST_SYNC_KEY).await?;

        info!(
            "sync engine ready for device {} ({} queued, {} open conflicts)",
            device_id,
            queue.pending_count(),
            conflicts.unresolved_count()
        );

        Ok(SyncEngine {
            inner: Arc::new(EngineInner {
                config: self.config,
                device_id,
                storage,
                provider: Arc::new(self.provider),
                clock: self.clock,
                queue: Mutex::new(queue),
                conflicts: Mutex::new(conflicts),
                version: Mutex::new(version),
                state: Mutex::new(EngineState {
                    machine: StatusMachine::new(),
                    last_sync,
                    online: true,
                    progress: None,
                    last_error: None,
                }),
                events: EventBus::new(),
                tasks: StdMutex::new(Tasks::default()),
            }),
        })
    }
}

/// The offline-first sync engine.
///
/// A cheap handle: clones share the same queue, conflict store and state.
pub struct SyncEngine<S: Storage, P: SyncProvider> {
    inner: Arc<EngineInner<S, P>>,
}

impl<S: Storage, P: SyncProvider> Clone for SyncEngine<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, P> SyncEngine<S, P>
where
    S: Storage + 'static,
    P: SyncProvider + 'static,
{
    /// Start building an engine.
    pub fn builder(config: SyncConfig, storage: S, provider: P) -> EngineBuilder<S, P> {
        EngineBuilder {
            config,
            storage,
            provider,
            clock: Arc::new(SystemClock),
            resolver: None,
        }
    }

    /// Create an engine with the system clock and no custom resolver.
    pub async fn new(config: SyncConfig, storage: S, provider: P) -> Result<Self, EngineError> {
        Self::builder(config, storage, provider).build().await
    }

    /// This device's identity.
    pub fn device_id(&self) -> &DeviceId {
        &self.inner.device_id
    }

    /// The configuration the engine runs with.
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Subscribe to engine events. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    // ===========================================
    // Local changes
    // ===========================================

    /// Read an application value from local storage.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, EngineError> {
        ensure_not_reserved(key)?;
        Ok(self.inner.storage.get(key).await?)
    }

    /// Write a value locally and track the change.
    ///
    /// Returns the queued entry, or `None` when the key is filtered out.
    pub async fn put(&self, key: &str, value: Value) -> Result<Option<SyncEntry>, EngineError> {
        ensure_not_reserved(key)?;
        let previous = self.inner.storage.get(key).await?;
        self.inner.storage.set(key, value.clone()).await?;

        let operation = if previous.is_some() {
            Operation::Update
        } else {
            Operation::Create
        };
        self.track_change(key, Some(value), operation, previous)
            .await
    }

    /// Delete a value locally and track the change.
    ///
    /// Returns `None` when the key did not exist or is filtered out.
    pub async fn remove(&self, key: &str) -> Result<Option<SyncEntry>, EngineError> {
        ensure_not_reserved(key)?;
        let Some(previous) = self.inner.storage.get(key).await? else {
            return Ok(None);
        };
        self.inner.storage.delete(key).await?;
        self.track_change(key, None, Operation::Delete, Some(previous))
            .await
    }

    /// Record a local mutation the host already applied to storage.
    ///
    /// Returns the queued entry, or `None` when the key is filtered out.
    /// When sync-on-change is enabled and the engine is online, a cycle is
    /// started in the background.
    pub async fn track_change(
        &self,
        key: &str,
        value: Option<Value>,
        operation: Operation,
        previous_value: Option<Value>,
    ) -> Result<Option<SyncEntry>, EngineError> {
        ensure_not_reserved(key)?;
        if !self.inner.config.filter.allows(key) {
            debug!("key {} is filtered out, not tracking", key);
            return Ok(None);
        }

        let entry = self
            .queue_entry(key, value, operation, previous_value)
            .await?;
        debug!("tracked {} {} (version {})", operation, key, entry.version);

        if self.should_sync_on_change().await {
            self.spawn_sync();
        }
        Ok(Some(entry))
    }

    // ===========================================
    // Inspection
    // ===========================================

    /// Current status.
    pub async fn status(&self) -> SyncStatus {
        self.inner.state.lock().await.machine.status()
    }

    /// Snapshot of the runtime state.
    pub async fn state(&self) -> SyncState {
        let (status, last_sync, online, progress, last_error) = {
            let state = self.inner.state.lock().await;
            (
                state.machine.status(),
                state.last_sync,
                state.online,
                state.progress,
                state.last_error.clone(),
            )
        };
        let pending_count = self.inner.queue.lock().await.pending_count();
        let conflict_count = self.inner.conflicts.lock().await.unresolved_count();

        SyncState {
            status,
            last_sync,
            pending_count,
            conflict_count,
            online,
            progress,
            last_error,
        }
    }

    /// Entries still waiting for the remote store.
    pub async fn pending(&self) -> Vec<SyncEntry> {
        self.inner.queue.lock().await.pending()
    }

    /// Conflicts still waiting for a value.
    pub async fn conflicts(&self) -> Vec<SyncConflict> {
        self.inner.conflicts.lock().await.unresolved()
    }

    // ===========================================
    // Maintenance
    // ===========================================

    /// Settle a parked conflict with a value chosen by the host.
    ///
    /// The value is written to local storage and queued so it reaches the
    /// remote store on the next cycle (unless it equals the remote value).
    pub async fn manual_resolve(
        &self,
        id: &ConflictId,
        value: Option<Value>,
    ) -> Result<SyncConflict, EngineError> {
        let conflict = self
            .inner
            .conflicts
            .lock()
            .await
            .manual_resolve(id, value.clone(), self.now())
            .await?;

        self.write_local(&conflict.key, value.clone()).await?;
        let queued = self
            .reconcile_queue(&conflict.key, &value, &conflict.remote.value)
            .await?;
        if queued.is_some() && self.should_sync_on_change().await {
            self.spawn_sync();
        }

        self.inner.events.emit(SyncEvent::ConflictResolved {
            conflict_id: conflict.id,
            key: conflict.key.clone(),
            strategy: ResolutionStrategy::Manual,
        });
        Ok(conflict)
    }

    /// Drop synced entries and resolved conflicts.
    pub async fn cleanup(&self) -> Result<CleanupReport, EngineError> {
        let entries = self.inner.queue.lock().await.clear_synced().await?;
        let conflicts = self.inner.conflicts.lock().await.clear_resolved().await?;
        info!(
            "cleanup removed {} entries and {} conflicts",
            entries, conflicts
        );
        Ok(CleanupReport { entries, conflicts })
    }

    /// Give entries that exhausted their retries a fresh set of attempts.
    pub async fn retry_failed(&self) -> Result<usize, EngineError> {
        let reset = self
            .inner
            .queue
            .lock()
            .await
            .reset_failed(self.inner.config.max_retries)
            .await?;
        if reset > 0 {
            info!("requeued {} failed entries", reset);
        }
        Ok(reset)
    }

    // ===========================================
    // Internals shared by the cycle and background tasks
    // ===========================================

    fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Feed an event to the state machine and run the side-effect actions.
    ///
    /// Returns the actions the caller has to act on itself.
    async fn transition(&self, event: Event) -> Vec<Action> {
        let mut state = self.inner.state.lock().await;
        let (machine, actions) = state.machine.on_event(event);
        state.machine = machine;

        let mut remaining = Vec::new();
        for action in actions {
            match action {
                Action::EmitEvent(event) => self.inner.events.emit(event),
                Action::StartTimer => self.start_timer(),
                Action::StopTimer => self.stop_timer(),
                other => remaining.push(other),
            }
        }
        remaining
    }

    async fn next_version(&self) -> Result<u64, EngineError> {
        let mut version = self.inner.version.lock().await;
        let next = *version + 1;
        save_json(self.inner.storage.as_ref(), VERSION_KEY, &next).await?;
        *version = next;
        Ok(next)
    }

    async fn should_sync_on_change(&self) -> bool {
        let config = &self.inner.config;
        if !config.sync_on_change || !config.direction.pushes() {
            return false;
        }
        let state = self.inner.state.lock().await;
        state.online && state.machine.status() != SyncStatus::Paused
    }

    async fn write_local(&self, key: &str, value: Option<Value>) -> Result<(), StorageError> {
        match value {
            Some(value) => self.inner.storage.set(key, value).await,
            None => self.inner.storage.delete(key).await,
        }
    }

    /// Stamp a new entry with the next version and the current time, then queue it.
    async fn queue_entry(
        &self,
        key: &str,
        value: Option<Value>,
        operation: Operation,
        previous_value: Option<Value>,
    ) -> Result<SyncEntry, EngineError> {
        let version = self.next_version().await?;
        let checksum = value.as_ref().map(calculate_checksum);
        let entry = SyncEntry::new(
            key,
            operation,
            value,
            self.inner.device_id.clone(),
            version,
            self.now(),
        )
        .with_previous(previous_value)
        .with_user(self.inner.config.user_id.clone())
        .with_checksum(checksum);

        self.inner.queue.lock().await.enqueue(entry.clone()).await?;
        Ok(entry)
    }

    /// Align the queue for `key` with a resolved value.
    ///
    /// Entries written before the conflict are superseded and marked synced.
    /// A resolution that differs from the remote value is queued as a fresh
    /// entry so devices that already synced past the old entries still pull it.
    async fn reconcile_queue(
        &self,
        key: &str,
        resolved: &Option<Value>,
        remote: &Option<Value>,
    ) -> Result<Option<SyncEntry>, EngineError> {
        self.inner.queue.lock().await.settle_key(key).await?;
        if resolved == remote {
            return Ok(None);
        }
        let operation = if resolved.is_some() {
            Operation::Update
        } else {
            Operation::Delete
        };
        let entry = self
            .queue_entry(key, resolved.clone(), operation, remote.clone())
            .await?;
        debug!("queued resolution for {} (version {})", key, entry.version);
        Ok(Some(entry))
    }
}

fn ensure_not_reserved(key: &str) -> Result<(), EngineError> {
    if is_reserved(key) {
        return Err(EngineError::ReservedKey(key.to_string()));
    }
    Ok(())
}
