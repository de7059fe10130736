//! # sync-client
//!
//! Offline-first sync engine for driftsync.
//!
//! This is the main library that applications use to sync data.
//!
//! ## Features
//!
//! - **Durable Queue**: Local mutations are persisted before they are sent
//! - **Bounded Retry**: Exponential backoff with a ceiling and a retry limit
//! - **Conflict Resolution**: Local-wins, remote-wins, latest-wins, merge,
//!   manual and custom strategies
//! - **Delta Sync**: Field-level deltas with checksum verification
//! - **Provider Abstraction**: Pluggable remote store (mock included)
//! - **Pure State Machine**: Uses sync-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use driftsync_client::{MemoryStorage, MockProvider, SyncConfig, SyncEngine};
//!
//! let config = SyncConfig::default().with_device_id("laptop");
//! let engine = SyncEngine::new(config, MemoryStorage::new(), MockProvider::new()).await?;
//!
//! // Record a change
//! engine.put("notes/1", json!({"title": "groceries"})).await?;
//!
//! // Reconcile with the remote store
//! let report = engine.sync().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod events;
pub mod provider;
pub mod queue;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, SyncConfig};
pub use conflict::{ConflictError, ConflictManager, ConflictResolver, Resolved};
pub use engine::{CleanupReport, EngineBuilder, EngineError, SyncEngine, SyncReport};
pub use events::EventBus;
pub use provider::{MockProvider, ProviderError, PushResult, SyncProvider};
pub use queue::{SyncQueue, SyncQueueError};
pub use storage::{MemoryStorage, Storage, StorageError};

pub use driftsync_core::{KeyFilter, SyncEvent, SyncPhase};
pub use driftsync_types::{
    ConflictId, DeviceId, EntryId, Operation, ResolutionStrategy, SyncConflict, SyncDirection,
    SyncEntry, SyncState, SyncStatus, Timestamp,
};
