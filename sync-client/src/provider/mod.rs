//! Remote store abstraction for driftsync.
//!
//! This module provides a pluggable provider layer that abstracts the
//! remote side of sync (an HTTP API, a shared directory, a mock for
//! testing). The engine never speaks a wire protocol itself.
//!
//! # Design
//!
//! The provider trait is async and request-oriented:
//! - `check_connection()` probes reachability
//! - `push()` sends a batch of entries and reports per-entry rejections
//! - `pull()` fetches entries changed since a point in time
//! - `get_remote()` fetches the authoritative entry for one key
//! - `subscribe()` optionally streams entries as they arrive
//!
//! # Example
//!
//! ```ignore
//! let provider = MockProvider::new();
//! if provider.check_connection().await {
//!     let result = provider.push(&entries).await?;
//!     let incoming = provider.pull(last_sync, &device_id).await?;
//! }
//! ```

mod mock;

pub use mock::MockProvider;

use async_trait::async_trait;
use driftsync_types::{DeviceId, EntryId, SyncEntry, Timestamp};
use thiserror::Error;
use tokio::sync::mpsc;

/// Provider errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The remote store could not be reached.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The remote store refused the request as a whole.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The request did not finish within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Any other remote-side failure.
    #[error("remote error: {0}")]
    Remote(String),
}

/// Outcome of a push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushResult {
    /// True when every entry was accepted.
    pub success: bool,
    /// Entries the remote store refused.
    pub failed_ids: Vec<EntryId>,
}

impl PushResult {
    /// Every entry was accepted.
    pub fn accepted() -> Self {
        Self {
            success: true,
            failed_ids: Vec::new(),
        }
    }

    /// Some entries were refused.
    pub fn partial(failed_ids: Vec<EntryId>) -> Self {
        Self {
            success: failed_ids.is_empty(),
            failed_ids,
        }
    }
}

/// Provider trait for exchanging entries with the remote store.
///
/// Implementations handle the underlying mechanism (HTTP, files, mock).
#[async_trait]
pub trait SyncProvider: Send + Sync {
    /// Send a batch of entries.
    async fn push(&self, entries: &[SyncEntry]) -> Result<PushResult, ProviderError>;

    /// Fetch entries changed after `since` (everything when `None`).
    ///
    /// `device_id` identifies the caller; providers may use it to skip the
    /// caller's own entries, but are not required to.
    async fn pull(
        &self,
        since: Option<Timestamp>,
        device_id: &DeviceId,
    ) -> Result<Vec<SyncEntry>, ProviderError>;

    /// Fetch the latest full entry for a key.
    async fn get_remote(&self, key: &str) -> Result<Option<SyncEntry>, ProviderError>;

    /// Check whether the remote store is reachable.
    async fn check_connection(&self) -> bool;

    /// Stream entries pushed by any device as they arrive.
    ///
    /// Returns `None` when the provider has no real-time channel. Dropping
    /// the receiver unsubscribes.
    fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<SyncEntry>> {
        None
    }
}
