//! Runtime sync status reported to hosts.

use crate::error::SyncError;
use crate::ids::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which way entries flow during a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Only send local entries.
    Push,
    /// Only receive remote entries.
    Pull,
    /// Send, then receive.
    #[default]
    Bidirectional,
}

impl SyncDirection {
    /// Whether local entries are sent.
    pub fn pushes(&self) -> bool {
        matches!(self, Self::Push | Self::Bidirectional)
    }

    /// Whether remote entries are fetched.
    pub fn pulls(&self) -> bool {
        matches!(self, Self::Pull | Self::Bidirectional)
    }
}

impl FromStr for SyncDirection {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(Self::Push),
            "pull" => Ok(Self::Pull),
            "bidirectional" => Ok(Self::Bidirectional),
            other => Err(SyncError::UnknownVariant {
                kind: "sync direction",
                value: other.to_string(),
            }),
        }
    }
}

/// Status of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Waiting for the next cycle.
    #[default]
    Idle,
    /// A cycle is running.
    Syncing,
    /// Auto-sync is suspended.
    Paused,
    /// The last cycle finished with errors.
    Error,
    /// The remote store is unreachable.
    Offline,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Paused => "paused",
            Self::Error => "error",
            Self::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// Progress of the running phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Items processed so far.
    pub current: usize,
    /// Items in this phase.
    pub total: usize,
}

/// Snapshot of the engine's runtime state.
///
/// Only `last_sync` survives a restart; everything else is rebuilt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Current status.
    pub status: SyncStatus,
    /// Start time of the last completed cycle.
    pub last_sync: Option<Timestamp>,
    /// Entries waiting to be pushed.
    pub pending_count: usize,
    /// Conflicts waiting for manual resolution.
    pub conflict_count: usize,
    /// Result of the last connectivity check.
    pub online: bool,
    /// Progress of the running phase, if any.
    pub progress: Option<SyncProgress>,
    /// Aggregate error of the last failed cycle.
    pub last_error: Option<String>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            last_sync: None,
            pending_count: 0,
            conflict_count: 0,
            online: true,
            progress: None,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_flags() {
        assert!(SyncDirection::Push.pushes());
        assert!(!SyncDirection::Push.pulls());
        assert!(!SyncDirection::Pull.pushes());
        assert!(SyncDirection::Pull.pulls());
        assert!(SyncDirection::Bidirectional.pushes());
        assert!(SyncDirection::Bidirectional.pulls());
    }

    #[test]
    fn direction_parses() {
        assert_eq!(
            "pull".parse::<SyncDirection>().unwrap(),
            SyncDirection::Pull
        );
        assert!("sideways".parse::<SyncDirection>().is_err());
    }

    #[test]
    fn default_state_is_idle_and_online() {
        let state = SyncState::default();
        assert_eq!(state.status, SyncStatus::Idle);
        assert!(state.online);
        assert!(state.last_sync.is_none());
    }

    #[test]
    fn status_display() {
        assert_eq!(SyncStatus::Offline.to_string(), "offline");
    }
}
