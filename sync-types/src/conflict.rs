//! Conflict records and resolution strategies.

use crate::entry::SyncEntry;
use crate::error::SyncError;
use crate::ids::{ConflictId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Policy applied when a local and a remote entry collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    /// Keep the local value.
    LocalWins,
    /// Keep the remote value.
    RemoteWins,
    /// Keep the value with the larger timestamp.
    LatestWins,
    /// Structurally merge both values.
    Merge,
    /// Park the conflict until it is resolved out of band.
    Manual,
    /// Delegate to an injected resolver.
    Custom,
}

impl ResolutionStrategy {
    /// Kebab-case name used in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalWins => "local-wins",
            Self::RemoteWins => "remote-wins",
            Self::LatestWins => "latest-wins",
            Self::Merge => "merge",
            Self::Manual => "manual",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local-wins" => Ok(Self::LocalWins),
            "remote-wins" => Ok(Self::RemoteWins),
            "latest-wins" => Ok(Self::LatestWins),
            "merge" => Ok(Self::Merge),
            "manual" => Ok(Self::Manual),
            "custom" => Ok(Self::Custom),
            other => Err(SyncError::UnknownVariant {
                kind: "resolution strategy",
                value: other.to_string(),
            }),
        }
    }
}

/// A detected collision between an unsynced local entry and a remote entry
/// for the same key.
///
/// Both entries are snapshots taken at detection time. Once `resolved` is
/// set the record is immutable; it only disappears through a cleanup pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Unique conflict identifier.
    pub id: ConflictId,
    /// The contested key.
    pub key: String,
    /// Local entry at detection time.
    pub local: SyncEntry,
    /// Remote entry at detection time.
    pub remote: SyncEntry,
    /// When the conflict was detected.
    pub detected_at: Timestamp,
    /// Whether a value has been chosen.
    #[serde(default)]
    pub resolved: bool,
    /// Strategy that produced the resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ResolutionStrategy>,
    /// Chosen value; `None` on a resolved conflict means the key is deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_value: Option<Value>,
    /// When the resolution happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<Timestamp>,
}

impl SyncConflict {
    /// Create an unresolved conflict between two entries.
    pub fn new(local: SyncEntry, remote: SyncEntry, detected_at: Timestamp) -> Self {
        Self {
            id: ConflictId::new(),
            key: local.key.clone(),
            local,
            remote,
            detected_at,
            resolved: false,
            strategy: None,
            resolved_value: None,
            resolved_at: None,
        }
    }
}
