//! Conflict detection and built-in resolution policies.
//!
//! Detection is a heuristic, not a logical-clock comparison: two entries
//! for the same key conflict when they come from different devices with
//! different versions and different timestamps. Devices are assumed to
//! rarely produce identical millisecond timestamps by coincidence; when they
//! do, no conflict is raised and whichever write is applied last wins.

use driftsync_types::{ResolutionStrategy, SyncEntry};
use serde_json::Value;

/// Outcome of applying a strategy without I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The chosen value; `None` means the key ends up deleted.
    Value(Option<Value>),
    /// The conflict must be parked for manual resolution.
    Manual,
    /// The strategy needs the injected custom resolver.
    Delegate,
}

/// Decide whether a local unsynced entry and a remote entry collide.
///
/// Returns `false` when the keys differ, the local entry is already synced,
/// the versions are equal, the timestamps are equal, or both entries come
/// from the same device (a device never conflicts with its own writes).
pub fn detect_conflict(local: &SyncEntry, remote: &SyncEntry) -> bool {
    if local.key != remote.key || local.synced {
        return false;
    }
    if local.version == remote.version {
        return false;
    }
    if local.timestamp == remote.timestamp {
        return false;
    }
    local.device_id != remote.device_id
}

/// Apply a built-in strategy to a pair of colliding entries.
pub fn resolve_with(
    strategy: ResolutionStrategy,
    local: &SyncEntry,
    remote: &SyncEntry,
) -> Resolution {
    match strategy {
        ResolutionStrategy::LocalWins => Resolution::Value(local.value.clone()),
        ResolutionStrategy::RemoteWins => Resolution::Value(remote.value.clone()),
        ResolutionStrategy::LatestWins => {
            let winner = if local.timestamp > remote.timestamp {
                local
            } else {
                remote
            };
            Resolution::Value(winner.value.clone())
        }
        ResolutionStrategy::Merge => {
            let merged = match (&local.value, &remote.value) {
                (Some(l), Some(r)) => Some(merge_values(l, r)),
                _ => remote.value.clone(),
            };
            Resolution::Value(merged)
        }
        ResolutionStrategy::Manual => Resolution::Manual,
        ResolutionStrategy::Custom => Resolution::Delegate,
    }
}

/// Structurally merge two values.
///
/// - Two objects merge key by key, recursing into shared keys; the remote
///   side wins on leaf collisions.
/// - Two arrays concatenate and drop structural duplicates, keeping the
///   order of first occurrence.
/// - Anything else resolves to the remote value.
pub fn merge_values(local: &Value, remote: &Value) -> Value {
    match (local, remote) {
        (Value::Object(l), Value::Object(r)) => {
            let mut merged = l.clone();
            for (key, remote_value) in r {
                let value = match merged.get(key) {
                    Some(local_value) => merge_values(local_value, remote_value),
                    None => remote_value.clone(),
                };
                merged.insert(key.clone(), value);
            }
            Value::Object(merged)
        }
        (Value::Array(l), Value::Array(r)) => {
            let mut merged: Vec<Value> = Vec::with_capacity(l.len() + r.len());
            for item in l.iter().chain(r.iter()) {
                if !merged.contains(item) {
                    merged.push(item.clone());
                }
            }
            Value::Array(merged)
        }
        _ => remote.clone(),
    }
}
