//! Sync entries: one recorded local mutation of one key.

use crate::delta::Delta;
use crate::error::SyncError;
use crate::ids::{DeviceId, EntryId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Kind of mutation recorded by an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Key did not exist before.
    Create,
    /// Key existed and now holds a new value.
    Update,
    /// Key was removed.
    Delete,
}

impl Operation {
    /// Lowercase name used on the wire and in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(SyncError::UnknownVariant {
                kind: "operation",
                value: other.to_string(),
            }),
        }
    }
}

/// A recorded mutation awaiting transmission to the remote store.
///
/// `id`, `key`, `operation` and the provenance fields are fixed at creation.
/// Only the bookkeeping fields (`synced`, `attempts`, `last_attempt`,
/// `error`) change while the entry sits in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEntry {
    /// Unique entry identifier.
    pub id: EntryId,
    /// The mutated resource.
    pub key: String,
    /// Kind of mutation.
    pub operation: Operation,
    /// New value; absent for deletes and for delta-only transfers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Value before the mutation, used for diffing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<Value>,
    /// Field-level difference against `previous_value` when delta sync is on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<Delta>,
    /// Mutation time on the originating device.
    pub timestamp: Timestamp,
    /// Per-device, strictly increasing version counter.
    pub version: u64,
    /// Originating device.
    pub device_id: DeviceId,
    /// Originating user, if the host tracks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Content checksum of `value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Whether the remote store has accepted this entry.
    #[serde(default)]
    pub synced: bool,
    /// Number of failed push attempts.
    #[serde(default)]
    pub attempts: u32,
    /// Time of the last failed push attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<Timestamp>,
    /// Error message from the last failed push attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncEntry {
    /// Create a new, unsynced entry.
    pub fn new(
        key: impl Into<String>,
        operation: Operation,
        value: Option<Value>,
        device_id: DeviceId,
        version: u64,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: EntryId::new(),
            key: key.into(),
            operation,
            value,
            previous_value: None,
            delta: None,
            timestamp,
            version,
            device_id,
            user_id: None,
            checksum: None,
            synced: false,
            attempts: 0,
            last_attempt: None,
            error: None,
        }
    }

    /// Set the value before the mutation.
    pub fn with_previous(mut self, previous: Option<Value>) -> Self {
        self.previous_value = previous;
        self
    }

    /// Set the originating user.
    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Set the content checksum.
    pub fn with_checksum(mut self, checksum: Option<String>) -> Self {
        self.checksum = checksum;
        self
    }

    /// True when this entry still has to reach the remote store.
    pub fn is_pending(&self) -> bool {
        !self.synced
    }

    /// Record a failed push attempt.
    pub fn record_failure(&mut self, error: impl Into<String>, at: Timestamp) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt = Some(at);
        self.error = Some(error.into());
    }

    /// Record acceptance by the remote store.
    pub fn mark_synced(&mut self) {
        self.synced = true;
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry() -> SyncEntry {
        SyncEntry::new(
            "doc",
            Operation::Create,
            Some(json!({"title": "A"})),
            DeviceId::new("device-a"),
            1,
            Timestamp::from_millis(1_000),
        )
    }

    #[test]
    fn new_entry_is_pending() {
        let e = entry();
        assert!(e.is_pending());
        assert_eq!(e.attempts, 0);
        assert!(e.last_attempt.is_none());
    }

    #[test]
    fn record_failure_increments_attempts() {
        let mut e = entry();
        e.record_failure("timeout", Timestamp::from_millis(2_000));
        e.record_failure("timeout again", Timestamp::from_millis(3_000));

        assert_eq!(e.attempts, 2);
        assert_eq!(e.last_attempt, Some(Timestamp::from_millis(3_000)));
        assert_eq!(e.error.as_deref(), Some("timeout again"));
        assert!(e.is_pending());
    }

    #[test]
    fn mark_synced_clears_error() {
        let mut e = entry();
        e.record_failure("503", Timestamp::from_millis(2_000));
        e.mark_synced();

        assert!(e.synced);
        assert!(e.error.is_none());
        assert_eq!(e.attempts, 1);
    }

    #[test]
    fn operation_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Operation::Delete).unwrap(),
            "\"delete\""
        );
        assert_eq!("update".parse::<Operation>().unwrap(), Operation::Update);
        assert!("upsert".parse::<Operation>().is_err());
    }

    #[test]
    fn delete_entry_omits_value_field() {
        let e = SyncEntry::new(
            "doc",
            Operation::Delete,
            None,
            DeviceId::new("device-a"),
            2,
            Timestamp::from_millis(1_000),
        );
        let json = serde_json::to_value(&e).unwrap();
        assert!(json.get("value").is_none());
        assert_eq!(json["operation"], "delete");
    }

    #[test]
    fn snapshot_without_bookkeeping_fields_loads() {
        let raw = json!({
            "id": EntryId::new(),
            "key": "doc",
            "operation": "update",
            "value": {"n": 1},
            "timestamp": 5,
            "version": 3,
            "device_id": "device-b"
        });
        let e: SyncEntry = serde_json::from_value(raw).unwrap();
        assert!(!e.synced);
        assert_eq!(e.attempts, 0);
        assert_eq!(e.device_id, DeviceId::new("device-b"));
    }
}
