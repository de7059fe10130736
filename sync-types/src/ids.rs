//! Identity and ordering types for driftsync.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Identifier of a device taking part in sync.
///
/// Any non-empty string is accepted so hosts can inject stable identifiers.
/// [`DeviceId::random`] produces 16 random bytes as URL-safe base64.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a DeviceId from a caller-provided string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a new random DeviceId.
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Create a new random identifier (UUID v4).
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Parse an identifier from its hyphenated string form.
            pub fn parse(s: &str) -> Option<Self> {
                uuid::Uuid::parse_str(s).ok().map(Self)
            }

            /// Get the inner UUID.
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier of a queued sync entry. Never changes after creation.
    EntryId
);

uuid_id!(
    /// Unique identifier of a detected conflict.
    ConflictId
);

/// Wall-clock instant in milliseconds since the Unix epoch.
///
/// Timestamps come from device clocks, so they order mutations on one
/// device but are only a heuristic across devices.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch; used as "never synced".
    pub const ZERO: Timestamp = Timestamp(0);

    /// Create a Timestamp from milliseconds since the epoch.
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Current system time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Milliseconds since the epoch.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn since(&self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    /// This timestamp shifted forward by `delta`.
    pub fn saturating_add(&self, delta: Duration) -> Self {
        Self(self.0.saturating_add(delta.as_millis() as u64))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_random_is_base64() {
        let id = DeviceId::random();
        assert_eq!(id.as_str().len(), 22); // 16 bytes = 22 base64 chars (no padding)
    }

    #[test]
    fn device_id_random_differs() {
        assert_ne!(DeviceId::random(), DeviceId::random());
    }

    #[test]
    fn device_id_injected_value_is_kept() {
        let id = DeviceId::new("device-a");
        assert_eq!(id.to_string(), "device-a");
        assert_eq!(DeviceId::from("device-a"), id);
    }

    #[test]
    fn device_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&DeviceId::new("phone")).unwrap();
        assert_eq!(json, "\"phone\"");
    }

    #[test]
    fn entry_id_is_uuid_v4() {
        let id = EntryId::new();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn entry_id_parse_roundtrip() {
        let id = EntryId::new();
        assert_eq!(EntryId::parse(&id.to_string()), Some(id));
        assert!(EntryId::parse("not-a-uuid").is_none());
    }

    #[test]
    fn conflict_ids_are_unique() {
        assert_ne!(ConflictId::new(), ConflictId::new());
    }

    #[test]
    fn timestamp_ordering() {
        let t1 = Timestamp::from_millis(100);
        let t2 = Timestamp::from_millis(200);
        assert!(t1 < t2);
        assert_eq!(t2.since(t1), Duration::from_millis(100));
    }

    #[test]
    fn timestamp_since_saturates() {
        let t1 = Timestamp::from_millis(100);
        let t2 = Timestamp::from_millis(200);
        assert_eq!(t1.since(t2), Duration::ZERO);
    }

    #[test]
    fn timestamp_add_saturates() {
        let t = Timestamp::from_millis(u64::MAX);
        assert_eq!(t.saturating_add(Duration::from_secs(1)).as_millis(), u64::MAX);
    }
}
