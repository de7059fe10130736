//! Field-level delta representation.
//!
//! The computation lives in `driftsync-core`; this module only defines the
//! shape that travels inside a [`SyncEntry`](crate::SyncEntry).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Change of a single top-level field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum FieldDelta {
    /// Field is new.
    Add {
        /// Value of the new field.
        value: Value,
    },
    /// Field exists on both sides with different values.
    Change {
        /// Previous value.
        old: Value,
        /// New value.
        new: Value,
    },
    /// Field no longer present.
    Remove {
        /// Value that was removed.
        old: Value,
    },
}

/// Difference between two versions of a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Delta {
    /// Per-field operations; used when both versions are JSON objects.
    Fields(BTreeMap<String, FieldDelta>),
    /// Whole-value replacement; used when either version is not an object.
    Replace(Value),
}

impl Delta {
    /// True when applying the delta changes nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Fields(fields) => fields.is_empty(),
            Self::Replace(_) => false,
        }
    }

    /// Number of field operations (a replacement counts as one).
    pub fn len(&self) -> usize {
        match self {
            Self::Fields(fields) => fields.len(),
            Self::Replace(_) => 1,
        }
    }
}
