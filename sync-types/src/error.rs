//! Error types for driftsync data model.

use thiserror::Error;

/// Errors raised while decoding or validating data model values.
#[derive(Debug, Error)]
pub enum SyncError {
    /// JSON serialization or deserialization failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A string did not name a known variant
    #[error("unknown {kind}: {value}")]
    UnknownVariant {
        /// Which enum was being parsed.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),
}
