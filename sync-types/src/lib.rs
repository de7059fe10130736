//! # sync-types
//!
//! Data model types for the driftsync offline-first sync engine.
//!
//! This crate provides the foundational types used across all driftsync crates:
//! - [`DeviceId`], [`EntryId`], [`ConflictId`], [`Timestamp`] - Identity and ordering types
//! - [`SyncEntry`] - A queued local mutation
//! - [`SyncConflict`] - A detected collision between local and remote entries
//! - [`Delta`] - Field-level difference between two values
//! - [`SyncState`] - Runtime status reported to hosts
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod conflict;
mod delta;
mod entry;
mod error;
mod ids;
mod state;

pub use conflict::{ResolutionStrategy, SyncConflict};
pub use delta::{Delta, FieldDelta};
pub use entry::{Operation, SyncEntry};
pub use error::SyncError;
pub use ids::{ConflictId, DeviceId, EntryId, Timestamp};
pub use state::{SyncDirection, SyncProgress, SyncState, SyncStatus};
