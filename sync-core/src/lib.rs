//! # sync-core
//!
//! Pure logic for driftsync (no I/O, instant tests).
//!
//! This crate implements the state machine and algorithms for sync
//! without any storage or network I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (storage, remote provider, timers) is performed by
//! `sync-client`, which interprets the actions produced by [`StatusMachine`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conflict;
pub mod delta;
pub mod filter;
pub mod queue;
pub mod retry;
pub mod state;

pub use conflict::{detect_conflict, merge_values, resolve_with, Resolution};
pub use delta::{apply_delta, calculate_checksum, calculate_delta, verify_checksum};
pub use filter::{FilterError, FilterPatterns, KeyFilter};
pub use queue::{EntryQueue, QueueError};
pub use retry::{backoff_delay, RetryPolicy};
pub use state::{Action, Event, StatusMachine, SyncEvent, SyncPhase};
