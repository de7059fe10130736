//! Sync status state machine for driftsync.
//!
//! This module provides a pure, side-effect-free state machine for the
//! engine's lifecycle. The state machine takes events as input and produces
//! a new state plus a list of actions to execute.
//!
//! The actual I/O (running cycles, timers, event delivery) is performed by
//! sync-client, not by this module.
//!
//! ```text
//!            SyncRequested            CycleCompleted
//!   Idle ────────────────► Syncing ─────────────────► Idle
//!    ▲ │                     │  │      CycleFailed
//!    │ │ PauseRequested      │  └───────────────────► Error
//!    │ ▼                     │ ConnectivityLost
//!   Paused                   └───────────────────────► Offline ──► Idle
//!          ResumeRequested                      ConnectivityRestored
//! ```
//!
//! A pause requested while `Syncing` is held until the cycle ends; the
//! machine then lands in `Paused` instead of `Idle`, `Error` or `Offline`.

use driftsync_types::{ConflictId, EntryId, ResolutionStrategy, SyncStatus};

/// Status state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusMachine {
    status: SyncStatus,
    pause_pending: bool,
}

impl StatusMachine {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status.
    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: Event) -> (Self, Vec<Action>) {
        use SyncStatus::*;

        let mut pause_pending = match (self.status, &event) {
            (Syncing, Event::PauseRequested) => true,
            (_, Event::ResumeRequested) => false,
            _ => self.pause_pending,
        };

        let (status, actions) = match (self.status, event) {
            // Starting a cycle
            (Idle | Error | Offline, Event::SyncRequested) => (
                Syncing,
                vec![Action::StartCycle, Action::EmitEvent(SyncEvent::SyncStarted)],
            ),
            (Syncing, Event::SyncRequested) => (Syncing, vec![Action::RejectBusy]),
            (Paused, Event::SyncRequested) => (Paused, vec![Action::RejectPaused]),

            // Finishing a cycle
            (
                Syncing,
                Event::CycleCompleted {
                    pushed,
                    pulled,
                    conflicts,
                },
            ) => (
                Idle,
                vec![Action::EmitEvent(SyncEvent::SyncCompleted {
                    pushed,
                    pulled,
                    conflicts,
                })],
            ),
            (Syncing, Event::CycleFailed { error }) => (
                Error,
                vec![Action::EmitEvent(SyncEvent::SyncFailed { error })],
            ),

            // Connectivity
            (Idle | Error | Syncing, Event::ConnectivityLost) => {
                (Offline, vec![Action::EmitEvent(SyncEvent::Offline)])
            }
            (Offline, Event::ConnectivityRestored) => {
                (Idle, vec![Action::EmitEvent(SyncEvent::Online)])
            }
            (Syncing, Event::ConnectivityRestored) => {
                (Syncing, vec![Action::EmitEvent(SyncEvent::Online)])
            }

            // Pause / resume
            (Idle | Error | Offline, Event::PauseRequested) => {
                (Paused, vec![Action::StopTimer])
            }
            (Syncing, Event::PauseRequested) => (Syncing, vec![Action::StopTimer]),
            (Paused, Event::ResumeRequested) => (Idle, vec![Action::StartTimer]),
            (status, Event::ResumeRequested) => (status, vec![Action::StartTimer]),

            // Invalid transitions - stay in current state
            (status, _) => (status, vec![]),
        };

        let status = if pause_pending && status != Syncing {
            pause_pending = false;
            Paused
        } else {
            status
        };

        (
            Self {
                status,
                pause_pending,
            },
            actions,
        )
    }

    /// Check if a cycle is running.
    pub fn is_syncing(&self) -> bool {
        self.status == SyncStatus::Syncing
    }

    /// Check if the periodic timer may start a cycle.
    pub fn is_idle(&self) -> bool {
        self.status == SyncStatus::Idle
    }
}

/// Events that can occur in the engine lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A caller, the timer or a tracked change asked for a cycle.
    SyncRequested,
    /// The running cycle finished without errors.
    CycleCompleted {
        /// Entries accepted by the remote store.
        pushed: usize,
        /// Remote entries applied locally.
        pulled: usize,
        /// Conflicts detected during the cycle.
        conflicts: usize,
    },
    /// The running cycle finished with errors or was aborted.
    CycleFailed {
        /// Aggregate error message.
        error: String,
    },
    /// Connectivity check failed.
    ConnectivityLost,
    /// Connectivity check succeeded after a failure.
    ConnectivityRestored,
    /// Host asked to suspend auto-sync.
    PauseRequested,
    /// Host asked to restart auto-sync.
    ResumeRequested,
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run the push/pull cycle.
    StartCycle,
    /// Another cycle is running; fail the request immediately.
    RejectBusy,
    /// Sync is paused; fail the request immediately.
    RejectPaused,
    /// Start (or restart) the periodic auto-sync timer.
    StartTimer,
    /// Stop the periodic auto-sync timer.
    StopTimer,
    /// Emit an event to the application.
    EmitEvent(SyncEvent),
}

/// Phase of a sync cycle, reported with progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Sending local entries.
    Push,
    /// Applying remote entries.
    Pull,
}

/// Events emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A cycle started.
    SyncStarted,
    /// A cycle finished without errors.
    SyncCompleted {
        /// Entries accepted by the remote store.
        pushed: usize,
        /// Remote entries applied locally.
        pulled: usize,
        /// Conflicts detected during the cycle.
        conflicts: usize,
    },
    /// A cycle finished with errors or was aborted.
    SyncFailed {
        /// Aggregate error message.
        error: String,
    },
    /// Progress within a phase.
    Progress {
        /// The running phase.
        phase: SyncPhase,
        /// Items processed so far.
        current: usize,
        /// Items in this phase.
        total: usize,
    },
    /// A local and a remote entry collided.
    ConflictDetected {
        /// The new conflict.
        conflict_id: ConflictId,
        /// The contested key.
        key: String,
    },
    /// A conflict received a value.
    ConflictResolved {
        /// The resolved conflict.
        conflict_id: ConflictId,
        /// The contested key.
        key: String,
        /// Strategy that produced the value.
        strategy: ResolutionStrategy,
    },
    /// The remote store accepted an entry.
    EntrySynced {
        /// The accepted entry.
        entry_id: EntryId,
        /// Its key.
        key: String,
    },
    /// The remote store rejected an entry.
    EntryFailed {
        /// The rejected entry.
        entry_id: EntryId,
        /// Its key.
        key: String,
        /// Error message recorded on the entry.
        error: String,
    },
    /// Connectivity came back.
    Online,
    /// Connectivity was lost.
    Offline,
}
