//! Background tasks: the auto-sync timer, the real-time subscription and
//! sync-on-change cycles.
//!
//! Every task holds a `Weak` reference to the engine, so dropping the last
//! [`SyncEngine`] handle ends them.

use super::{SyncEngine, SyncReport};
use crate::provider::SyncProvider;
use crate::storage::Storage;
use driftsync_core::Event;
use driftsync_types::{SyncEntry, SyncStatus};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Handles of the running background tasks.
#[derive(Debug, Default)]
pub(super) struct Tasks {
    started: bool,
    timer: Option<JoinHandle<()>>,
    realtime: Option<JoinHandle<()>>,
}

impl Tasks {
    pub(super) fn abort_all(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(realtime) = self.realtime.take() {
            realtime.abort();
        }
        self.started = false;
    }
}

impl<S, P> SyncEngine<S, P>
where
    S: Storage + 'static,
    P: SyncProvider + 'static,
{
    /// Start the auto-sync timer and the real-time subscription.
    ///
    /// Calling `start` on a started engine does nothing. Must be called
    /// from within a tokio runtime.
    pub fn start(&self) {
        let mut tasks = self.tasks();
        if tasks.started {
            return;
        }
        tasks.started = true;
        tasks.timer = self.spawn_timer();
        tasks.realtime = self.spawn_realtime();
        info!(
            "sync engine started (timer: {}, real-time: {})",
            tasks.timer.is_some(),
            tasks.realtime.is_some()
        );
    }

    /// Stop the auto-sync timer and the real-time subscription.
    ///
    /// A cycle already running finishes; queued work is kept.
    pub fn stop(&self) {
        self.tasks().abort_all();
        info!("sync engine stopped");
    }

    /// Whether `start` has been called (and `stop` has not).
    pub fn is_started(&self) -> bool {
        self.tasks().started
    }

    /// Suspend automatic syncing. Queued work is kept and `sync()` is
    /// refused until [`resume`](Self::resume).
    pub async fn pause(&self) {
        self.transition(Event::PauseRequested).await;
        info!("sync paused");
    }

    /// Re-enable automatic syncing after [`pause`](Self::pause).
    pub async fn resume(&self) {
        self.transition(Event::ResumeRequested).await;
        info!("sync resumed");
    }

    pub(super) fn start_timer(&self) {
        let mut tasks = self.tasks();
        if !tasks.started {
            return;
        }
        if let Some(timer) = tasks.timer.take() {
            timer.abort();
        }
        tasks.timer = self.spawn_timer();
    }

    pub(super) fn stop_timer(&self) {
        if let Some(timer) = self.tasks().timer.take() {
            timer.abort();
            debug!("auto-sync timer stopped");
        }
    }

    /// Run one cycle in the background without waiting for it.
    pub(super) fn spawn_sync(&self) {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let engine = SyncEngine { inner };
            log_outcome("background", engine.sync().await);
        });
    }

    fn spawn_timer(&self) -> Option<JoinHandle<()>> {
        let period = self.inner.config.auto_sync_interval()?;
        let weak = Arc::downgrade(&self.inner);

        Some(tokio::spawn(async move {
            debug!("auto-sync timer started (interval: {:?})", period);
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            timer.tick().await;

            loop {
                timer.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let engine = SyncEngine { inner };

                match engine.status().await {
                    SyncStatus::Idle | SyncStatus::Error => {}
                    SyncStatus::Offline => {
                        if !engine.check_connection().await {
                            debug!("auto-sync: still offline");
                            continue;
                        }
                    }
                    SyncStatus::Syncing | SyncStatus::Paused => continue,
                }
                log_outcome("auto-sync", engine.sync().await);
            }
        }))
    }

    fn spawn_realtime(&self) -> Option<JoinHandle<()>> {
        let mut incoming = self.inner.provider.subscribe()?;
        let weak = Arc::downgrade(&self.inner);

        Some(tokio::spawn(async move {
            while let Some(entry) = incoming.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                SyncEngine { inner }.handle_incoming(entry).await;
            }
            debug!("real-time subscription closed");
        }))
    }

    /// Apply an entry delivered by the real-time channel.
    ///
    /// Entries arriving while paused are skipped; the next pull fetches them.
    async fn handle_incoming(&self, entry: SyncEntry) {
        if !self.inner.config.direction.pulls() || !self.accepts_remote(&entry) {
            return;
        }
        if self.status().await == SyncStatus::Paused {
            debug!("paused, leaving {} for the next pull", entry.key);
            return;
        }

        let key = entry.key.clone();
        let mut report = SyncReport::default();
        match self.apply_remote(entry, &mut report).await {
            Ok(()) if report.errors.is_empty() => debug!("applied real-time entry for {}", key),
            Ok(()) => warn!("real-time entry for {}: {}", key, report.errors.join("; ")),
            Err(e) => warn!("failed to apply real-time entry for {}: {}", key, e),
        }
    }
}

fn log_outcome(origin: &str, outcome: Result<SyncReport, super::EngineError>) {
    match outcome {
        Ok(report) if report.success => {}
        Ok(report) => debug!("{} sync did not complete: {}", origin, report.errors.join("; ")),
        Err(e) => warn!("{} sync failed: {}", origin, e),
    }
}
