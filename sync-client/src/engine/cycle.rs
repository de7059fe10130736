//! The push/pull cycle and remote-entry application.

use super::{EngineError, SyncEngine, SyncReport};
use crate::conflict::ConflictError;
use crate::provider::{ProviderError, SyncProvider};
use crate::storage::{is_reserved, save_json, Storage, LAST_SYNC_KEY};
use driftsync_core::{
    apply_delta, calculate_checksum, calculate_delta, detect_conflict, verify_checksum, Action,
    Event, SyncEvent, SyncPhase,
};
use driftsync_types::{EntryId, Operation, SyncEntry, SyncProgress, Timestamp};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use tracing::{debug, error, info, warn};

/// How a cycle that did not fail ended.
enum CycleEnd {
    Completed,
    Offline,
}

impl<S, P> SyncEngine<S, P>
where
    S: Storage + 'static,
    P: SyncProvider + 'static,
{
    /// Run one push/pull cycle.
    ///
    /// Only one cycle runs at a time: a call while another is running (or
    /// while paused) returns a failed report immediately without touching
    /// the queue or the provider. Transport failures and timeouts end the
    /// cycle early and are reported in [`SyncReport::errors`]; storage
    /// failures and a `Custom` strategy without a resolver are returned as
    /// errors.
    pub async fn sync(&self) -> Result<SyncReport, EngineError> {
        let started = self.now();
        for action in self.transition(Event::SyncRequested).await {
            match action {
                Action::RejectBusy => {
                    debug!("sync requested while a cycle is running");
                    return Ok(SyncReport::rejected("sync already in progress"));
                }
                Action::RejectPaused => {
                    debug!("sync requested while paused");
                    return Ok(SyncReport::rejected("sync is paused"));
                }
                _ => {}
            }
        }
        info!("sync cycle started on device {}", self.inner.device_id);

        let mut report = SyncReport::default();
        let outcome = self.run_cycle(started, &mut report).await;
        report.duration = self.now().since(started);
        self.inner.state.lock().await.progress = None;

        match outcome {
            Ok(CycleEnd::Offline) => {
                report.errors.push("remote store unreachable".to_string());
                Ok(report)
            }
            Ok(CycleEnd::Completed) if report.errors.is_empty() => {
                report.success = true;
                self.inner.state.lock().await.last_error = None;
                self.transition(Event::CycleCompleted {
                    pushed: report.pushed,
                    pulled: report.pulled,
                    conflicts: report.conflicts,
                })
                .await;
                info!(
                    "sync cycle completed: {} pushed, {} pulled, {} conflicts",
                    report.pushed, report.pulled, report.conflicts
                );
                Ok(report)
            }
            Ok(CycleEnd::Completed) => {
                let message = report.errors.join("; ");
                warn!("sync cycle completed with errors: {}", message);
                self.fail_cycle(message).await;
                Ok(report)
            }
            Err(EngineError::Provider(e)) => {
                warn!("sync cycle aborted: {}", e);
                report.errors.push(e.to_string());
                self.fail_cycle(report.errors.join("; ")).await;
                Ok(report)
            }
            Err(e) => {
                error!("sync cycle failed: {}", e);
                self.fail_cycle(e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn fail_cycle(&self, error: String) {
        self.inner.state.lock().await.last_error = Some(error.clone());
        self.transition(Event::CycleFailed { error }).await;
    }

    async fn run_cycle(
        &self,
        started: Timestamp,
        report: &mut SyncReport,
    ) -> Result<CycleEnd, EngineError> {
        if !self.check_connection().await {
            warn!("remote store unreachable, going offline");
            self.inner.state.lock().await.online = false;
            self.transition(Event::ConnectivityLost).await;
            return Ok(CycleEnd::Offline);
        }
        let was_offline = {
            let mut state = self.inner.state.lock().await;
            let was_offline = !state.online;
            state.online = true;
            was_offline
        };
        if was_offline {
            info!("remote store reachable again");
            self.transition(Event::ConnectivityRestored).await;
        }

        let direction = self.inner.config.direction;
        let pushed_keys = if direction.pushes() {
            self.push_phase(started, report).await?
        } else {
            HashMap::new()
        };
        if direction.pulls() {
            self.pull_phase(&pushed_keys, report).await?;
        }

        self.inner.state.lock().await.last_sync = Some(started);
        save_json(self.inner.storage.as_ref(), LAST_SYNC_KEY, &started).await?;
        let purged = self.inner.queue.lock().await.clear_synced().await?;
        debug!("purged {} synced entries", purged);

        Ok(CycleEnd::Completed)
    }

    // ===========================================
    // Remote calls
    // ===========================================

    /// Probe the provider; a timeout counts as unreachable.
    pub(super) async fn check_connection(&self) -> bool {
        tokio::time::timeout(
            self.inner.config.timeout(),
            self.inner.provider.check_connection(),
        )
        .await
        .unwrap_or(false)
    }

    /// Run a provider call under the configured timeout.
    async fn remote<T>(
        &self,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        match tokio::time::timeout(self.inner.config.timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        }
    }

    // ===========================================
    // Push phase
    // ===========================================

    /// Push retry-eligible entries. Returns the newest pushed timestamp per key.
    async fn push_phase(
        &self,
        now: Timestamp,
        report: &mut SyncReport,
    ) -> Result<HashMap<String, Timestamp>, EngineError> {
        let config = &self.inner.config;
        let blocked: HashSet<String> = self
            .inner
            .conflicts
            .lock()
            .await
            .unresolved()
            .into_iter()
            .map(|c| c.key)
            .collect();
        let due: Vec<SyncEntry> = self
            .inner
            .queue
            .lock()
            .await
            .retryable(&config.retry_policy(), now)
            .into_iter()
            .filter(|e| !blocked.contains(&e.key))
            .collect();

        let mut pushed_keys = HashMap::new();
        if due.is_empty() {
            return Ok(pushed_keys);
        }

        let total = due.len();
        debug!("pushing {} entries in batches of {}", total, config.batch_size);
        let mut done = 0;

        for batch in due.chunks(config.batch_size) {
            let outgoing: Vec<SyncEntry> = batch.iter().map(|e| self.outgoing(e)).collect();

            let result = match self.remote(self.inner.provider.push(&outgoing)).await {
                Ok(result) => result,
                Err(e) => {
                    let message = e.to_string();
                    let mut queue = self.inner.queue.lock().await;
                    for entry in batch {
                        queue.mark_failed(&entry.id, &message, self.now()).await?;
                    }
                    report.failed += batch.len();
                    return Err(e.into());
                }
            };

            let rejected_all = !result.success && result.failed_ids.is_empty();
            let failed: HashSet<EntryId> = result.failed_ids.into_iter().collect();

            let mut queue = self.inner.queue.lock().await;
            for entry in batch {
                if rejected_all || failed.contains(&entry.id) {
                    let error = if rejected_all {
                        "push rejected"
                    } else {
                        "rejected by remote"
                    };
                    queue.mark_failed(&entry.id, error, self.now()).await?;
                    warn!("entry {} for {} failed: {}", entry.id, entry.key, error);
                    report.failed += 1;
                    report.errors.push(format!("{}: {}", entry.key, error));
                    self.inner.events.emit(SyncEvent::EntryFailed {
                        entry_id: entry.id,
                        key: entry.key.clone(),
                        error: error.to_string(),
                    });
                } else {
                    queue.mark_synced(&entry.id).await?;
                    report.pushed += 1;
                    let newest = pushed_keys.entry(entry.key.clone()).or_insert(entry.timestamp);
                    *newest = (*newest).max(entry.timestamp);
                    self.inner.events.emit(SyncEvent::EntrySynced {
                        entry_id: entry.id,
                        key: entry.key.clone(),
                    });
                }
            }
            drop(queue);

            done += batch.len();
            self.progress(SyncPhase::Push, done, total).await;
        }

        Ok(pushed_keys)
    }

    /// The form of an entry sent to the provider.
    ///
    /// With delta sync on, updates that know their previous value carry a
    /// field delta and a checksum of the full value instead of the value.
    fn outgoing(&self, entry: &SyncEntry) -> SyncEntry {
        let mut outgoing = entry.clone();
        if !self.inner.config.delta_sync || entry.operation != Operation::Update {
            return outgoing;
        }
        if let (Some(previous), Some(value)) = (&entry.previous_value, &entry.value) {
            outgoing.delta = Some(calculate_delta(previous, value));
            outgoing.checksum = Some(calculate_checksum(value));
            outgoing.value = None;
            outgoing.previous_value = None;
        }
        outgoing
    }

    // ===========================================
    // Pull phase
    // ===========================================

    async fn pull_phase(
        &self,
        pushed_keys: &HashMap<String, Timestamp>,
        report: &mut SyncReport,
    ) -> Result<(), EngineError> {
        let since = self.inner.state.lock().await.last_sync;
        let incoming = self
            .remote(self.inner.provider.pull(since, &self.inner.device_id))
            .await?;

        let incoming: Vec<SyncEntry> = incoming
            .into_iter()
            .filter(|e| self.accepts_remote(e))
            .collect();
        let total = incoming.len();
        debug!("pulled {} remote entries", total);

        for (index, remote) in incoming.into_iter().enumerate() {
            let stale = pushed_keys
                .get(&remote.key)
                .is_some_and(|&pushed| remote.timestamp < pushed);
            if stale {
                debug!("skipping remote entry for {} older than this cycle's push", remote.key);
            } else {
                self.apply_remote(remote, report).await?;
            }
            self.progress(SyncPhase::Pull, index + 1, total).await;
        }
        Ok(())
    }

    /// Whether a remote entry should be considered at all.
    pub(super) fn accepts_remote(&self, entry: &SyncEntry) -> bool {
        entry.device_id != self.inner.device_id
            && !is_reserved(&entry.key)
            && self.inner.config.filter.allows(&entry.key)
    }

    /// Conflict-check a remote entry against the queue, then apply it.
    pub(super) async fn apply_remote(
        &self,
        remote: SyncEntry,
        report: &mut SyncReport,
    ) -> Result<(), EngineError> {
        let remote = self.materialize(remote).await?;
        let local = self
            .inner
            .queue
            .lock()
            .await
            .latest_unsynced_for_key(&remote.key)
            .cloned();

        match local {
            Some(local) if detect_conflict(&local, &remote) => {
                self.handle_conflict(local, remote, report).await
            }
            _ => {
                self.apply_entry(&remote).await?;
                report.pulled += 1;
                Ok(())
            }
        }
    }

    /// Rebuild the value of a delta-only remote entry.
    ///
    /// Falls back to the provider's full entry when the rebuilt value does
    /// not match the sender's checksum.
    async fn materialize(&self, mut remote: SyncEntry) -> Result<SyncEntry, EngineError> {
        let Some(delta) = remote.delta.take() else {
            return Ok(remote);
        };
        if remote.value.is_some() || remote.operation == Operation::Delete {
            return Ok(remote);
        }

        let base = self
            .inner
            .storage
            .get(&remote.key)
            .await?
            .unwrap_or(Value::Null);
        let candidate = apply_delta(&base, &delta);
        let verified = remote
            .checksum
            .as_deref()
            .map_or(true, |checksum| verify_checksum(&candidate, checksum));
        if verified {
            remote.value = Some(candidate);
            return Ok(remote);
        }

        warn!("checksum mismatch for {}, fetching full entry", remote.key);
        let full = self
            .remote(self.inner.provider.get_remote(&remote.key))
            .await?;
        match full.and_then(|full| full.value) {
            Some(value) => {
                remote.value = Some(value);
                Ok(remote)
            }
            None => Err(ProviderError::Remote(format!("no remote value for {}", remote.key)).into()),
        }
    }

    async fn apply_entry(&self, remote: &SyncEntry) -> Result<(), EngineError> {
        match (&remote.operation, &remote.value) {
            (Operation::Delete, _) => self.inner.storage.delete(&remote.key).await?,
            (_, Some(value)) => self.inner.storage.set(&remote.key, value.clone()).await?,
            (_, None) => {
                warn!("remote entry {} for {} has no value, skipping", remote.id, remote.key);
            }
        }
        Ok(())
    }

    async fn handle_conflict(
        &self,
        local: SyncEntry,
        remote: SyncEntry,
        report: &mut SyncReport,
    ) -> Result<(), EngineError> {
        let now = self.now();
        let remote_value = remote.value.clone();

        let mut conflicts = self.inner.conflicts.lock().await;
        let conflict = conflicts.record(local, remote, now).await?;
        report.conflicts += 1;
        self.inner.events.emit(SyncEvent::ConflictDetected {
            conflict_id: conflict.id,
            key: conflict.key.clone(),
        });
        let outcome = conflicts.resolve(&conflict.id, now).await;
        let strategy = conflicts.strategy();
        drop(conflicts);

        match outcome {
            Ok(resolved) => {
                self.write_local(&conflict.key, resolved.value.clone())
                    .await?;
                self.reconcile_queue(&conflict.key, &resolved.value, &remote_value)
                    .await?;
                report.resolved += 1;
                self.inner.events.emit(SyncEvent::ConflictResolved {
                    conflict_id: conflict.id,
                    key: conflict.key,
                    strategy,
                });
                Ok(())
            }
            Err(ConflictError::ManualResolutionRequired(id)) => {
                warn!("conflict {} on {} needs manual resolution", id, conflict.key);
                Ok(())
            }
            Err(ConflictError::ResolverMissing) => Err(EngineError::Configuration(
                ConflictError::ResolverMissing.to_string(),
            )),
            Err(ConflictError::Storage(e)) => Err(e.into()),
            Err(e) => {
                warn!("conflict {} on {} not resolved: {}", conflict.id, conflict.key, e);
                report.errors.push(format!("{}: {}", conflict.key, e));
                Ok(())
            }
        }
    }

    async fn progress(&self, phase: SyncPhase, current: usize, total: usize) {
        self.inner.state.lock().await.progress = Some(SyncProgress { current, total });
        self.inner.events.emit(SyncEvent::Progress {
            phase,
            current,
            total,
        });
    }
}
