//! Conflict Manager.
//!
//! Records collisions between local and remote entries, settles them with
//! the configured [`ResolutionStrategy`], and persists every state change
//! under [`CONFLICTS_KEY`].
//!
//! Resolved conflicts are immutable. They stay in the store until
//! [`ConflictManager::clear_resolved`] purges them.

use crate::storage::{load_json, save_json, Storage, StorageError, CONFLICTS_KEY};
use async_trait::async_trait;
use driftsync_core::{resolve_with, Resolution};
use driftsync_types::{ConflictId, ResolutionStrategy, SyncConflict, SyncEntry, Timestamp};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Conflict errors.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// No conflict with this id exists.
    #[error("conflict not found: {0}")]
    NotFound(ConflictId),

    /// The conflict already has a value.
    #[error("conflict already resolved: {0}")]
    AlreadyResolved(ConflictId),

    /// The strategy is `Manual`; the host must call `manual_resolve`.
    #[error("conflict {0} requires manual resolution")]
    ManualResolutionRequired(ConflictId),

    /// The strategy is `Custom` but no resolver was supplied.
    #[error("custom conflict strategy configured without a resolver")]
    ResolverMissing,

    /// The custom resolver failed.
    #[error("resolver failed: {0}")]
    Resolver(String),

    /// The snapshot could not be written.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Application-supplied resolution for the `Custom` strategy.
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    /// Produce the value the key should end up with (`None` deletes it).
    async fn resolve(&self, conflict: &SyncConflict) -> Result<Option<Value>, ConflictError>;
}

#[async_trait]
impl<F> ConflictResolver for F
where
    F: Fn(&SyncConflict) -> Result<Option<Value>, ConflictError> + Send + Sync,
{
    async fn resolve(&self, conflict: &SyncConflict) -> Result<Option<Value>, ConflictError> {
        (self)(conflict)
    }
}

/// Outcome of [`ConflictManager::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// The settled conflict.
    pub conflict: SyncConflict,
    /// The value the key should end up with.
    pub value: Option<Value>,
}

/// Persisted store of detected conflicts.
pub struct ConflictManager<S: Storage> {
    storage: Arc<S>,
    strategy: ResolutionStrategy,
    resolver: Option<Arc<dyn ConflictResolver>>,
    conflicts: Vec<SyncConflict>,
}

impl<S: Storage> ConflictManager<S> {
    /// Restore the conflict store (empty when no snapshot exists).
    pub async fn load(
        storage: Arc<S>,
        strategy: ResolutionStrategy,
        resolver: Option<Arc<dyn ConflictResolver>>,
    ) -> Result<Self, StorageError> {
        let conflicts: Vec<SyncConflict> = load_json(storage.as_ref(), CONFLICTS_KEY)
            .await?
            .unwrap_or_default();
        Ok(Self {
            storage,
            strategy,
            resolver,
            conflicts,
        })
    }

    /// Configured strategy.
    pub fn strategy(&self) -> ResolutionStrategy {
        self.strategy
    }

    /// Whether automatic resolution would need the custom resolver and it is absent.
    pub fn is_misconfigured(&self) -> bool {
        self.strategy == ResolutionStrategy::Custom && self.resolver.is_none()
    }

    /// Create and persist a conflict between `local` and `remote`.
    pub async fn record(
        &mut self,
        local: SyncEntry,
        remote: SyncEntry,
        now: Timestamp,
    ) -> Result<SyncConflict, StorageError> {
        // A re-pulled remote entry refreshes its open conflict.
        if let Some(open) = self
            .conflicts
            .iter_mut()
            .find(|c| !c.resolved && c.key == remote.key && c.remote.id == remote.id)
        {
            open.local = local;
            let conflict = open.clone();
            self.persist().await?;
            return Ok(conflict);
        }

        let conflict = SyncConflict::new(local, remote, now);
        info!("conflict {} detected on key {}", conflict.id, conflict.key);
        self.conflicts.push(conflict.clone());
        self.persist().await?;
        Ok(conflict)
    }

    /// Settle a conflict with the configured strategy.
    ///
    /// On success the conflict is marked resolved and persisted.
    pub async fn resolve(
        &mut self,
        id: &ConflictId,
        now: Timestamp,
    ) -> Result<Resolved, ConflictError> {
        let index = self.unresolved_index(id)?;
        let strategy = self.strategy;

        let value = {
            let conflict = &self.conflicts[index];
            match resolve_with(strategy, &conflict.local, &conflict.remote) {
                Resolution::Value(value) => value,
                Resolution::Manual => return Err(ConflictError::ManualResolutionRequired(*id)),
                Resolution::Delegate => {
                    let resolver = self
                        .resolver
                        .as_ref()
                        .ok_or(ConflictError::ResolverMissing)?;
                    resolver.resolve(conflict).await?
                }
            }
        };

        let resolved = self.settle(index, strategy, value.clone(), now).await?;
        debug!("conflict {} resolved with {}", id, strategy);
        Ok(Resolved {
            conflict: resolved,
            value,
        })
    }

    /// Settle a conflict with a value chosen outside the engine.
    pub async fn manual_resolve(
        &mut self,
        id: &ConflictId,
        value: Option<Value>,
        now: Timestamp,
    ) -> Result<SyncConflict, ConflictError> {
        let index = self.unresolved_index(id)?;
        let resolved = self
            .settle(index, ResolutionStrategy::Manual, value, now)
            .await?;
        info!("conflict {} resolved manually", id);
        Ok(resolved)
    }

    /// Look up a conflict.
    pub fn get(&self, id: &ConflictId) -> Option<&SyncConflict> {
        self.conflicts.iter().find(|c| &c.id == id)
    }

    /// All conflicts still waiting for a value.
    pub fn unresolved(&self) -> Vec<SyncConflict> {
        self.conflicts.iter().filter(|c| !c.resolved).cloned().collect()
    }

    /// Number of conflicts still waiting for a value.
    pub fn unresolved_count(&self) -> usize {
        self.conflicts.iter().filter(|c| !c.resolved).count()
    }

    /// All stored conflicts, resolved or not.
    pub fn all(&self) -> &[SyncConflict] {
        &self.conflicts
    }

    /// Purge resolved conflicts. Returns how many were removed.
    pub async fn clear_resolved(&mut self) -> Result<usize, StorageError> {
        let before = self.conflicts.len();
        self.conflicts.retain(|c| !c.resolved);
        let removed = before - self.conflicts.len();
        if removed > 0 {
            self.persist().await?;
        }
        Ok(removed)
    }

    fn unresolved_index(&self, id: &ConflictId) -> Result<usize, ConflictError> {
        let index = self
            .conflicts
            .iter()
            .position(|c| &c.id == id)
            .ok_or(ConflictError::NotFound(*id))?;
        if self.conflicts[index].resolved {
            return Err(ConflictError::AlreadyResolved(*id));
        }
        Ok(index)
    }

    async fn settle(
        &mut self,
        index: usize,
        strategy: ResolutionStrategy,
        value: Option<Value>,
        now: Timestamp,
    ) -> Result<SyncConflict, StorageError> {
        let conflict = &mut self.conflicts[index];
        conflict.resolved = true;
        conflict.strategy = Some(strategy);
        conflict.resolved_value = value;
        conflict.resolved_at = Some(now);
        let resolved = conflict.clone();
        self.persist().await?;
        Ok(resolved)
    }

    async fn persist(&self) -> Result<(), StorageError> {
        save_json(self.storage.as_ref(), CONFLICTS_KEY, &self.conflicts).await
    }
}
