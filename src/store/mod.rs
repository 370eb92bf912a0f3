// Transition Store - persistent collection of scheduled transitions

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::StorageError;
use crate::transition::{EntityRef, NewTransition, ScheduledTransition, TransitionId};

pub use memory::MemoryTransitionStore;

/// Storage for scheduled transitions.
///
/// All writes are single-record. `try_lock` is the only conditional write
/// and must be atomic with respect to concurrent callers.
#[async_trait]
pub trait TransitionStore: Send + Sync {
    /// Persist a new transition and return it with its assigned id.
    async fn insert(&self, new: NewTransition) -> Result<ScheduledTransition, StorageError>;

    async fn load(&self, id: TransitionId) -> Result<Option<ScheduledTransition>, StorageError>;

    /// Load several transitions, skipping ids that no longer exist.
    async fn load_multiple(
        &self,
        ids: &[TransitionId],
    ) -> Result<Vec<ScheduledTransition>, StorageError> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(transition) = self.load(*id).await? {
                found.push(transition);
            }
        }
        Ok(found)
    }

    /// Write the full record, recreating it if it was deleted in between.
    async fn save(&self, transition: &ScheduledTransition) -> Result<(), StorageError>;

    /// Overwrite an existing record. Returns `false` without writing when it
    /// has been deleted in the meantime.
    async fn update(&self, transition: &ScheduledTransition) -> Result<bool, StorageError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: TransitionId) -> Result<bool, StorageError>;

    async fn delete_multiple(&self, ids: &[TransitionId]) -> Result<usize, StorageError> {
        let mut deleted = 0;
        for id in ids {
            if self.delete(*id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Ids of transitions that are due and not held by an unexpired lock,
    /// ordered by id.
    async fn find_lockable(
        &self,
        now: DateTime<Utc>,
        lock_duration: Duration,
    ) -> Result<Vec<TransitionId>, StorageError>;

    /// Set `locked_at = now` only if the transition is still lockable at
    /// write time. Returns whether this caller won the lock.
    async fn try_lock(
        &self,
        id: TransitionId,
        now: DateTime<Utc>,
        lock_duration: Duration,
    ) -> Result<bool, StorageError>;

    /// Ids of processed transitions with `processed_at <= cutoff`.
    async fn find_expired(&self, cutoff: DateTime<Utc>)
        -> Result<Vec<TransitionId>, StorageError>;

    async fn list_for_entity(
        &self,
        entity: &EntityRef,
    ) -> Result<Vec<ScheduledTransition>, StorageError>;

    async fn count(&self) -> Result<usize, StorageError>;
}
