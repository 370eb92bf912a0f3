use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::TransitionStore;
use crate::error::StorageError;
use crate::transition::{EntityRef, NewTransition, ScheduledTransition, TransitionId};

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    records: BTreeMap<TransitionId, ScheduledTransition>,
}

/// Transition store held in process memory.
///
/// `try_lock` re-checks the lockable predicate under the write lock, so
/// concurrent job creators cannot both claim the same record.
#[derive(Debug, Default)]
pub struct MemoryTransitionStore {
    inner: RwLock<Inner>,
}

impl MemoryTransitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<ScheduledTransition> {
        self.inner.read().await.records.values().cloned().collect()
    }
}

#[async_trait]
impl TransitionStore for MemoryTransitionStore {
    async fn insert(&self, new: NewTransition) -> Result<ScheduledTransition, StorageError> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let transition = ScheduledTransition::from_new(TransitionId(inner.next_id), new);
        inner.records.insert(transition.id, transition.clone());
        Ok(transition)
    }

    async fn load(&self, id: TransitionId) -> Result<Option<ScheduledTransition>, StorageError> {
        Ok(self.inner.read().await.records.get(&id).cloned())
    }

    async fn save(&self, transition: &ScheduledTransition) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        inner.next_id = inner.next_id.max(transition.id.0);
        inner.records.insert(transition.id, transition.clone());
        Ok(())
    }

    async fn update(&self, transition: &ScheduledTransition) -> Result<bool, StorageError> {
        let mut inner = self.inner.write().await;
        match inner.records.get_mut(&transition.id) {
            Some(record) => {
                *record = transition.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: TransitionId) -> Result<bool, StorageError> {
        Ok(self.inner.write().await.records.remove(&id).is_some())
    }

    async fn find_lockable(
        &self,
        now: DateTime<Utc>,
        lock_duration: Duration,
    ) -> Result<Vec<TransitionId>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .values()
            .filter(|t| t.is_lockable(now, lock_duration))
            .map(|t| t.id)
            .collect())
    }

    async fn try_lock(
        &self,
        id: TransitionId,
        now: DateTime<Utc>,
        lock_duration: Duration,
    ) -> Result<bool, StorageError> {
        let mut inner = self.inner.write().await;
        match inner.records.get_mut(&id) {
            Some(transition) if transition.is_lockable(now, lock_duration) => {
                transition.set_locked_at(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_expired(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TransitionId>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .values()
            .filter(|t| t.is_expired(cutoff))
            .map(|t| t.id)
            .collect())
    }

    async fn list_for_entity(
        &self,
        entity: &EntityRef,
    ) -> Result<Vec<ScheduledTransition>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .values()
            .filter(|t| &t.entity == entity)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.inner.read().await.records.len())
    }
}
