use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::{ItemId, JobPayload, JobQueue, QueueItem};
use crate::error::StorageError;

#[derive(Debug, Clone)]
struct Entry {
    payload: JobPayload,
    created_at: DateTime<Utc>,
    leased_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    // Item ids increase monotonically, so map order is FIFO order.
    items: BTreeMap<ItemId, Entry>,
}

/// In-process job queue with lease-based visibility.
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    inner: Mutex<Inner>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads in delivery order, leased or not.
    pub async fn payloads(&self) -> Vec<JobPayload> {
        let inner = self.inner.lock().await;
        inner.items.values().map(|e| e.payload).collect()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn create_item(
        &self,
        payload: JobPayload,
        now: DateTime<Utc>,
    ) -> Result<Option<ItemId>, StorageError> {
        let mut inner = self.inner.lock().await;
        if inner.items.values().any(|e| e.payload == payload) {
            return Ok(None);
        }
        inner.next_id += 1;
        let item_id = ItemId(inner.next_id);
        inner.items.insert(
            item_id,
            Entry {
                payload,
                created_at: now,
                leased_until: None,
            },
        );
        Ok(Some(item_id))
    }

    async fn claim_item(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<QueueItem>, StorageError> {
        let lease_expires_at = now
            .checked_add_signed(lease)
            .ok_or_else(|| StorageError::Backend(format!("lease of {lease} is out of range")))?;

        let mut inner = self.inner.lock().await;
        let visible = inner
            .items
            .iter_mut()
            .find(|(_, e)| e.leased_until.map_or(true, |until| until <= now));

        Ok(visible.map(|(item_id, entry)| {
            entry.leased_until = Some(lease_expires_at);
            QueueItem {
                item_id: *item_id,
                payload: entry.payload,
                created_at: entry.created_at,
                lease_expires_at,
            }
        }))
    }

    async fn delete_item(&self, item_id: ItemId) -> Result<(), StorageError> {
        self.inner.lock().await.items.remove(&item_id);
        Ok(())
    }

    async fn release_item(&self, item_id: ItemId) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        match inner.items.get_mut(&item_id) {
            Some(entry) => {
                entry.leased_until = None;
                Ok(())
            }
            None => Err(StorageError::NotFound(format!("queue item {item_id}"))),
        }
    }

    async fn number_of_items(&self) -> Result<usize, StorageError> {
        Ok(self.inner.lock().await.items.len())
    }
}
