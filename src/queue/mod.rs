// Job Queue - durable FIFO of transition references awaiting execution

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::transition::TransitionId;

pub use memory::MemoryJobQueue;

/// Name the job creator enqueues under.
pub const QUEUE_NAME: &str = "scheduled_transition_job";

/// Wire format of a queue item: `{"scheduled_transition_id": 5}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub scheduled_transition_id: TransitionId,
}

impl JobPayload {
    pub fn new(scheduled_transition_id: TransitionId) -> Self {
        Self {
            scheduled_transition_id,
        }
    }

    pub fn to_json(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, StorageError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A claimed item. It stays invisible to other consumers until
/// `lease_expires_at`, after which it is delivered again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub item_id: ItemId,
    pub payload: JobPayload,
    pub created_at: DateTime<Utc>,
    pub lease_expires_at: DateTime<Utc>,
}

/// Durable queue feeding the queue worker.
///
/// At most one item per transition id is pending or leased at a time, so a
/// transition re-locked by an overlapping job creator run is not delivered
/// twice while the first delivery is still outstanding.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a payload. Returns `None` when an item for the same
    /// transition is already pending or leased.
    async fn create_item(
        &self,
        payload: JobPayload,
        now: DateTime<Utc>,
    ) -> Result<Option<ItemId>, StorageError>;

    /// Claim the oldest visible item for `lease`.
    async fn claim_item(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<QueueItem>, StorageError>;

    /// Acknowledge a finished item.
    async fn delete_item(&self, item_id: ItemId) -> Result<(), StorageError>;

    /// Hand a claimed item back for immediate redelivery.
    async fn release_item(&self, item_id: ItemId) -> Result<(), StorageError>;

    /// Pending and leased items.
    async fn number_of_items(&self) -> Result<usize, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_wire_format() {
        let payload = JobPayload::new(TransitionId(5));
        assert_eq!(payload.to_json().unwrap(), r#"{"scheduled_transition_id":5}"#);
        assert_eq!(
            JobPayload::from_json(r#"{"scheduled_transition_id":42}"#).unwrap(),
            JobPayload::new(TransitionId(42))
        );
    }

    #[test]
    fn malformed_payload_is_a_serialization_error() {
        let err = JobPayload::from_json(r#"{"transition":1}"#).unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
