use thiserror::Error;

use crate::transition::TransitionId;

/// Errors raised by transition stores, job queues and content stores.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Why a transition could not reach its target content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingEntityReason {
    /// The target entity (or its entity type) no longer exists.
    Entity,
    /// No revision could be resolved as the transition target.
    Revision,
    /// The current head revision could not be loaded.
    LatestRevision,
}

impl std::fmt::Display for MissingEntityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingEntityReason::Entity => write!(f, "entity does not exist"),
            MissingEntityReason::Revision => {
                write!(f, "no revision could be determined to transition to")
            }
            MissingEntityReason::LatestRevision => write!(f, "latest revision does not exist"),
        }
    }
}

/// Errors produced while scheduling or executing transitions.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// Terminal for the transition: the worker deletes it.
    #[error("scheduled transition #{transition_id}: {reason}")]
    MissingEntity {
        transition_id: TransitionId,
        reason: MissingEntityReason,
    },

    #[error("scheduled transition #{0} has already been processed")]
    AlreadyProcessed(TransitionId),

    #[error("invalid transition options: {0}")]
    InvalidOptions(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TransitionError {
    pub fn missing(transition_id: TransitionId, reason: MissingEntityReason) -> Self {
        TransitionError::MissingEntity {
            transition_id,
            reason,
        }
    }

    pub fn is_missing_entity(&self) -> bool {
        matches!(self, TransitionError::MissingEntity { .. })
    }
}

pub type Result<T, E = TransitionError> = std::result::Result<T, E>;
