use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::options::TransitionOptions;
use crate::content::Revision;

/// How long a lock taken by the job creator blocks re-queueing.
pub const LOCK_DURATION: Duration = Duration::seconds(1800);

/// Record timestamps keep whole seconds, the precision every store can hold.
fn whole_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(0)
}

/// Identifier of a scheduled transition record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionId(pub u64);

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a content revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(pub u64);

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Polymorphic reference to a content entity: resolved through the
/// content registry by `entity_type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

/// Completion record. Present only once a transition has been processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedState {
    pub processed_at: DateTime<Utc>,
    pub revision_ids: Vec<RevisionId>,
}

/// A request to move a content entity into a workflow state at a given time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTransition {
    pub id: TransitionId,
    pub entity: EntityRef,
    /// `None` resolves the head revision at run time.
    pub entity_revision_id: Option<RevisionId>,
    pub entity_revision_langcode: Option<String>,
    pub author: Option<UserId>,
    pub workflow: String,
    /// Destination moderation state id.
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub transition_at: DateTime<Utc>,
    pub options: TransitionOptions,
    locked_at: Option<DateTime<Utc>>,
    processed: Option<ProcessedState>,
}

impl ScheduledTransition {
    pub fn from_new(id: TransitionId, new: NewTransition) -> Self {
        Self {
            id,
            entity: new.entity,
            entity_revision_id: new.entity_revision_id,
            entity_revision_langcode: new.entity_revision_langcode,
            author: new.author,
            workflow: new.workflow,
            state: new.state,
            created_at: whole_seconds(new.created_at),
            transition_at: whole_seconds(new.transition_at),
            options: new.options,
            locked_at: None,
            processed: None,
        }
    }

    pub fn locked_at(&self) -> Option<DateTime<Utc>> {
        self.locked_at
    }

    pub fn set_locked_at(&mut self, at: DateTime<Utc>) -> &mut Self {
        self.locked_at = Some(whole_seconds(at));
        self
    }

    pub fn clear_lock(&mut self) -> &mut Self {
        self.locked_at = None;
        self
    }

    /// Move the transition to a new time. Any outstanding lock is released
    /// so the job creator can pick it up again when it is due.
    pub fn reschedule(&mut self, at: DateTime<Utc>) -> &mut Self {
        self.transition_at = whole_seconds(at);
        self.locked_at = None;
        self
    }

    pub fn is_processed(&self) -> bool {
        self.processed.is_some()
    }

    pub fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed.as_ref().map(|p| p.processed_at)
    }

    pub fn processed_revision_ids(&self) -> &[RevisionId] {
        self.processed
            .as_ref()
            .map(|p| p.revision_ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn set_processed(&mut self, at: DateTime<Utc>, revision_ids: Vec<RevisionId>) -> &mut Self {
        self.processed = Some(ProcessedState {
            processed_at: whole_seconds(at),
            revision_ids,
        });
        self
    }

    pub fn set_not_processed(&mut self) -> &mut Self {
        self.processed = None;
        self
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_processed() && self.transition_at <= now
    }

    /// Due and not held by an unexpired lock. A lock exactly
    /// `lock_duration` old counts as expired.
    pub fn is_lockable(&self, now: DateTime<Utc>, lock_duration: Duration) -> bool {
        self.is_due(now)
            && self
                .locked_at
                .map_or(true, |locked| now - locked >= lock_duration)
    }

    /// Processed at or before `cutoff`.
    pub fn is_expired(&self, cutoff: DateTime<Utc>) -> bool {
        self.processed_at().is_some_and(|at| at <= cutoff)
    }
}

/// An unsaved transition; the store assigns the id on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransition {
    pub entity: EntityRef,
    pub entity_revision_id: Option<RevisionId>,
    pub entity_revision_langcode: Option<String>,
    pub author: Option<UserId>,
    pub workflow: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub transition_at: DateTime<Utc>,
    pub options: TransitionOptions,
}

impl NewTransition {
    /// Schedule `revision` to move to `state` of `workflow` at `transition_at`.
    pub fn for_revision(
        revision: &Revision,
        workflow: impl Into<String>,
        state: impl Into<String>,
        transition_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity: revision.entity.clone(),
            entity_revision_id: Some(revision.revision_id),
            entity_revision_langcode: Some(revision.langcode.clone()),
            author: None,
            workflow: workflow.into(),
            state: state.into(),
            created_at: transition_at,
            transition_at,
            options: TransitionOptions::default(),
        }
    }

    pub fn with_author(mut self, author: UserId) -> Self {
        self.author = Some(author);
        self
    }

    pub fn with_options(mut self, options: TransitionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn created(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }
}
