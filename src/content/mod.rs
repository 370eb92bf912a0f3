// Content store collaborators.
//
// The scheduler never owns content: it reads revisions, asks for copies and
// saves them. Everything behind these traits belongs to the host application.

pub mod memory;
pub mod workflow;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::StorageError;
use crate::transition::{EntityRef, RevisionId};

pub use memory::MemoryContentStore;
pub use workflow::{ModerationInformation, Workflow, WorkflowRegistry, WorkflowState};

/// A saved revision of a content entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub entity: EntityRef,
    pub revision_id: RevisionId,
    pub langcode: String,
    pub moderation_state: Option<String>,
    /// Whether this revision is the entity's canonical (default) revision.
    pub is_default: bool,
    pub changed_at: Option<DateTime<Utc>>,
    pub log_message: Option<String>,
    pub log_created_at: Option<DateTime<Utc>>,
    pub fields: Map<String, Value>,
}

/// An unsaved revision. Saving it always produces a new revision id.
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionDraft {
    pub entity: EntityRef,
    pub source_revision_id: Option<RevisionId>,
    pub langcode: String,
    pub moderation_state: Option<String>,
    pub make_default: bool,
    pub changed_at: Option<DateTime<Utc>>,
    pub log_message: Option<String>,
    pub log_created_at: Option<DateTime<Utc>>,
    pub fields: Map<String, Value>,
}

impl RevisionDraft {
    /// First revision of a brand new entity.
    pub fn new(entity: EntityRef, langcode: impl Into<String>) -> Self {
        Self {
            entity,
            source_revision_id: None,
            langcode: langcode.into(),
            moderation_state: None,
            make_default: true,
            changed_at: None,
            log_message: None,
            log_created_at: None,
            fields: Map::new(),
        }
    }

    /// Copy of `source` carrying its content and state, without its log.
    pub fn copy_of(source: &Revision, make_default: bool) -> Self {
        Self {
            entity: source.entity.clone(),
            source_revision_id: Some(source.revision_id),
            langcode: source.langcode.clone(),
            moderation_state: source.moderation_state.clone(),
            make_default,
            changed_at: source.changed_at,
            log_message: None,
            log_created_at: None,
            fields: source.fields.clone(),
        }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.moderation_state = Some(state.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_default(mut self, make_default: bool) -> Self {
        self.make_default = make_default;
        self
    }

    pub fn set_revision_log(&mut self, message: String, created_at: DateTime<Utc>) {
        self.log_message = Some(message);
        self.log_created_at = Some(created_at);
    }
}

/// Revisioned storage for one entity type.
///
/// The head ("latest") revision is whatever was saved last; the default
/// revision only moves when a saved draft asks for it.
#[async_trait]
pub trait ContentStore: Send + Sync {
    fn entity_type(&self) -> &str;

    /// Load the entity's default revision, or `None` if the entity is gone.
    async fn load_entity(&self, entity_id: &str) -> Result<Option<Revision>, StorageError>;

    async fn load_revision(&self, revision_id: RevisionId)
        -> Result<Option<Revision>, StorageError>;

    async fn latest_revision_id(&self, entity_id: &str)
        -> Result<Option<RevisionId>, StorageError>;

    fn create_revision_copy(&self, source: &Revision, make_default: bool) -> RevisionDraft {
        RevisionDraft::copy_of(source, make_default)
    }

    async fn save(&self, draft: RevisionDraft) -> Result<Revision, StorageError>;
}

/// Content stores keyed by entity type.
#[derive(Clone, Default)]
pub struct ContentRegistry {
    stores: HashMap<String, Arc<dyn ContentStore>>,
}

impl ContentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, store: Arc<dyn ContentStore>) -> &mut Self {
        self.stores.insert(store.entity_type().to_string(), store);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.register(store);
        self
    }

    pub fn store_for(&self, entity_type: &str) -> Option<Arc<dyn ContentStore>> {
        self.stores.get(entity_type).cloned()
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ContentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentRegistry")
            .field("entity_types", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}
