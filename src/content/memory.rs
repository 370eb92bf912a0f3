use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{ContentStore, Revision, RevisionDraft};
use crate::error::StorageError;
use crate::transition::RevisionId;

#[derive(Debug, Clone, Copy)]
struct Pointers {
    latest: RevisionId,
    default: RevisionId,
}

#[derive(Debug, Default)]
struct Inner {
    next_revision_id: u64,
    revisions: BTreeMap<RevisionId, Revision>,
    entities: HashMap<String, Pointers>,
}

/// In-process revisioned content for a single entity type.
///
/// Revision ids are allocated from one counter, so they increase across
/// entities the same way a shared revision table would.
#[derive(Debug)]
pub struct MemoryContentStore {
    entity_type: String,
    inner: RwLock<Inner>,
}

impl MemoryContentStore {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// All revisions of an entity, oldest first.
    pub async fn revisions_of(&self, entity_id: &str) -> Vec<Revision> {
        let inner = self.inner.read().await;
        let Some(pointers) = inner.entities.get(entity_id).copied() else {
            return Vec::new();
        };
        inner
            .revisions
            .values()
            .filter(|r| r.entity.entity_id == entity_id)
            .map(|r| with_default_flag(r, pointers))
            .collect()
    }

    pub async fn default_revision_id(&self, entity_id: &str) -> Option<RevisionId> {
        let inner = self.inner.read().await;
        inner.entities.get(entity_id).map(|p| p.default)
    }

    /// Remove an entity. Its revisions become unreachable.
    pub async fn delete_entity(&self, entity_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let removed = inner.entities.remove(entity_id).is_some();
        inner.revisions.retain(|_, r| r.entity.entity_id != entity_id);
        removed
    }
}

fn with_default_flag(revision: &Revision, pointers: Pointers) -> Revision {
    let mut revision = revision.clone();
    revision.is_default = revision.revision_id == pointers.default;
    revision
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    async fn load_entity(&self, entity_id: &str) -> Result<Option<Revision>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner.entities.get(entity_id).and_then(|pointers| {
            inner
                .revisions
                .get(&pointers.default)
                .map(|r| with_default_flag(r, *pointers))
        }))
    }

    async fn load_revision(
        &self,
        revision_id: RevisionId,
    ) -> Result<Option<Revision>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner.revisions.get(&revision_id).and_then(|r| {
            inner
                .entities
                .get(&r.entity.entity_id)
                .map(|pointers| with_default_flag(r, *pointers))
        }))
    }

    async fn latest_revision_id(
        &self,
        entity_id: &str,
    ) -> Result<Option<RevisionId>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner.entities.get(entity_id).map(|p| p.latest))
    }

    async fn save(&self, draft: RevisionDraft) -> Result<Revision, StorageError> {
        if draft.entity.entity_type != self.entity_type {
            return Err(StorageError::Backend(format!(
                "cannot save {} into the {} store",
                draft.entity, self.entity_type
            )));
        }

        let mut inner = self.inner.write().await;
        let is_new_entity = !inner.entities.contains_key(&draft.entity.entity_id);
        if is_new_entity && draft.source_revision_id.is_some() {
            return Err(StorageError::NotFound(draft.entity.to_string()));
        }

        inner.next_revision_id += 1;
        let revision_id = RevisionId(inner.next_revision_id);
        let becomes_default = draft.make_default || is_new_entity;

        let pointers = inner
            .entities
            .entry(draft.entity.entity_id.clone())
            .or_insert(Pointers {
                latest: revision_id,
                default: revision_id,
            });
        pointers.latest = revision_id;
        if becomes_default {
            pointers.default = revision_id;
        }
        let pointers = *pointers;

        let revision = Revision {
            entity: draft.entity,
            revision_id,
            langcode: draft.langcode,
            moderation_state: draft.moderation_state,
            is_default: becomes_default,
            changed_at: draft.changed_at,
            log_message: draft.log_message,
            log_created_at: draft.log_created_at,
            fields: draft.fields,
        };
        inner.revisions.insert(revision_id, revision.clone());

        Ok(with_default_flag(&revision, pointers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::EntityRef;
    use serde_json::json;

    #[tokio::test]
    async fn first_revision_is_default_and_latest() {
        let store = MemoryContentStore::new("node");
        let first = store
            .save(RevisionDraft::new(EntityRef::new("node", "1"), "en").with_state("draft"))
            .await
            .unwrap();

        assert!(first.is_default);
        assert_eq!(store.latest_revision_id("1").await.unwrap(), Some(first.revision_id));
        assert_eq!(store.load_entity("1").await.unwrap().unwrap(), first);
    }

    #[tokio::test]
    async fn non_default_save_moves_head_only() {
        let store = MemoryContentStore::new("node");
        let published = store
            .save(
                RevisionDraft::new(EntityRef::new("node", "1"), "en")
                    .with_state("published")
                    .with_field("title", json!("Hello")),
            )
            .await
            .unwrap();

        let mut draft = store.create_revision_copy(&published, false);
        draft.moderation_state = Some("draft".into());
        let head = store.save(draft).await.unwrap();

        assert!(!head.is_default);
        assert_eq!(store.latest_revision_id("1").await.unwrap(), Some(head.revision_id));
        assert_eq!(store.default_revision_id("1").await, Some(published.revision_id));
        assert_eq!(head.fields.get("title"), Some(&json!("Hello")));

        // The default flag is computed at load time.
        let reloaded = store.load_revision(published.revision_id).await.unwrap().unwrap();
        assert!(reloaded.is_default);
    }

    #[tokio::test]
    async fn revision_ids_increase_across_entities() {
        let store = MemoryContentStore::new("node");
        let a = store
            .save(RevisionDraft::new(EntityRef::new("node", "a"), "en"))
            .await
            .unwrap();
        let b = store
            .save(RevisionDraft::new(EntityRef::new("node", "b"), "en"))
            .await
            .unwrap();
        assert!(b.revision_id > a.revision_id);
        assert_eq!(store.revisions_of("a").await.len(), 1);
    }

    #[tokio::test]
    async fn deleted_entities_are_unreachable() {
        let store = MemoryContentStore::new("node");
        let rev = store
            .save(RevisionDraft::new(EntityRef::new("node", "1"), "en"))
            .await
            .unwrap();

        assert!(store.delete_entity("1").await);
        assert!(store.load_entity("1").await.unwrap().is_none());
        assert!(store.load_revision(rev.revision_id).await.unwrap().is_none());
        assert!(store.latest_revision_id("1").await.unwrap().is_none());

        let copy = RevisionDraft::copy_of(&rev, false);
        assert!(matches!(store.save(copy).await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn rejects_foreign_entity_types() {
        let store = MemoryContentStore::new("node");
        let err = store
            .save(RevisionDraft::new(EntityRef::new("media", "1"), "en"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
    }
}
