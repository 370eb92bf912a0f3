use async_trait::async_trait;

use crate::content::{ContentStore, Revision};
use crate::error::StorageError;
use crate::transition::ScheduledTransition;

/// Decides which revision a transition moves into its destination state.
///
/// Returning `Ok(None)` means no revision could be determined; the runner
/// treats that as a missing entity.
#[async_trait]
pub trait RevisionResolver: Send + Sync {
    async fn resolve(
        &self,
        transition: &ScheduledTransition,
        store: &dyn ContentStore,
    ) -> Result<Option<Revision>, StorageError>;
}

/// The stored revision, or the head when `latest_revision` is set or the
/// transition carries no revision id.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRevisionResolver;

#[async_trait]
impl RevisionResolver for DefaultRevisionResolver {
    async fn resolve(
        &self,
        transition: &ScheduledTransition,
        store: &dyn ContentStore,
    ) -> Result<Option<Revision>, StorageError> {
        let revision_id = match transition.entity_revision_id {
            Some(id) if !transition.options.latest_revision => Some(id),
            _ => store.latest_revision_id(&transition.entity.entity_id).await?,
        };
        let Some(revision_id) = revision_id else {
            return Ok(None);
        };

        // A revision of some other entity is as good as none.
        Ok(store
            .load_revision(revision_id)
            .await?
            .filter(|revision| revision.entity == transition.entity))
    }
}

/// Tries each resolver in order and takes the first revision found.
pub struct ChainedRevisionResolver {
    resolvers: Vec<Box<dyn RevisionResolver>>,
}

impl ChainedRevisionResolver {
    pub fn new(resolvers: Vec<Box<dyn RevisionResolver>>) -> Self {
        Self { resolvers }
    }
}

#[async_trait]
impl RevisionResolver for ChainedRevisionResolver {
    async fn resolve(
        &self,
        transition: &ScheduledTransition,
        store: &dyn ContentStore,
    ) -> Result<Option<Revision>, StorageError> {
        for resolver in &self.resolvers {
            if let Some(revision) = resolver.resolve(transition, store).await? {
                return Ok(Some(revision));
            }
        }
        Ok(None)
    }
}
