use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::Revision;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: String,
    pub label: String,
    /// Content in this state is publicly visible.
    pub published: bool,
    /// Saving into this state makes the revision the default revision.
    pub default_revision: bool,
}

impl WorkflowState {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            published: false,
            default_revision: false,
        }
    }

    pub fn published(mut self) -> Self {
        self.published = true;
        self.default_revision = true;
        self
    }

    pub fn default_revision(mut self) -> Self {
        self.default_revision = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub label: String,
    states: BTreeMap<String, WorkflowState>,
}

impl Workflow {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            states: BTreeMap::new(),
        }
    }

    /// Draft, Published and Archived, as shipped by most editorial setups.
    pub fn editorial() -> Self {
        Self::new("editorial", "Editorial")
            .with_state(WorkflowState::new("draft", "Draft"))
            .with_state(WorkflowState::new("published", "Published").published())
            .with_state(WorkflowState::new("archived", "Archived").default_revision())
    }

    pub fn with_state(mut self, state: WorkflowState) -> Self {
        self.states.insert(state.id.clone(), state);
        self
    }

    pub fn state(&self, id: &str) -> Option<&WorkflowState> {
        self.states.get(id)
    }

    pub fn states(&self) -> &BTreeMap<String, WorkflowState> {
        &self.states
    }
}

/// Answers moderation questions about content revisions.
pub trait ModerationInformation: Send + Sync {
    fn workflow_for_entity(&self, revision: &Revision) -> Option<&Workflow>;

    /// The revision is the canonical, publicly visible one.
    fn is_live_revision(&self, revision: &Revision) -> bool {
        if !revision.is_default {
            return false;
        }
        let Some(workflow) = self.workflow_for_entity(revision) else {
            return false;
        };
        revision
            .moderation_state
            .as_deref()
            .and_then(|state| workflow.state(state))
            .is_some_and(|state| state.published)
    }
}

/// Workflows assigned per entity type.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    by_entity_type: HashMap<String, Workflow>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(mut self, entity_type: impl Into<String>, workflow: Workflow) -> Self {
        self.by_entity_type.insert(entity_type.into(), workflow);
        self
    }
}

impl ModerationInformation for WorkflowRegistry {
    fn workflow_for_entity(&self, revision: &Revision) -> Option<&Workflow> {
        self.by_entity_type.get(&revision.entity.entity_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::{EntityRef, RevisionId};
    use serde_json::Map;

    fn revision(state: &str, is_default: bool) -> Revision {
        Revision {
            entity: EntityRef::new("node", "1"),
            revision_id: RevisionId(1),
            langcode: "en".into(),
            moderation_state: Some(state.into()),
            is_default,
            changed_at: None,
            log_message: None,
            log_created_at: None,
            fields: Map::new(),
        }
    }

    #[test]
    fn editorial_states() {
        let workflow = Workflow::editorial();
        assert!(!workflow.state("draft").unwrap().default_revision);
        assert!(workflow.state("published").unwrap().published);
        assert!(workflow.state("archived").unwrap().default_revision);
        assert!(!workflow.state("archived").unwrap().published);
        assert!(workflow.state("needs_review").is_none());
    }

    #[test]
    fn live_requires_default_and_published() {
        let info = WorkflowRegistry::new().assign("node", Workflow::editorial());

        assert!(info.is_live_revision(&revision("published", true)));
        assert!(!info.is_live_revision(&revision("published", false)));
        assert!(!info.is_live_revision(&revision("draft", true)));
        assert!(!info.is_live_revision(&revision("archived", true)));
    }

    #[test]
    fn entities_without_workflow_are_never_live() {
        let info = WorkflowRegistry::new();
        assert!(info.workflow_for_entity(&revision("published", true)).is_none());
        assert!(!info.is_live_revision(&revision("published", true)));
    }
}
