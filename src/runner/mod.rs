// Transition Runner
//
// Executes a single scheduled transition against the content store: copies
// the target revision into the destination state, optionally re-stacks an
// unpublished head on top, then records the outcome on the transition.

pub mod resolver;
pub mod tokens;

use std::sync::Arc;
use tracing::{info, warn, Instrument};

use crate::clock::Clock;
use crate::config::ConfigProvider;
use crate::content::{ContentRegistry, ContentStore, ModerationInformation, Revision};
use crate::error::{MissingEntityReason, Result, TransitionError};
use crate::observability::SchedulerMetrics;
use crate::store::TransitionStore;
use crate::telemetry;
use crate::transition::{RevisionId, ScheduledTransition, TransitionId};

pub use resolver::{ChainedRevisionResolver, DefaultRevisionResolver, RevisionResolver};
pub use tokens::{TokenReplacements, MISSING_STATE};

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub transition_id: TransitionId,
    /// New revisions created by this run, in creation order.
    pub changed_revision_ids: Vec<RevisionId>,
    /// False when the transition was deleted right after processing.
    pub retained: bool,
}

pub struct TransitionRunner {
    content: ContentRegistry,
    moderation: Arc<dyn ModerationInformation>,
    config: Arc<dyn ConfigProvider>,
    transitions: Arc<dyn TransitionStore>,
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn RevisionResolver>,
    metrics: Arc<SchedulerMetrics>,
}

/// Snapshot of the head revision taken before anything is saved.
struct LatestSnapshot {
    is_published: bool,
    state_is_known: bool,
}

impl TransitionRunner {
    pub fn new(
        content: ContentRegistry,
        moderation: Arc<dyn ModerationInformation>,
        config: Arc<dyn ConfigProvider>,
        transitions: Arc<dyn TransitionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            content,
            moderation,
            config,
            transitions,
            clock,
            resolver: Arc::new(DefaultRevisionResolver),
            metrics: Arc::new(SchedulerMetrics::new()),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn RevisionResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SchedulerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<SchedulerMetrics> {
        &self.metrics
    }

    /// Run `transition`, marking it processed and deleting it unless the
    /// configuration retains processed transitions.
    pub async fn run_transition(
        &self,
        transition: &mut ScheduledTransition,
    ) -> Result<TransitionOutcome> {
        let correlation_id = telemetry::generate_correlation_id();
        let span = telemetry::create_transition_span(
            "run_transition",
            transition.id,
            Some(&transition.entity),
            &correlation_id,
        );
        self.run(transition).instrument(span).await
    }

    async fn run(&self, transition: &mut ScheduledTransition) -> Result<TransitionOutcome> {
        let id = transition.id;
        if transition.is_processed() {
            return Err(TransitionError::AlreadyProcessed(id));
        }
        let now = self.clock.now();

        let Some(store) = self.content.store_for(&transition.entity.entity_type) else {
            info!(transition_id = %id, "Entity type is not registered for scheduled transition");
            return Err(TransitionError::missing(id, MissingEntityReason::Entity));
        };
        if store.load_entity(&transition.entity.entity_id).await?.is_none() {
            info!(transition_id = %id, "Entity does not exist for scheduled transition");
            return Err(TransitionError::missing(id, MissingEntityReason::Entity));
        }

        let new_revision = self
            .resolver
            .resolve(transition, store.as_ref())
            .await?
            .ok_or_else(|| TransitionError::missing(id, MissingEntityReason::Revision))?;

        let latest = match store.latest_revision_id(&transition.entity.entity_id).await? {
            Some(latest_id) => store.load_revision(latest_id).await?,
            None => None,
        };
        let Some(latest) = latest else {
            info!(transition_id = %id, "Latest revision does not exist for scheduled transition");
            return Err(TransitionError::missing(id, MissingEntityReason::LatestRevision));
        };

        let original_revision_ids = [new_revision.revision_id, latest.revision_id];
        let changed = self
            .transition_entity(transition, store.as_ref(), &new_revision, &latest, now)
            .await?;
        info!(transition_id = %id, "Processed scheduled transition");

        let mut changed_revision_ids: Vec<RevisionId> = Vec::with_capacity(changed.len());
        for revision_id in changed {
            if !original_revision_ids.contains(&revision_id)
                && !changed_revision_ids.contains(&revision_id)
            {
                changed_revision_ids.push(revision_id);
            }
        }

        // Written even when not retained so observers of the store see the
        // processed state. A record deleted during the run stays deleted.
        transition.set_processed(now, changed_revision_ids.clone());
        let still_stored = self.transitions.update(transition).await?;
        self.metrics.record_processed(changed_revision_ids.len());
        if !still_stored {
            warn!(transition_id = %id, "Scheduled transition was deleted while it ran");
            return Ok(TransitionOutcome {
                transition_id: id,
                changed_revision_ids,
                retained: false,
            });
        }

        let retained = self.config.is_retaining_after_processing(transition);
        if !retained {
            self.transitions.delete(id).await?;
            info!(transition_id = %id, "Deleted scheduled transition");
        }

        Ok(TransitionOutcome {
            transition_id: id,
            changed_revision_ids,
            retained,
        })
    }

    /// Save the new revisions and return their ids in creation order.
    async fn transition_entity(
        &self,
        transition: &ScheduledTransition,
        store: &dyn ContentStore,
        new_revision: &Revision,
        latest: &Revision,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<RevisionId>> {
        let mut changed = Vec::with_capacity(2);

        // Captured before any save, the head's flags change once a new
        // default revision exists.
        let workflow = self.moderation.workflow_for_entity(latest);
        let snapshot = LatestSnapshot {
            is_published: self.moderation.is_live_revision(latest),
            state_is_known: workflow
                .zip(latest.moderation_state.as_deref())
                .and_then(|(workflow, state)| workflow.state(state))
                .is_some(),
        };
        let new_state = workflow.and_then(|workflow| workflow.state(&transition.state));
        let replacements = TokenReplacements::new(transition, new_revision, latest, workflow);

        let new_is_latest = new_revision.revision_id == latest.revision_id;
        let template = if new_is_latest {
            self.config.get_message_transition_latest(new_revision)
        } else {
            self.config.get_message_transition_historical(new_revision)
        };
        let revision_log = replacements.replace(&template);

        let make_default = new_state.is_some_and(|state| state.default_revision);
        let mut draft = store.create_revision_copy(new_revision, make_default);
        draft.moderation_state = Some(transition.state.clone());
        draft.changed_at = Some(now);
        if !revision_log.is_empty() {
            draft.set_revision_log(revision_log, now);
        }

        if new_is_latest {
            info!(
                transition_id = %transition.id,
                "Transitioning latest revision #{} from {} to {}",
                replacements.latest_revision_id,
                replacements.from_state,
                replacements.to_state
            );
            changed.push(store.save(draft).await?.revision_id);
            return Ok(changed);
        }

        info!(
            transition_id = %transition.id,
            "Copied revision #{} and changed from {} to {}",
            replacements.from_revision_id,
            replacements.from_state,
            replacements.to_state
        );
        changed.push(store.save(draft).await?.revision_id);

        // Pull an unpublished head back on top so the transition does not
        // bury it. Only when its state still exists in the workflow.
        if transition.options.recreate_non_default_head
            && !snapshot.is_published
            && snapshot.state_is_known
        {
            let mut restored = store.create_revision_copy(latest, false);
            let template = self.config.get_message_transition_copy_latest_draft(latest);
            restored.set_revision_log(replacements.replace(&template), now);
            info!(
                transition_id = %transition.id,
                "Reverted {} revision #{} back to top",
                replacements.latest_state,
                replacements.latest_revision_id
            );
            changed.push(store.save(restored).await?.revision_id);
        }

        Ok(changed)
    }
}

impl std::fmt::Debug for TransitionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionRunner")
            .field("content", &self.content)
            .finish_non_exhaustive()
    }
}
