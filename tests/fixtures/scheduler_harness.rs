#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::sync::Arc;

use scheduled_transitions::{
    ContentRegistry, ContentStore, EntityRef, FixedClock, MemoryContentStore, MemoryJobQueue,
    MemoryTransitionStore, NewTransition, QueueRunner, Revision, RevisionDraft,
    ScheduledTransition, ScheduledTransitionJob, ScheduledTransitionsJobs, SchedulerConfig,
    SchedulerMetrics, TransitionOptions, TransitionRunner, Workflow, WorkflowRegistry,
};

pub const ENTITY_TYPE: &str = "node";

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("valid timestamp")
}

/// A fully wired in-memory scheduler with a controllable clock.
pub struct SchedulerHarness {
    pub clock: Arc<FixedClock>,
    pub content: Arc<MemoryContentStore>,
    pub transitions: Arc<MemoryTransitionStore>,
    pub queue: Arc<MemoryJobQueue>,
    pub config: Arc<SchedulerConfig>,
    pub metrics: Arc<SchedulerMetrics>,
    pub runner: Arc<TransitionRunner>,
    pub jobs: ScheduledTransitionsJobs,
    pub job: Arc<ScheduledTransitionJob>,
    pub queue_runner: QueueRunner,
}

impl SchedulerHarness {
    pub fn new(config: SchedulerConfig) -> Self {
        let clock = Arc::new(FixedClock::at_timestamp(10_000));
        let content = Arc::new(MemoryContentStore::new(ENTITY_TYPE));
        let transitions = Arc::new(MemoryTransitionStore::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let config = Arc::new(config);
        let metrics = Arc::new(SchedulerMetrics::new());

        let runner = Arc::new(
            TransitionRunner::new(
                ContentRegistry::new().with_store(content.clone()),
                Arc::new(WorkflowRegistry::new().assign(ENTITY_TYPE, Workflow::editorial())),
                config.clone(),
                transitions.clone(),
                clock.clone(),
            )
            .with_metrics(metrics.clone()),
        );
        let jobs = ScheduledTransitionsJobs::new(
            transitions.clone(),
            queue.clone(),
            config.clone(),
            clock.clone(),
        )
        .with_metrics(metrics.clone());
        let job = Arc::new(ScheduledTransitionJob::new(
            transitions.clone(),
            runner.clone(),
        ));
        let queue_runner = QueueRunner::new(
            queue.clone(),
            job.clone(),
            clock.clone(),
            config.lease_duration(),
        );

        Self {
            clock,
            content,
            transitions,
            queue,
            config,
            metrics,
            runner,
            jobs,
            job,
            queue_runner,
        }
    }

    /// Processed transitions are kept until swept.
    pub fn retaining(duration: i64) -> Self {
        let mut config = SchedulerConfig::default();
        config.retain_processed.enabled = true;
        config.retain_processed.duration = duration;
        Self::new(config)
    }

    pub fn now(&self) -> DateTime<Utc> {
        use scheduled_transitions::Clock;
        self.clock.now()
    }

    /// First revision of a new entity, in `state`.
    pub async fn create_entity(&self, entity_id: &str, state: &str) -> Revision {
        self.content
            .save(
                RevisionDraft::new(EntityRef::new(ENTITY_TYPE, entity_id), "en")
                    .with_state(state)
                    .with_field("title", serde_json::json!(format!("Entity {entity_id}"))),
            )
            .await
            .expect("save first revision")
    }

    /// New revision on top of `source`, moved to `state`.
    pub async fn add_revision(
        &self,
        source: &Revision,
        state: &str,
        make_default: bool,
    ) -> Revision {
        let draft = self
            .content
            .create_revision_copy(source, make_default)
            .with_state(state);
        self.content.save(draft).await.expect("save revision")
    }

    pub async fn schedule(
        &self,
        revision: &Revision,
        state: &str,
        due: DateTime<Utc>,
        options: TransitionOptions,
    ) -> ScheduledTransition {
        use scheduled_transitions::TransitionStore;
        self.transitions
            .insert(
                NewTransition::for_revision(revision, "editorial", state, due)
                    .with_options(options)
                    .created(self.now()),
            )
            .await
            .expect("insert transition")
    }

    /// Run the job creator once and return how many items it enqueued.
    pub async fn jobs_run(&self) -> usize {
        use scheduled_transitions::TransitionJobs;
        self.jobs.job_creator().await.expect("job creator").enqueued
    }

    pub async fn head(&self, entity_id: &str) -> Revision {
        let id = self
            .content
            .latest_revision_id(entity_id)
            .await
            .expect("latest id")
            .expect("entity has a head");
        self.content
            .load_revision(id)
            .await
            .expect("load head")
            .expect("head exists")
    }
}
