use chrono::Duration;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn, Instrument};

use crate::clock::Clock;
use crate::error::Result;
use crate::observability::{OperationTimer, SchedulerMetrics};
use crate::queue::{JobPayload, JobQueue};
use crate::runner::{TransitionOutcome, TransitionRunner};
use crate::store::TransitionStore;
use crate::telemetry;

/// How a queue item was settled. Every variant acknowledges the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Processed(TransitionOutcome),
    /// The transition was deleted before the job ran.
    NotFound,
    /// A duplicate delivery of a transition that already ran.
    AlreadyProcessed,
    /// The target content is gone; the transition was deleted.
    MissingEntityDeleted,
}

/// Queue worker for `scheduled_transition_job` items.
pub struct ScheduledTransitionJob {
    transitions: Arc<dyn TransitionStore>,
    runner: Arc<TransitionRunner>,
    metrics: Arc<SchedulerMetrics>,
}

impl ScheduledTransitionJob {
    pub fn new(transitions: Arc<dyn TransitionStore>, runner: Arc<TransitionRunner>) -> Self {
        let metrics = runner.metrics().clone();
        Self {
            transitions,
            runner,
            metrics,
        }
    }

    /// Errors other than a missing target propagate so the item is retried.
    pub async fn process_item(&self, payload: JobPayload) -> Result<JobOutcome> {
        let id = payload.scheduled_transition_id;
        let Some(mut transition) = self.transitions.load(id).await? else {
            info!(transition_id = %id, "Scheduled transition no longer exists");
            return Ok(JobOutcome::NotFound);
        };

        if transition.is_processed() {
            info!(transition_id = %id, "Scheduled transition was already processed");
            return Ok(JobOutcome::AlreadyProcessed);
        }

        match self.runner.run_transition(&mut transition).await {
            Ok(outcome) => Ok(JobOutcome::Processed(outcome)),
            Err(err) if err.is_missing_entity() => {
                self.transitions.delete(id).await?;
                self.metrics.record_missing_entity();
                info!(
                    transition_id = %id,
                    error = %err,
                    "Deleted scheduled transition with missing entity"
                );
                Ok(JobOutcome::MissingEntityDeleted)
            }
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub processed: usize,
    pub failed: usize,
}

impl DrainSummary {
    fn merge(&mut self, other: DrainSummary) {
        self.processed += other.processed;
        self.failed += other.failed;
    }
}

/// Pulls items off the job queue and hands them to the worker.
#[derive(Clone)]
pub struct QueueRunner {
    queue: Arc<dyn JobQueue>,
    job: Arc<ScheduledTransitionJob>,
    clock: Arc<dyn Clock>,
    lease: Duration,
}

impl QueueRunner {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        job: Arc<ScheduledTransitionJob>,
        clock: Arc<dyn Clock>,
        lease: Duration,
    ) -> Self {
        Self {
            queue,
            job,
            clock,
            lease,
        }
    }

    /// Process items until the queue has nothing visible or `budget` is
    /// spent. A failed item keeps its lease and comes back once it expires.
    pub async fn drain(&self, budget: std::time::Duration) -> Result<DrainSummary> {
        let span =
            telemetry::create_sweep_span("drain_queue", &telemetry::generate_correlation_id());
        self.drain_inner(budget).instrument(span).await
    }

    async fn drain_inner(&self, budget: std::time::Duration) -> Result<DrainSummary> {
        let timer = OperationTimer::new("drain_queue");
        let mut summary = DrainSummary::default();

        while timer.elapsed() < budget {
            let Some(item) = self.queue.claim_item(self.clock.now(), self.lease).await? else {
                break;
            };
            let transition_id = item.payload.scheduled_transition_id;

            match self.job.process_item(item.payload).await {
                Ok(_) => {
                    self.queue.delete_item(item.item_id).await?;
                    summary.processed += 1;
                }
                Err(err) => {
                    self.job.metrics.record_failure();
                    warn!(
                        transition_id = %transition_id,
                        item_id = %item.item_id,
                        error = %err,
                        "Scheduled transition job failed, retrying after lease expiry"
                    );
                    summary.failed += 1;
                }
            }
        }

        timer.finish();
        Ok(summary)
    }

    /// Run `workers` drains in parallel over the same queue. If any worker
    /// stopped on an error, that error is returned once all have finished.
    pub async fn drain_concurrent(
        &self,
        workers: usize,
        budget: std::time::Duration,
    ) -> Result<DrainSummary> {
        let mut set = JoinSet::new();
        for _ in 0..workers.max(1) {
            let runner = self.clone();
            set.spawn(async move { runner.drain(budget).await });
        }

        let mut summary = DrainSummary::default();
        let mut first_error = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(part)) => summary.merge(part),
                Ok(Err(err)) => {
                    warn!(error = %err, "Queue worker stopped");
                    first_error.get_or_insert(err);
                }
                Err(join_err) => warn!(error = %join_err, "Queue worker panicked"),
            }
        }

        match first_error {
            Some(err) => {
                warn!(
                    processed = summary.processed,
                    failed = summary.failed,
                    "Queue drain finished with a stopped worker"
                );
                Err(err)
            }
            None => Ok(summary),
        }
    }
}
