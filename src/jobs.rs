use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, Instrument};

use crate::clock::Clock;
use crate::config::ConfigProvider;
use crate::error::Result;
use crate::observability::{OperationTimer, SchedulerMetrics};
use crate::queue::{JobPayload, JobQueue};
use crate::store::TransitionStore;
use crate::telemetry;
use crate::transition::LOCK_DURATION;

/// Counts from one job creator sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCreatorSummary {
    /// Transitions this sweep won the lock for.
    pub locked: usize,
    /// Queue items created.
    pub enqueued: usize,
    /// Locked transitions that already had an outstanding queue item.
    pub already_queued: usize,
}

/// Periodic entry points.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TransitionJobs: Send + Sync {
    /// Lock every lockable transition and enqueue a job for it.
    async fn job_creator(&self) -> Result<JobCreatorSummary>;

    /// Delete processed transitions past the retention window. Returns the
    /// number deleted.
    async fn cleanup_expired(&self) -> Result<usize>;
}

pub struct ScheduledTransitionsJobs {
    transitions: Arc<dyn TransitionStore>,
    queue: Arc<dyn JobQueue>,
    config: Arc<dyn ConfigProvider>,
    clock: Arc<dyn Clock>,
    metrics: Arc<SchedulerMetrics>,
    lock_duration: Duration,
}

impl ScheduledTransitionsJobs {
    pub fn new(
        transitions: Arc<dyn TransitionStore>,
        queue: Arc<dyn JobQueue>,
        config: Arc<dyn ConfigProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transitions,
            queue,
            config,
            clock,
            metrics: Arc::new(SchedulerMetrics::new()),
            lock_duration: LOCK_DURATION,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SchedulerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    async fn create_jobs(&self) -> Result<JobCreatorSummary> {
        let now = self.clock.now();
        let mut summary = JobCreatorSummary::default();

        for id in self.transitions.find_lockable(now, self.lock_duration).await? {
            // Another creator may have claimed it since the query ran.
            if !self.transitions.try_lock(id, now, self.lock_duration).await? {
                debug!(
                    transition_id = %id,
                    "Scheduled transition was locked by another job creator"
                );
                continue;
            }
            summary.locked += 1;
            self.metrics.record_locked();

            match self.queue.create_item(JobPayload::new(id), now).await? {
                Some(item_id) => {
                    summary.enqueued += 1;
                    self.metrics.record_enqueued();
                    info!(
                        transition_id = %id,
                        item_id = %item_id,
                        "Created scheduled transition job for #{}",
                        id
                    );
                }
                None => {
                    summary.already_queued += 1;
                    self.metrics.record_duplicate_skipped();
                    info!(
                        transition_id = %id,
                        "Scheduled transition #{} already has a queued job",
                        id
                    );
                }
            }
        }

        Ok(summary)
    }

    async fn delete_expired(&self) -> Result<usize> {
        if self.config.is_retention_duration_forever() {
            return Ok(0);
        }

        let retention = self.config.get_retention_duration().max(0);
        let cutoff = Duration::try_seconds(retention)
            .and_then(|lifetime| self.clock.now().checked_sub_signed(lifetime));
        // A window reaching past the earliest representable instant keeps everything.
        let Some(cutoff) = cutoff else {
            debug!(retention, "Retention window exceeds the clock range, nothing has expired");
            return Ok(0);
        };
        let ids = self.transitions.find_expired(cutoff).await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let deleted = self.transitions.delete_multiple(&ids).await?;
        self.metrics.record_expired(deleted);
        info!(deleted, cutoff = %cutoff, "Deleted expired scheduled transitions");
        Ok(deleted)
    }
}

#[async_trait]
impl TransitionJobs for ScheduledTransitionsJobs {
    async fn job_creator(&self) -> Result<JobCreatorSummary> {
        let span =
            telemetry::create_sweep_span("job_creator", &telemetry::generate_correlation_id());
        let timer = OperationTimer::new("job_creator");
        let summary = self.create_jobs().instrument(span).await?;
        timer.finish();
        Ok(summary)
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let span =
            telemetry::create_sweep_span("cleanup_expired", &telemetry::generate_correlation_id());
        self.delete_expired().instrument(span).await
    }
}

/// What a cron pass ran. `None` means the step was switched off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CronSummary {
    pub created: Option<JobCreatorSummary>,
    pub expired: Option<usize>,
}

/// The periodic hook: job creation when enabled, then retention cleanup
/// unless processed transitions are kept forever.
pub struct CronHook {
    config: Arc<dyn ConfigProvider>,
    jobs: Arc<dyn TransitionJobs>,
}

impl CronHook {
    pub fn new(config: Arc<dyn ConfigProvider>, jobs: Arc<dyn TransitionJobs>) -> Self {
        Self { config, jobs }
    }

    pub async fn cron(&self) -> Result<CronSummary> {
        let mut summary = CronSummary::default();

        if self.config.is_creating_queue_items_in_hook_cron() {
            summary.created = Some(self.jobs.job_creator().await?);
        }

        if !self.config.is_retention_duration_forever() {
            summary.expired = Some(self.jobs.cleanup_expired().await?);
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockConfigProvider;

    fn config(create: bool, forever: bool) -> MockConfigProvider {
        let mut config = MockConfigProvider::new();
        config
            .expect_is_creating_queue_items_in_hook_cron()
            .return_const(create);
        config
            .expect_is_retention_duration_forever()
            .return_const(forever);
        config
    }

    #[tokio::test]
    async fn cron_runs_both_steps_when_enabled() {
        let mut jobs = MockTransitionJobs::new();
        jobs.expect_job_creator().times(1).returning(|| {
            Ok(JobCreatorSummary {
                locked: 2,
                enqueued: 2,
                already_queued: 0,
            })
        });
        jobs.expect_cleanup_expired().times(1).returning(|| Ok(3));

        let hook = CronHook::new(Arc::new(config(true, false)), Arc::new(jobs));
        let summary = hook.cron().await.unwrap();
        assert_eq!(summary.created.map(|s| s.enqueued), Some(2));
        assert_eq!(summary.expired, Some(3));
    }

    #[tokio::test]
    async fn cron_skips_disabled_steps() {
        let mut jobs = MockTransitionJobs::new();
        jobs.expect_job_creator().never();
        jobs.expect_cleanup_expired().never();

        let hook = CronHook::new(Arc::new(config(false, true)), Arc::new(jobs));
        assert_eq!(hook.cron().await.unwrap(), CronSummary::default());
    }
}
