use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::content::{ContentRegistry, ModerationInformation};
use crate::error::Result;
use crate::jobs::{CronHook, CronSummary, ScheduledTransitionsJobs};
use crate::observability::SchedulerMetrics;
use crate::queue::JobQueue;
use crate::runner::TransitionRunner;
use crate::shutdown::ShutdownSignal;
use crate::store::TransitionStore;
use crate::worker::{DrainSummary, QueueRunner, ScheduledTransitionJob};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub cron: CronSummary,
    pub drained: DrainSummary,
}

/// Drives the lifecycle on a fixed interval: cron hook, then the queue.
pub struct SchedulerDaemon {
    cron: CronHook,
    queue_runner: QueueRunner,
    metrics: Arc<SchedulerMetrics>,
    workers: usize,
    budget: Duration,
    tick_interval: Duration,
}

impl SchedulerDaemon {
    pub fn new(
        cron: CronHook,
        queue_runner: QueueRunner,
        metrics: Arc<SchedulerMetrics>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            cron,
            queue_runner,
            metrics,
            workers: config.queue.workers,
            budget: config.cron_time_budget(),
            tick_interval: config.tick_interval(),
        }
    }

    /// Wire the runner, job services and queue worker around the given
    /// stores, sharing one metrics instance.
    pub fn build(
        config: Arc<SchedulerConfig>,
        content: ContentRegistry,
        moderation: Arc<dyn ModerationInformation>,
        transitions: Arc<dyn TransitionStore>,
        queue: Arc<dyn JobQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = Arc::new(SchedulerMetrics::new());

        let runner = TransitionRunner::new(
            content,
            moderation,
            config.clone(),
            transitions.clone(),
            clock.clone(),
        )
        .with_metrics(metrics.clone());
        let job = ScheduledTransitionJob::new(transitions.clone(), Arc::new(runner));
        let queue_runner = QueueRunner::new(
            queue.clone(),
            Arc::new(job),
            clock.clone(),
            config.lease_duration(),
        );

        let jobs = ScheduledTransitionsJobs::new(transitions, queue, config.clone(), clock)
            .with_metrics(metrics.clone());
        let cron = CronHook::new(config.clone(), Arc::new(jobs));

        Self::new(cron, queue_runner, metrics, &config)
    }

    pub fn metrics(&self) -> &Arc<SchedulerMetrics> {
        &self.metrics
    }

    /// One pass: cron hook, then drain the queue within the time budget.
    pub async fn tick(&self) -> Result<TickSummary> {
        let cron = self.cron.cron().await?;
        let drained = self
            .queue_runner
            .drain_concurrent(self.workers, self.budget)
            .await?;
        Ok(TickSummary { cron, drained })
    }

    /// Tick until shutdown. A failed tick is logged and retried on the
    /// next interval.
    pub async fn run(&self, mut shutdown: ShutdownSignal) {
        info!(
            interval_secs = self.tick_interval.as_secs(),
            workers = self.workers,
            "Scheduled transitions daemon started"
        );
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Scheduled transitions tick failed");
                    }
                }
            }
        }

        self.metrics.log_stats();
        info!("Scheduled transitions daemon stopped");
    }
}
