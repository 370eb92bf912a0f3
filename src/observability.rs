use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Counters for the transition lifecycle. Shared through an `Arc` by the
/// job services, the runner and the queue worker.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    pub transitions_locked: AtomicU64,
    pub items_enqueued: AtomicU64,
    pub duplicate_items_skipped: AtomicU64,
    pub transitions_processed: AtomicU64,
    pub revisions_created: AtomicU64,
    pub missing_entities_deleted: AtomicU64,
    pub transitions_expired: AtomicU64,
    pub failures: AtomicU64,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_locked(&self) {
        self.transitions_locked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enqueued(&self) {
        self.items_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_skipped(&self) {
        self.duplicate_items_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self, revisions: usize) {
        self.transitions_processed.fetch_add(1, Ordering::Relaxed);
        self.revisions_created
            .fetch_add(revisions as u64, Ordering::Relaxed);
    }

    pub fn record_missing_entity(&self) {
        self.missing_entities_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self, count: usize) {
        self.transitions_expired
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> SchedulerStats {
        SchedulerStats {
            transitions_locked: self.transitions_locked.load(Ordering::Relaxed),
            items_enqueued: self.items_enqueued.load(Ordering::Relaxed),
            duplicate_items_skipped: self.duplicate_items_skipped.load(Ordering::Relaxed),
            transitions_processed: self.transitions_processed.load(Ordering::Relaxed),
            revisions_created: self.revisions_created.load(Ordering::Relaxed),
            missing_entities_deleted: self.missing_entities_deleted.load(Ordering::Relaxed),
            transitions_expired: self.transitions_expired.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            locked = stats.transitions_locked,
            enqueued = stats.items_enqueued,
            duplicates = stats.duplicate_items_skipped,
            processed = stats.transitions_processed,
            revisions = stats.revisions_created,
            missing = stats.missing_entities_deleted,
            expired = stats.transitions_expired,
            failures = stats.failures,
            "Scheduled transition metrics"
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub transitions_locked: u64,
    pub items_enqueued: u64,
    pub duplicate_items_skipped: u64,
    pub transitions_processed: u64,
    pub revisions_created: u64,
    pub missing_entities_deleted: u64,
    pub transitions_expired: u64,
    pub failures: u64,
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        info!(
            operation = self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
        duration
    }
}
