mod fixtures;

use chrono::Duration;
use fixtures::{at, SchedulerHarness};
use scheduled_transitions::config::RETAIN_FOREVER;
use scheduled_transitions::{
    CronHook, ScheduledTransition, TransitionJobs, TransitionOptions, TransitionStore,
};
use std::sync::Arc;

async fn processed(
    h: &SchedulerHarness,
    entity_id: &str,
    processed_at: i64,
) -> ScheduledTransition {
    let rev = h.create_entity(entity_id, "draft").await;
    let mut t = h
        .schedule(&rev, "published", at(1_000), TransitionOptions::default())
        .await;
    t.set_processed(at(processed_at), vec![rev.revision_id]);
    h.transitions.save(&t).await.unwrap();
    t
}

#[tokio::test]
async fn forever_retention_never_deletes() {
    let h = SchedulerHarness::retaining(RETAIN_FOREVER);
    let t = processed(&h, "1", 0).await;

    h.clock.advance(Duration::days(10 * 365));
    assert_eq!(h.jobs.cleanup_expired().await.unwrap(), 0);
    assert!(h.transitions.load(t.id).await.unwrap().is_some());
}

#[tokio::test]
async fn finite_retention_deletes_at_or_before_cutoff() {
    // Clock is at 10_000, so the cutoff is 6_400.
    let h = SchedulerHarness::retaining(3_600);
    let on_cutoff = processed(&h, "1", 6_400).await;
    let older = processed(&h, "2", 100).await;
    let newer = processed(&h, "3", 6_401).await;

    assert_eq!(h.jobs.cleanup_expired().await.unwrap(), 2);
    assert!(h.transitions.load(on_cutoff.id).await.unwrap().is_none());
    assert!(h.transitions.load(older.id).await.unwrap().is_none());
    assert!(h.transitions.load(newer.id).await.unwrap().is_some());
    assert_eq!(h.metrics.get_stats().transitions_expired, 2);
}

#[tokio::test]
async fn retention_longer_than_the_clock_range_keeps_everything() {
    let h = SchedulerHarness::retaining(10_000_000_000_000);
    assert!(h.config.validate().is_ok());
    let t = processed(&h, "1", 0).await;

    assert_eq!(h.jobs.cleanup_expired().await.unwrap(), 0);
    assert!(h.transitions.load(t.id).await.unwrap().is_some());
}

#[tokio::test]
async fn unprocessed_transitions_survive_the_sweep() {
    let h = SchedulerHarness::retaining(0);
    let rev = h.create_entity("1", "draft").await;
    let mut pending = h
        .schedule(&rev, "published", at(0), TransitionOptions::default())
        .await;
    pending.set_locked_at(at(0));
    h.transitions.save(&pending).await.unwrap();

    h.clock.advance(Duration::days(365));
    assert_eq!(h.jobs.cleanup_expired().await.unwrap(), 0);
    assert!(h.transitions.load(pending.id).await.unwrap().is_some());
}

#[tokio::test]
async fn zero_duration_deletes_on_the_next_sweep() {
    let h = SchedulerHarness::retaining(0);
    let rev = h.create_entity("1", "draft").await;
    let t = h
        .schedule(&rev, "published", at(5_000), TransitionOptions::default())
        .await;

    h.jobs_run().await;
    h.queue_runner
        .drain(std::time::Duration::from_secs(900))
        .await
        .unwrap();
    assert!(h.transitions.load(t.id).await.unwrap().unwrap().is_processed());

    assert_eq!(h.jobs.cleanup_expired().await.unwrap(), 1);
    assert_eq!(h.transitions.count().await.unwrap(), 0);
}

#[tokio::test]
async fn cron_hook_sweeps_only_with_finite_retention() {
    let h = SchedulerHarness::retaining(60);
    let t = processed(&h, "1", 0).await;
    let jobs: Arc<dyn TransitionJobs> = Arc::new(h.jobs);
    let hook = CronHook::new(h.config.clone(), jobs);

    let summary = hook.cron().await.unwrap();
    assert_eq!(summary.expired, Some(1));
    assert!(summary.created.is_some());
    assert!(h.transitions.load(t.id).await.unwrap().is_none());
}
