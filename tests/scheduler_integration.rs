//! Integration tests for the ingestion scheduler
//!
//! These tests verify the scheduler's core guarantees under a paused
//! clock:
//! - No immediate fire on start; the first run lands one period in
//! - Firings never overlap; a slow run causes skips, not a backlog
//! - Manual triggers are rejected with Busy while a run is in flight and
//!   do not shift the regular cadence
//! - A failed run leaves the schedule alive
//! - After stop returns, no new run can start

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{scheduler_config, ProbeJob};
use trialscope::scheduler::{SchedulerError, TaskScheduler};

const PERIOD: Duration = Duration::from_secs(3600);
const GRACE: Duration = Duration::from_secs(30);

fn build(job: ProbeJob, period: Duration) -> (Arc<TaskScheduler>, common::ProbeCounters) {
    let counters = job.counters();
    let scheduler =
        TaskScheduler::new(Arc::new(job), scheduler_config(period, GRACE)).expect("valid config");
    (Arc::new(scheduler), counters)
}

// ============================================================================
// Cadence
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_no_fire_before_first_period() {
    let (scheduler, counters) = build(ProbeJob::instant(), PERIOD);
    scheduler.start().await.unwrap();

    tokio::time::sleep(PERIOD - Duration::from_secs(1)).await;
    assert_eq!(counters.started(), 0, "fired before the first period");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(counters.started(), 1, "did not fire at the first period");

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_fires_every_period() {
    let (scheduler, counters) = build(ProbeJob::instant(), PERIOD);
    scheduler.start().await.unwrap();

    tokio::time::sleep(PERIOD * 3 + Duration::from_secs(5)).await;
    assert_eq!(counters.completed(), 3);

    scheduler.stop().await;
}

// ============================================================================
// Non-overlap
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_slow_run_is_never_overlapped() {
    // Each run takes 2.5 periods; firings during a run must be skipped
    let period = Duration::from_secs(60);
    let (scheduler, counters) = build(
        ProbeJob::with_delay(Duration::from_secs(150)),
        period,
    );
    scheduler.start().await.unwrap();

    let window = Duration::from_secs(600);
    tokio::time::sleep(window).await;
    scheduler.stop().await;

    assert_eq!(counters.max_in_flight(), 1, "two runs overlapped");

    // At most T / period completed invocations over the window
    let upper_bound = (window.as_secs() / period.as_secs()) as u32;
    assert!(
        counters.completed() <= upper_bound,
        "completed {} runs, bound was {}",
        counters.completed(),
        upper_bound
    );

    // With a 150 s run and 60 s period, a new run starts every third tick
    assert!(counters.started() >= 2);
}

// ============================================================================
// Manual Trigger
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_manual_trigger_runs_immediately_when_idle() {
    let (scheduler, counters) = build(ProbeJob::instant(), PERIOD);
    scheduler.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    scheduler.trigger_now().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(counters.completed(), 1);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_trigger_busy_while_run_in_flight() {
    let (scheduler, _counters) = build(
        ProbeJob::with_delay(Duration::from_secs(10)),
        PERIOD,
    );
    scheduler.start().await.unwrap();

    scheduler.trigger_now().await.unwrap();
    assert!(scheduler.is_busy());

    // Second trigger within the run is rejected, not queued
    assert_eq!(scheduler.trigger_now().await, Err(SchedulerError::Busy));

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(!scheduler.is_busy());
    scheduler.trigger_now().await.unwrap();

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_trigger_does_not_shift_schedule() {
    let (scheduler, counters) = build(ProbeJob::instant(), PERIOD);
    scheduler.start().await.unwrap();

    // Manual trigger at t = 1h/2 runs immediately
    tokio::time::sleep(PERIOD / 2).await;
    scheduler.trigger_now().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(counters.completed(), 1);

    // The scheduled firing still lands at t = 1 period, not 1.5
    tokio::time::sleep(PERIOD / 2).await;
    assert_eq!(counters.completed(), 2);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_exactly_one_run_for_double_trigger() {
    let (scheduler, counters) = build(
        ProbeJob::with_delay(Duration::from_secs(10)),
        PERIOD,
    );
    scheduler.start().await.unwrap();

    let first = scheduler.trigger_now().await;
    let second = scheduler.trigger_now().await;

    assert!(first.is_ok());
    assert_eq!(second, Err(SchedulerError::Busy));

    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(counters.started(), 1, "a rejected trigger still ran");

    scheduler.stop().await;
}

// ============================================================================
// Failure Handling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_run_keeps_schedule_alive() {
    let (scheduler, counters) = build(ProbeJob::failing(), PERIOD);
    scheduler.start().await.unwrap();

    tokio::time::sleep(PERIOD * 3 + Duration::from_secs(5)).await;

    // Every firing ran and failed; the schedule never stopped
    assert_eq!(counters.started(), 3);
    assert_eq!(counters.completed(), 0);

    let status = scheduler.status().await;
    assert!(status.running);
    assert_eq!(status.runs_failed, 3);

    scheduler.stop().await;
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_no_run_starts_after_stop_returns() {
    let (scheduler, counters) = build(ProbeJob::instant(), PERIOD);
    scheduler.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    scheduler.stop().await;

    // Long after every would-be firing, nothing has run
    tokio::time::sleep(PERIOD * 5).await;
    assert_eq!(counters.started(), 0);
    assert!(!scheduler.is_running().await);
}

#[tokio::test(start_paused = true)]
async fn test_stop_waits_for_in_flight_run() {
    let (scheduler, counters) = build(
        ProbeJob::with_delay(Duration::from_secs(5)),
        PERIOD,
    );
    scheduler.start().await.unwrap();

    scheduler.trigger_now().await.unwrap();
    scheduler.stop().await;

    // The run finished within the grace period before stop returned
    assert_eq!(counters.completed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_abandons_run_after_grace_period() {
    let period = Duration::from_secs(3600);
    let grace = Duration::from_secs(10);
    let job = ProbeJob::with_delay(Duration::from_secs(300));
    let counters = job.counters();
    let scheduler =
        TaskScheduler::new(Arc::new(job), scheduler_config(period, grace)).expect("valid config");

    scheduler.start().await.unwrap();
    scheduler.trigger_now().await.unwrap();

    let before = tokio::time::Instant::now();
    scheduler.stop().await;
    let waited = before.elapsed();

    // Stop gave up at the grace boundary, not after the full 300 s run
    assert!(waited >= grace);
    assert!(waited < Duration::from_secs(300));
    assert_eq!(counters.completed(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_trigger_after_stop_is_rejected() {
    let (scheduler, _counters) = build(ProbeJob::instant(), PERIOD);
    scheduler.start().await.unwrap();
    scheduler.stop().await;

    assert_eq!(
        scheduler.trigger_now().await,
        Err(SchedulerError::NotRunning)
    );
}
