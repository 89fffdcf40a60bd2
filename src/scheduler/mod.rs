//! Recurring ingestion scheduling
//!
//! This module provides the recurring-task scheduler that drives periodic
//! trial ingestion. It owns a single repeating timer and guarantees:
//!
//! - **No immediate fire**: the first run happens one full period after
//!   [`TaskScheduler::start`], matching a "runs every N hours" cadence.
//! - **No overlapping runs**: a firing that arrives while a run is still in
//!   flight is skipped, never queued, so a slow or stuck job cannot build
//!   an unbounded backlog.
//! - **Non-blocking manual triggers**: [`TaskScheduler::trigger_now`] runs
//!   the job immediately when idle and is rejected with
//!   [`SchedulerError::Busy`] when a run is in flight. Manual runs do not
//!   shift the regular timer's next fire.
//! - **Deterministic shutdown**: once [`TaskScheduler::stop`] returns, no
//!   new run can start. An in-flight run is awaited up to the shutdown
//!   grace period, then aborted with a warning.
//!
//! A failed run is logged and leaves the schedule intact; the next firing
//! is the retry.

pub mod error;

pub use error::{SchedulerError, SchedulerResult};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

// ============================================================================
// Job Abstraction
// ============================================================================

/// A unit of work the scheduler fires on a fixed period.
///
/// Implementations must be safe to re-run: the scheduler retries failed
/// runs on the next firing, and manual triggers may interleave with the
/// schedule.
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    /// Short identifier used in logs and metrics
    fn name(&self) -> &'static str;

    /// Execute one run
    async fn run(&self) -> anyhow::Result<()>;
}

// ============================================================================
// Scheduler Configuration
// ============================================================================

/// Configuration for the recurring scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between scheduled firings
    pub period: Duration,

    /// How long `stop` waits for an in-flight run before abandoning it
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(24 * 3600),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl SchedulerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.period.is_zero() {
            return Err(SchedulerError::InvalidPeriod {
                reason: String::from("period must be greater than zero"),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Task Scheduler
// ============================================================================

/// Recurring-task scheduler with non-overlap and graceful-stop guarantees.
///
/// Owned by the lifecycle manager; request handlers reach it only through
/// the handle placed in the application state at construction time.
pub struct TaskScheduler {
    config: SchedulerConfig,
    job: Arc<dyn ScheduledJob>,

    /// Single permit: whoever holds it is the one run in flight
    inflight: Arc<Semaphore>,

    /// Handle of the most recently spawned run, for abort on ungraceful stop
    current_run: Arc<Mutex<Option<JoinHandle<()>>>>,

    shutdown_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,

    runs_completed: Arc<AtomicU64>,
    runs_failed: Arc<AtomicU64>,
    runs_skipped: Arc<AtomicU64>,
}

impl TaskScheduler {
    /// Create a scheduler for the given job
    pub fn new(job: Arc<dyn ScheduledJob>, config: SchedulerConfig) -> SchedulerResult<Self> {
        config.validate()?;

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            job,
            inflight: Arc::new(Semaphore::new(1)),
            current_run: Arc::new(Mutex::new(None)),
            shutdown_tx,
            worker: Mutex::new(None),
            runs_completed: Arc::new(AtomicU64::new(0)),
            runs_failed: Arc::new(AtomicU64::new(0)),
            runs_skipped: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Create with default config (24 h period, 30 s grace)
    pub fn with_defaults(job: Arc<dyn ScheduledJob>) -> SchedulerResult<Self> {
        Self::new(job, SchedulerConfig::default())
    }

    /// Begin firing the job every period, starting one period from now
    pub async fn start(&self) -> SchedulerResult<()> {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let _ = self.shutdown_tx.send(false);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let job = self.job.clone();
        let inflight = self.inflight.clone();
        let current_run = self.current_run.clone();
        let completed = self.runs_completed.clone();
        let failed = self.runs_failed.clone();
        let skipped = self.runs_skipped.clone();
        let period = self.config.period;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.changed() => {
                        break;
                    }

                    _ = ticker.tick() => {
                        match inflight.clone().try_acquire_owned() {
                            Ok(permit) => {
                                let run = spawn_run(
                                    job.clone(),
                                    permit,
                                    completed.clone(),
                                    failed.clone(),
                                );
                                *current_run.lock().await = Some(run);
                            }
                            Err(_) => {
                                skipped.fetch_add(1, Ordering::Relaxed);
                                tracing::warn!(
                                    job = job.name(),
                                    "Skipping scheduled firing: previous run still in flight"
                                );
                            }
                        }
                    }
                }
            }
        });

        *worker = Some(handle);
        tracing::info!(
            job = self.job.name(),
            period_secs = self.config.period.as_secs(),
            "Scheduler armed"
        );

        Ok(())
    }

    /// Run the job immediately, out of band.
    ///
    /// Returns [`SchedulerError::Busy`] when a run (scheduled or manual) is
    /// already in flight. Does not reset or shift the regular timer. The
    /// run executes in the background; this call returns as soon as it is
    /// started.
    pub async fn trigger_now(&self) -> SchedulerResult<()> {
        if self.worker.lock().await.is_none() || *self.shutdown_tx.borrow() {
            return Err(SchedulerError::NotRunning);
        }

        let permit = self
            .inflight
            .clone()
            .try_acquire_owned()
            .map_err(|_| SchedulerError::Busy)?;

        tracing::info!(job = self.job.name(), "Manual trigger accepted");
        let run = spawn_run(
            self.job.clone(),
            permit,
            self.runs_completed.clone(),
            self.runs_failed.clone(),
        );
        *self.current_run.lock().await = Some(run);

        Ok(())
    }

    /// Halt future firings and wait for any in-flight run.
    ///
    /// Waits up to the configured shutdown grace period; on timeout the run
    /// is aborted and a warning is logged. After this returns no new run
    /// can ever start.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);

        if let Some(worker) = self.worker.lock().await.take() {
            // The loop exits on the shutdown signal without awaiting runs
            let _ = worker.await;
        }

        match tokio::time::timeout(self.config.shutdown_grace, self.inflight.acquire()).await {
            Ok(Ok(_permit)) => {
                tracing::info!(job = self.job.name(), "Scheduler stopped");
            }
            Ok(Err(_)) => {}
            Err(_) => {
                tracing::warn!(
                    job = self.job.name(),
                    grace_secs = self.config.shutdown_grace.as_secs(),
                    "Ungraceful ingestion shutdown: abandoning in-flight run"
                );
                if let Some(run) = self.current_run.lock().await.take() {
                    run.abort();
                }
            }
        }
    }

    /// True while a run (scheduled or manual) is in flight
    pub fn is_busy(&self) -> bool {
        self.inflight.available_permits() == 0
    }

    /// True between `start` and `stop`
    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.is_some() && !*self.shutdown_tx.borrow()
    }

    /// Snapshot of scheduler state for health/stats reporting
    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.is_running().await,
            busy: self.is_busy(),
            period_secs: self.config.period.as_secs(),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_skipped: self.runs_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Execute one run on its own task, holding the in-flight permit
fn spawn_run(
    job: Arc<dyn ScheduledJob>,
    permit: tokio::sync::OwnedSemaphorePermit,
    completed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let _permit = permit;
        crate::metrics::set_ingest_in_flight(true);

        match job.run().await {
            Ok(()) => {
                completed.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_ingest_run("success");
            }
            Err(e) => {
                failed.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_ingest_run("failure");
                tracing::error!(job = job.name(), error = %e, "Run failed; next firing will retry");
            }
        }

        crate::metrics::set_ingest_in_flight(false);
    })
}

/// Scheduler state snapshot
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub busy: bool,
    pub period_secs: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub runs_skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopJob;

    #[async_trait]
    impl ScheduledJob for NoopJob {
        fn name(&self) -> &'static str {
            "noop"
        }

        async fn run(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_config_validation() {
        let config = SchedulerConfig {
            period: Duration::ZERO,
            shutdown_grace: Duration::from_secs(1),
        };
        assert!(config.validate().is_err());
        assert!(SchedulerConfig::default().validate().is_ok());
    }

    #[tokio::test]
    async fn test_scheduler_creation_is_idle() {
        let scheduler = TaskScheduler::with_defaults(Arc::new(NoopJob)).unwrap();
        assert!(!scheduler.is_running().await);
        assert!(!scheduler.is_busy());
    }

    #[tokio::test]
    async fn test_trigger_before_start_rejected() {
        let scheduler = TaskScheduler::with_defaults(Arc::new(NoopJob)).unwrap();
        assert_eq!(
            scheduler.trigger_now().await,
            Err(SchedulerError::NotRunning)
        );
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let scheduler = TaskScheduler::with_defaults(Arc::new(NoopJob)).unwrap();
        scheduler.start().await.unwrap();
        assert_eq!(scheduler.start().await, Err(SchedulerError::AlreadyRunning));
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let scheduler = TaskScheduler::with_defaults(Arc::new(NoopJob)).unwrap();
        let status = scheduler.status().await;
        assert!(!status.running);
        assert_eq!(status.runs_completed, 0);
        assert_eq!(status.period_secs, 24 * 3600);
    }
}
