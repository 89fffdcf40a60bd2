//! Common test utilities
//!
//! Not every test binary uses every helper.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use trialscope::config::Settings;
use trialscope::db::{Database, TrialStore};
use trialscope::lifecycle::ServiceState;
use trialscope::scheduler::{ScheduledJob, SchedulerConfig, TaskScheduler};
use trialscope::web::{AppState, AssetResolver};

/// A job that counts invocations, optionally sleeping and failing.
///
/// Tracks the number of concurrently executing runs so tests can assert
/// the non-overlap guarantee directly.
pub struct ProbeJob {
    pub delay: Duration,
    pub fail: bool,
    started: Arc<AtomicU32>,
    completed: Arc<AtomicU32>,
    in_flight: Arc<AtomicU32>,
    max_in_flight: Arc<AtomicU32>,
}

impl ProbeJob {
    pub fn instant() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            fail: false,
            started: Arc::new(AtomicU32::new(0)),
            completed: Arc::new(AtomicU32::new(0)),
            in_flight: Arc::new(AtomicU32::new(0)),
            max_in_flight: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::instant()
        }
    }

    /// Counters survive the job being moved into the scheduler
    pub fn counters(&self) -> ProbeCounters {
        ProbeCounters {
            started: self.started.clone(),
            completed: self.completed.clone(),
            max_in_flight: self.max_in_flight.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ProbeCounters {
    started: Arc<AtomicU32>,
    completed: Arc<AtomicU32>,
    max_in_flight: Arc<AtomicU32>,
}

impl ProbeCounters {
    pub fn started(&self) -> u32 {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u32 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScheduledJob for ProbeJob {
    fn name(&self) -> &'static str {
        "probe"
    }

    async fn run(&self) -> anyhow::Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            anyhow::bail!("probe job failure");
        }

        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Scheduler config with a short period for paused-time tests
#[allow(dead_code)]
pub fn scheduler_config(period: Duration, grace: Duration) -> SchedulerConfig {
    SchedulerConfig {
        period,
        shutdown_grace: grace,
    }
}

/// Application state wired to a scheduler and asset resolver, with a lazy
/// pool that never connects (handlers under test do not touch the store)
#[allow(dead_code)]
pub fn app_state(scheduler: Arc<TaskScheduler>, assets: AssetResolver) -> AppState {
    let settings = Settings::default();
    let database = Database::connect(&settings.database).expect("lazy pool");
    let store = TrialStore::new(&database);

    let (state_tx, state_rx) = watch::channel(ServiceState::Serving);
    // Receivers keep reporting the last value after the sender is gone
    drop(state_tx);

    AppState::new(store, scheduler, Arc::new(assets), state_rx)
}
