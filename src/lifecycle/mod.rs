//! Service lifecycle management
//!
//! Sequences startup and shutdown on all exit paths:
//!
//! ```text
//! STARTING ──migrations ok──▶ SERVING ──stop signal──▶ STOPPING ──▶ STOPPED
//!     │
//!     └──migrations failed──────────────────────────────────────▶ STOPPED
//! ```
//!
//! Startup order is strict: migrations complete before the connection pool
//! is created, the scheduler is armed before the listener opens (so the
//! debug trigger endpoint is never reachable with inconsistent scheduling
//! state), and only then does the service accept traffic. Shutdown reverses
//! it: the listener closes first, then the scheduler stops and is awaited,
//! then the pool is released. Transitions are one-directional; no state is
//! revisited.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::Settings;
use crate::db::{self, Database, TrialStore};
use crate::ingest::{RegistryClient, RegistryIngestion};
use crate::scheduler::{SchedulerConfig, TaskScheduler};
use crate::web::{AppServer, AppState, AssetResolver};

/// Service lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Starting,
    Serving,
    Stopping,
    Stopped,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Serving => "serving",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }

    /// True for the terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Whether `next` is a legal transition from this state.
    ///
    /// The machine only moves forward; a migration failure jumps straight
    /// from starting to stopped.
    pub fn can_transition_to(&self, next: ServiceState) -> bool {
        matches!(
            (self, next),
            (Self::Starting, Self::Serving)
                | (Self::Starting, Self::Stopped)
                | (Self::Serving, Self::Stopping)
                | (Self::Stopping, Self::Stopped)
        )
    }
}

/// Owns the service state machine and runs the full serve lifecycle
pub struct Lifecycle {
    settings: Arc<Settings>,
    state_tx: watch::Sender<ServiceState>,
}

impl Lifecycle {
    pub fn new(settings: Settings) -> Self {
        let (state_tx, _) = watch::channel(ServiceState::Starting);
        Self {
            settings: Arc::new(settings),
            state_tx,
        }
    }

    /// Subscribe to lifecycle state changes
    pub fn state(&self) -> watch::Receiver<ServiceState> {
        self.state_tx.subscribe()
    }

    /// Current lifecycle state
    pub fn current_state(&self) -> ServiceState {
        *self.state_tx.borrow()
    }

    /// Run the service until a termination signal arrives.
    ///
    /// Any startup failure aborts before the listener opens and leaves the
    /// machine in the stopped state; the caller exits non-zero.
    pub async fn run(&self) -> Result<()> {
        self.run_with_shutdown(shutdown_signal()).await
    }

    /// Run the service with a caller-provided shutdown future
    pub async fn run_with_shutdown(
        &self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let settings = self.settings.clone();

        if let Err(e) = crate::metrics::init_metrics() {
            tracing::warn!(error = %e, "Metrics initialization failed; continuing without metrics");
        }

        // Migrations run to completion before anything else starts
        let report = match db::apply_migrations(&settings.database.url).await {
            Ok(report) => report,
            Err(e) => {
                self.transition(ServiceState::Stopped);
                return Err(e).context("Schema migration failed; aborting startup");
            }
        };
        tracing::info!(
            applied = report.applied,
            version = report.current_version,
            "Database schema ready"
        );

        // Pool creation only after the schema is current
        let database = Database::connect(&settings.database)?;
        let store = TrialStore::new(&database);

        // Arm the scheduler before the listener opens
        let client = RegistryClient::new(&settings.registry)?;
        let job = Arc::new(RegistryIngestion::new(client, store.clone()));
        let scheduler = Arc::new(TaskScheduler::new(
            job,
            SchedulerConfig {
                period: settings.ingest_period(),
                shutdown_grace: settings.shutdown_grace(),
            },
        )?);

        if let Err(e) = scheduler.start().await {
            self.transition(ServiceState::Stopped);
            database.close();
            return Err(e).context("Failed to arm ingestion scheduler");
        }

        let assets = Arc::new(AssetResolver::locate(
            settings.server.static_dir.as_deref(),
        ));
        let state = AppState::new(store, scheduler.clone(), assets, self.state_tx.subscribe());
        let server = AppServer::new(&settings, state);

        self.transition(ServiceState::Serving);
        let serve_result = server.serve_with_shutdown(shutdown).await;

        // The listener is closed once serve returns; stop the scheduler,
        // then release the pool
        self.transition(ServiceState::Stopping);
        scheduler.stop().await;
        database.close();
        self.transition(ServiceState::Stopped);

        serve_result.context("HTTP server failed")?;
        tracing::info!("Service stopped cleanly");
        Ok(())
    }

    /// Advance the state machine, refusing illegal transitions
    fn transition(&self, next: ServiceState) {
        let current = *self.state_tx.borrow();
        if current == next {
            return;
        }

        if !current.can_transition_to(next) {
            tracing::warn!(
                from = current.as_str(),
                to = next.as_str(),
                "Refusing illegal lifecycle transition"
            );
            return;
        }

        tracing::info!(from = current.as_str(), to = next.as_str(), "Lifecycle transition");
        let _ = self.state_tx.send(next);
    }
}

/// Resolve when the process receives a termination signal
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
}
