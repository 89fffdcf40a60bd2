//! trialscope - Clinical Trial Explorer Backend
//!
//! A web application backend that browses and administers clinical-trial
//! records, periodically re-ingesting them from the public trial registry.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and types
//! - [`db`] - Connection pool, trial repository, and schema migrations
//! - [`ingest`] - Registry client and the recurring ingestion job
//! - [`scheduler`] - Recurring-task scheduling with non-overlap guarantees
//! - [`web`] - HTTP surface: API, static assets, SPA fallback
//! - [`lifecycle`] - Service state machine and startup/shutdown sequencing
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use trialscope::config::Settings;
//! use trialscope::lifecycle::Lifecycle;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_env()?;
//!     let lifecycle = Lifecycle::new(settings);
//!     lifecycle.run().await
//! }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod lifecycle;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod utils;
pub mod web;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Environment, Settings};
    pub use crate::db::{Database, MigrationError, TrialStore};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::lifecycle::{Lifecycle, ServiceState};
    pub use crate::models::{ClinicalTrial, IngestStats, ReviewStatus, TrialFilter};
    pub use crate::scheduler::{ScheduledJob, SchedulerError, TaskScheduler};
}

// Direct re-exports for convenience
pub use models::{ClinicalTrial, IngestStats, ReviewStatus};
