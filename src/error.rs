//! Unified error handling for the trialscope crate
//!
//! Domain-specific errors live with their modules ([`MigrationError`],
//! [`IngestError`], [`SchedulerError`]); this module consolidates them into
//! a single [`Error`] enum for use across module boundaries and classifies
//! them for handling strategy: fatal startup errors abort the process,
//! recoverable background errors are logged and retried on the next
//! scheduled firing.

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::db::MigrationError;
pub use crate::ingest::IngestError;
pub use crate::scheduler::SchedulerError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout)
    Network,
    /// Storage and database errors
    Storage,
    /// Schema migration errors (fatal at startup)
    Migration,
    /// Scheduler and background-task errors
    Scheduler,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the trialscope crate
#[derive(Error, Debug)]
pub enum Error {
    /// Schema migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    /// Ingestion errors
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Scheduler errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[source] tokio_postgres::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Check if this error is recoverable (safe to retry later)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Migration(_) => false,
            Self::Ingest(e) => e.is_recoverable(),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Database(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Http(_) => true,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Migration(_) => ErrorCategory::Migration,
            Self::Ingest(e) => e.category(),
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Database(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Http(_) => ErrorCategory::Network,
            Self::Json(_) => ErrorCategory::Other,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

// Conversion from tokio_postgres::Error
impl From<tokio_postgres::Error> for Error {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Database(err)
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_error_is_fatal() {
        let err = Error::Migration(MigrationError::EmptyDatabaseUrl);
        assert_eq!(err.category(), ErrorCategory::Migration);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_scheduler_busy_is_recoverable() {
        let err = Error::Scheduler(SchedulerError::Busy);
        assert_eq!(err.category(), ErrorCategory::Scheduler);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("missing database url");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let ingest_err = IngestError::EmptyResponse;
        let unified: Error = ingest_err.into();
        assert!(matches!(unified, Error::Ingest(_)));
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
    }
}
