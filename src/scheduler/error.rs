//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// A run is already in flight; manual triggers are rejected, not queued
    Busy,

    /// The scheduler has not been started, or has been stopped
    NotRunning,

    /// `start` was called on an already running scheduler
    AlreadyRunning,

    /// The configured period is not usable
    InvalidPeriod { reason: String },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => {
                write!(f, "an ingestion run is already in flight")
            }
            Self::NotRunning => {
                write!(f, "scheduler is not running")
            }
            Self::AlreadyRunning => {
                write!(f, "scheduler is already running")
            }
            Self::InvalidPeriod { reason } => {
                write!(f, "invalid scheduler period: {}", reason)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Check if the error is recoverable (the caller may retry later)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Busy | Self::NotRunning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_is_recoverable() {
        assert!(SchedulerError::Busy.is_recoverable());
        assert!(SchedulerError::NotRunning.is_recoverable());
        assert!(!SchedulerError::AlreadyRunning.is_recoverable());
    }

    #[test]
    fn test_display() {
        assert!(SchedulerError::Busy.to_string().contains("in flight"));
        let err = SchedulerError::InvalidPeriod {
            reason: String::from("zero"),
        };
        assert!(err.to_string().contains("zero"));
    }
}
