//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod retry;

pub use retry::{with_retry_if, RetryConfig};

/// Truncate a string for log output, appending an ellipsis when cut
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}...")
}
