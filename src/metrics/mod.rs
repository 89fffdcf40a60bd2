//! Prometheus metrics for the trialscope service
//!
//! This module provides metrics tracking for:
//! - Ingestion: run outcomes, in-flight flag, trials upserted
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Encoder, Gauge,
    TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all service metrics
struct ServiceMetrics {
    ingest_runs: CounterVec,
    ingest_in_flight: Gauge,
    trials_upserted: Counter,
}

/// Global storage for service metrics
static SERVICE_METRICS: OnceLock<ServiceMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup. If metric
/// registration fails, errors are surfaced to the caller and subsequent
/// metric operations become no-ops; the service keeps running.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = ServiceMetrics {
        ingest_runs: register_counter_vec!(
            "trialscope_ingest_runs_total",
            "Completed ingestion runs by outcome",
            &["outcome"]
        )?,
        ingest_in_flight: register_gauge!(
            "trialscope_ingest_in_flight",
            "1 while an ingestion run is executing"
        )?,
        trials_upserted: register_counter!(
            "trialscope_trials_upserted_total",
            "Trial records inserted or refreshed by ingestion"
        )?,
    };

    SERVICE_METRICS.set(metrics).ok();
    Ok(())
}

// ============================================================================
// Recording
// ============================================================================

/// Record a completed ingestion run ("success" or "failure")
pub fn record_ingest_run(outcome: &str) {
    if let Some(metrics) = SERVICE_METRICS.get() {
        metrics.ingest_runs.with_label_values(&[outcome]).inc();
    }
}

/// Mark whether an ingestion run is currently executing
pub fn set_ingest_in_flight(in_flight: bool) {
    if let Some(metrics) = SERVICE_METRICS.get() {
        metrics
            .ingest_in_flight
            .set(if in_flight { 1.0 } else { 0.0 });
    }
}

/// Record trials inserted or refreshed by a run
pub fn record_trials_upserted(count: u64) {
    if let Some(metrics) = SERVICE_METRICS.get() {
        metrics.trials_upserted.inc_by(count as f64);
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Render the default registry in the Prometheus text exposition format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_init_is_noop() {
        // Must not panic when metrics were never registered
        record_ingest_run("success");
        set_ingest_in_flight(true);
        record_trials_upserted(42);
    }

    #[test]
    fn test_init_and_render() {
        init_metrics().unwrap();
        // Second call is a no-op
        init_metrics().unwrap();

        record_ingest_run("success");
        let output = render();
        assert!(output.contains("trialscope_ingest_runs_total"));
    }
}
