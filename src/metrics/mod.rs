//! Prometheus metrics for trigger invocations and the HTTP surface
//!
//! This module tracks:
//! - Invocations: result per trigger, failure kinds, publish latency per tenant
//! - Maintenance: stale records swept, expired locks pruned
//! - HTTP: requests and latency per endpoint
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Orchestrator metrics
struct TriggerMetrics {
    invocations: CounterVec,
    failures: CounterVec,
    publish_duration: HistogramVec,
    system_enabled: Gauge,
    stale_swept: Counter,
    locks_pruned: Counter,
}

/// HTTP server metrics
struct ApiMetrics {
    requests: CounterVec,
    duration: HistogramVec,
}

static TRIGGER_METRICS: OnceLock<TriggerMetrics> = OnceLock::new();

static API_METRICS: OnceLock<ApiMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Register all metrics with the default registry.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let trigger = TriggerMetrics {
        invocations: register_counter_vec!(
            "slotcast_trigger_invocations_total",
            "Trigger invocations by result (published, failed, skipped) and reason",
            &["result", "reason"]
        )?,
        failures: register_counter_vec!(
            "slotcast_trigger_failures_total",
            "Failed slot executions by error kind",
            &["kind"]
        )?,
        publish_duration: register_histogram_vec!(
            "slotcast_publish_duration_seconds",
            "Time from content selection to recorded outcome",
            &["tenant"],
            vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]
        )?,
        system_enabled: register_gauge!(
            "slotcast_system_enabled",
            "Kill switch state observed by the last invocation (1 = enabled)"
        )?,
        stale_swept: register_counter!(
            "slotcast_stale_records_swept_total",
            "Running slot records failed by the stale sweep"
        )?,
        locks_pruned: register_counter!(
            "slotcast_locks_pruned_total",
            "Expired locks deleted by the sweep"
        )?,
    };

    let api = ApiMetrics {
        requests: register_counter_vec!(
            "slotcast_api_requests_total",
            "Total API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
        duration: register_histogram_vec!(
            "slotcast_api_request_duration_seconds",
            "API request duration in seconds",
            &["endpoint"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
        )?,
    };

    TRIGGER_METRICS
        .set(trigger)
        .map_err(|_| "Trigger metrics already initialized")?;
    API_METRICS
        .set(api)
        .map_err(|_| "API metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    TRIGGER_METRICS.get().is_some() && API_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Count one trigger invocation; `reason` is the skip reason, the error kind or `published`
pub fn record_invocation(result: &str, reason: &str) {
    if let Some(m) = TRIGGER_METRICS.get() {
        m.invocations.with_label_values(&[result, reason]).inc();
    }
}

/// Count a failed execution by its error code
pub fn record_failure(kind: &str) {
    if let Some(m) = TRIGGER_METRICS.get() {
        m.failures.with_label_values(&[kind]).inc();
    }
}

/// Observe a publish attempt's duration
pub fn record_publish_duration(tenant: &str, duration_secs: f64) {
    if let Some(m) = TRIGGER_METRICS.get() {
        m.publish_duration
            .with_label_values(&[tenant])
            .observe(duration_secs);
    }
}

pub fn set_system_enabled(enabled: bool) {
    if let Some(m) = TRIGGER_METRICS.get() {
        m.system_enabled.set(if enabled { 1.0 } else { 0.0 });
    }
}

/// Record sweep results
pub fn record_sweep(stale_records: usize, pruned_locks: usize) {
    let Some(m) = TRIGGER_METRICS.get() else {
        return;
    };

    if stale_records > 0 {
        m.stale_swept.inc_by(stale_records as f64);
    }
    if pruned_locks > 0 {
        m.locks_pruned.inc_by(pruned_locks as f64);
    }
}

/// Record API request
pub fn record_api_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = API_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.requests
        .with_label_values(&[endpoint, &status_str])
        .inc();
    m.duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
        assert!(metrics_initialized());
    }

    #[test]
    fn test_encode_contains_recorded_series() {
        ensure_metrics_initialized();
        record_invocation("skipped", "outside_window");
        record_failure("ERR_PUBLISH");

        let text = encode_metrics().unwrap();
        assert!(text.contains("slotcast_trigger_invocations_total"));
        assert!(text.contains("outside_window"));
        assert!(text.contains("ERR_PUBLISH"));
    }

    #[test]
    fn test_recorders_do_not_panic() {
        ensure_metrics_initialized();
        record_publish_duration("FP_1", 1.2);
        set_system_enabled(true);
        record_sweep(2, 3);
        record_sweep(0, 0);
        record_api_request("/api/trigger", 200, 0.4);
    }
}
