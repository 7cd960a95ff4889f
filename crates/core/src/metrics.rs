//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Task registry (creations)
//! - Orchestrator runs (starts, outcomes, in-flight runs, phase durations)

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Registry holding every core metric.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for metric in all_metrics() {
        registry.register(metric).unwrap();
    }
    registry
});

// =============================================================================
// Tasks
// =============================================================================

/// Tasks created.
pub static TASKS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("segfetch_tasks_created_total", "Total tasks created").unwrap()
});

// =============================================================================
// Runs
// =============================================================================

/// Run attempts dispatched.
pub static RUNS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("segfetch_runs_started_total", "Total run attempts started").unwrap()
});

/// Run attempts finished by outcome.
pub static RUNS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("segfetch_runs_finished_total", "Total run attempts finished"),
        &["outcome"], // "completed" or a failure kind
    )
    .unwrap()
});

/// Runs currently in flight.
pub static RUNS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("segfetch_runs_active", "Run attempts currently in flight").unwrap()
});

/// Duration of each phase in seconds.
pub static PHASE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "segfetch_phase_duration_seconds",
            "Duration of fetch and transcode phases",
        )
        .buckets(vec![
            1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 10800.0,
        ]),
        &["phase", "result"], // phase: "fetch", "transcode"; result: "success", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(TASKS_CREATED.clone()),
        Box::new(RUNS_STARTED.clone()),
        Box::new(RUNS_FINISHED.clone()),
        Box::new(RUNS_ACTIVE.clone()),
        Box::new(PHASE_DURATION.clone()),
    ]
}

/// Encode all metrics as Prometheus text format.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_text_contains_core_metrics() {
        TASKS_CREATED.inc();
        RUNS_FINISHED.with_label_values(&["completed"]).inc();
        let text = gather_text();
        assert!(text.contains("segfetch_tasks_created_total"));
        assert!(text.contains("segfetch_runs_finished_total{outcome=\"completed\"}"));
    }
}
