//! Metric names and recording helpers.

use std::sync::Once;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

static DESCRIBE: Once = Once::new();

/// Register metric descriptions. Safe to call more than once.
pub fn init_metrics() {
    DESCRIBE.call_once(|| {
        describe_counter!(
            "serving_core_resolve_total",
            "Model version resolutions by outcome"
        );
        describe_histogram!(
            "serving_core_resolve_wait_seconds",
            "Time a resolution spent waiting for a loading version"
        );
        describe_counter!(
            "serving_core_sweep_evicted_total",
            "Idle sessions evicted by the reaper"
        );
        describe_counter!(
            "serving_core_sweep_failures_total",
            "Idle session sweeps that reported an error"
        );
        describe_gauge!(
            "serving_core_registered_session_registries",
            "Session registries registered with the reaper"
        );
    });
}

/// Count one resolution. `outcome` is `"ok"` or a stable error code.
pub fn record_resolve_outcome(model: &str, outcome: &'static str) {
    counter!(
        "serving_core_resolve_total",
        "model" => model.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_resolve_wait(waited: Duration) {
    histogram!("serving_core_resolve_wait_seconds").record(waited.as_secs_f64());
}

pub fn record_sessions_evicted(evicted: usize) {
    if evicted > 0 {
        counter!("serving_core_sweep_evicted_total").increment(evicted as u64);
    }
}

pub fn record_sweep_failure() {
    counter!("serving_core_sweep_failures_total").increment(1);
}

pub fn record_registered_registries(count: usize) {
    gauge!("serving_core_registered_session_registries").set(count as f64);
}
