//! Telemetry module for the serving core.
//!
//! Structured logging, request spans and metrics emitted through the
//! `metrics` facade. The core installs no exporter of its own.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    init_metrics, record_registered_registries, record_resolve_outcome, record_resolve_wait,
    record_sessions_evicted, record_sweep_failure,
};
pub use spans::{ResolveSpan, SpanExt};
