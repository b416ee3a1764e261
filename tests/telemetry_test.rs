//! Telemetry tests for the serving core.

use std::path::PathBuf;

use serving_core::telemetry::{
    init_logging, init_metrics, record_registered_registries, record_resolve_outcome,
    record_resolve_wait, record_sessions_evicted, record_sweep_failure, LogConfig, LogError,
    LogFormat, ResolveSpan, SpanExt,
};
use serving_core::ServingError;
use std::time::Duration;
use tracing::Span;

// =============================================================================
// LogConfig Tests
// =============================================================================

#[test]
fn log_config_default_is_json() {
    let config = LogConfig::default();
    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, "info");
    assert!(config.output_path.is_none());
}

#[test]
fn log_config_with_output_path() {
    let config = LogConfig {
        format: LogFormat::Pretty,
        level: "serving_core=debug".to_string(),
        output_path: Some(PathBuf::from("/tmp/serving-core.log")),
    };
    assert_eq!(config.format, LogFormat::Pretty);
    assert_eq!(config.output_path, Some(PathBuf::from("/tmp/serving-core.log")));
}

#[test]
fn log_format_parses_aliases() {
    assert_eq!(" JSON ".parse::<LogFormat>().unwrap(), LogFormat::Json);
    assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    let err = "yaml".parse::<LogFormat>().unwrap_err();
    assert!(err.to_string().contains("Unknown log format"));
}

// =============================================================================
// LogError Tests
// =============================================================================

#[test]
fn log_error_display() {
    let error = LogError::InvalidFilter("bad filter".to_string());
    assert!(error.to_string().contains("bad filter"));

    let error = LogError::FileOpen("permission denied".to_string());
    assert!(error.to_string().contains("Failed to open log file"));

    assert!(LogError::AlreadyInitialized
        .to_string()
        .contains("already initialized"));
}

#[test]
fn init_logging_rejects_unwritable_path() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogConfig {
        output_path: Some(dir.path().join("missing").join("core.log")),
        ..LogConfig::default()
    };
    assert!(matches!(init_logging(&config), Err(LogError::FileOpen(_))));
}

#[test]
fn init_logging_writes_json_to_file_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("core.log");
    let config = LogConfig {
        format: LogFormat::Json,
        level: "info".to_string(),
        output_path: Some(path.clone()),
    };

    init_logging(&config).unwrap();
    tracing::info!(model = "dummy", "telemetry smoke event");
    assert!(matches!(
        init_logging(&config),
        Err(LogError::AlreadyInitialized)
    ));

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("telemetry smoke event"));
    assert!(contents.contains("\"model\":\"dummy\""));
}

// =============================================================================
// Span Tests
// =============================================================================

#[test]
fn span_ext_record_result() {
    let span = Span::none();
    span.record_result(&Ok::<u64, ServingError>(1));
    span.record_result(&Err::<u64, _>(ServingError::ModelNameMissing {
        name: "dummy".to_string(),
    }));
}

#[test]
fn resolve_span_records_fields() {
    let span = ResolveSpan::new("dummy", 0);
    let _guard = span.enter();
    span.record("version", 3u64);
    span.record_result(&Err::<(), _>(ServingError::NoModelVersionAvailable(
        "dummy".to_string(),
    )));
}

// =============================================================================
// Metrics Tests
// =============================================================================

#[test]
fn metrics_init_is_idempotent() {
    init_metrics();
    init_metrics();
}

#[test]
fn record_helpers_without_recorder() {
    record_resolve_outcome("dummy", "ok");
    record_resolve_outcome("dummy", "MODEL_VERSION_NOT_LOADED_YET");
    record_resolve_wait(Duration::from_millis(12));
    record_resolve_wait(Duration::ZERO);
    record_sessions_evicted(0);
    record_sessions_evicted(7);
    record_sweep_failure();
    record_registered_registries(0);
    record_registered_registries(usize::MAX / 2);
}
