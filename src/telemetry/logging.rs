//! Logging configuration and initialization.
//!
//! JSON (production) or pretty (development) output through
//! `tracing-subscriber`, filtered by an `EnvFilter` directive string.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(LogError::UnknownFormat(other.to_string())),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Filter directives, e.g. `"info"` or `"serving_core=debug"`.
    pub level: String,
    /// Log file. Logs go to stderr when unset.
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
            output_path: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Unknown log format: {0}")]
    UnknownFormat(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Install the global tracing subscriber. Call once at startup.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter =
        EnvFilter::try_new(&config.level).map_err(|e| LogError::InvalidFilter(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);
    match (config.format, &config.output_path) {
        (LogFormat::Json, Some(path)) => {
            let file = open_log_file(path)?;
            registry
                .with(fmt::layer().json().with_writer(std::sync::Mutex::new(file)))
                .try_init()
        }
        (LogFormat::Json, None) => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        (LogFormat::Pretty, Some(path)) => {
            let file = open_log_file(path)?;
            registry
                .with(
                    fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .try_init()
        }
        (LogFormat::Pretty, None) => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
    }
    .map_err(|_| LogError::AlreadyInitialized)
}

fn open_log_file(path: &PathBuf) -> Result<std::fs::File, LogError> {
    std::fs::File::create(path).map_err(|e| LogError::FileOpen(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(LogError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let config = LogConfig {
            level: "serving_core=notalevel".to_string(),
            ..Default::default()
        };
        assert!(matches!(init_logging(&config), Err(LogError::InvalidFilter(_))));
    }
}
