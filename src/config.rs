//! Serving core configuration loaded from environment variables.
//!
//! Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `SERVING_CORE_WAIT_FOR_MODEL_LOADED_TIMEOUT_MS` | 10000 | Max wait for a loading version (ms) |
//! | `SERVING_CORE_SEQUENCE_CLEANER_INTERVAL_MINUTES` | 5 | Session reaper interval (0 = disabled) |
//! | `SERVING_CORE_DRAIN_GRACE_PERIOD_MS` | 30000 | Max wait for in-flight requests on retire (ms) |
//! | `SERVING_CORE_SESSION_IDLE_TIMEOUT_SECS` | 300 | Idle time before a session is evicted |
//! | `SERVING_CORE_MAX_SESSIONS` | 500 | Max open sessions per stateful version |
//! | `SERVING_CORE_LOG_FORMAT` | json | `json` or `pretty` |
//! | `SERVING_CORE_LOG_LEVEL` | info | Log filter directives |

use std::time::Duration;

use serde::Serialize;

use crate::sessions::SessionRegistryConfig;
use crate::telemetry::{LogConfig, LogFormat};

pub const DEFAULT_WAIT_FOR_MODEL_LOADED_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SEQUENCE_CLEANER_INTERVAL_MINUTES: u32 = 5;
pub const DEFAULT_DRAIN_GRACE_PERIOD_MS: u64 = 30_000;

/// Serializable summary of effective values.
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub wait_for_model_loaded_timeout_ms: u64,
    pub sequence_cleaner_interval_minutes: u32,
    pub drain_grace_period_ms: u64,
    pub session_idle_timeout_secs: u64,
    pub max_sessions: usize,
    pub log_format: String,
    pub log_level: String,
}

/// All serving core configuration.
#[derive(Debug, Clone)]
pub struct ServingConfig {
    pub wait_for_model_loaded_timeout: Duration,
    /// 0 disables the session reaper.
    pub sequence_cleaner_interval_minutes: u32,
    pub drain_grace_period: Duration,
    pub sessions: SessionRegistryConfig,
    pub logging: LogConfig,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            wait_for_model_loaded_timeout: Duration::from_millis(
                DEFAULT_WAIT_FOR_MODEL_LOADED_TIMEOUT_MS,
            ),
            sequence_cleaner_interval_minutes: DEFAULT_SEQUENCE_CLEANER_INTERVAL_MINUTES,
            drain_grace_period: Duration::from_millis(DEFAULT_DRAIN_GRACE_PERIOD_MS),
            sessions: SessionRegistryConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Load configuration from `SERVING_CORE_*` environment variables.
pub fn load() -> ServingConfig {
    let wait_ms = parse_env(
        "SERVING_CORE_WAIT_FOR_MODEL_LOADED_TIMEOUT_MS",
        DEFAULT_WAIT_FOR_MODEL_LOADED_TIMEOUT_MS,
    );
    let wait_ms = wait_ms.max(1);
    let interval = parse_env(
        "SERVING_CORE_SEQUENCE_CLEANER_INTERVAL_MINUTES",
        DEFAULT_SEQUENCE_CLEANER_INTERVAL_MINUTES,
    );
    let drain_ms = parse_env("SERVING_CORE_DRAIN_GRACE_PERIOD_MS", DEFAULT_DRAIN_GRACE_PERIOD_MS);
    let idle_secs = parse_env("SERVING_CORE_SESSION_IDLE_TIMEOUT_SECS", 300u64).max(1);
    let max_sessions = parse_env("SERVING_CORE_MAX_SESSIONS", 500usize).max(1);

    let format = parse_env("SERVING_CORE_LOG_FORMAT", LogFormat::Json);
    let level = std::env::var("SERVING_CORE_LOG_LEVEL")
        .ok()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());

    ServingConfig {
        wait_for_model_loaded_timeout: Duration::from_millis(wait_ms),
        sequence_cleaner_interval_minutes: interval,
        drain_grace_period: Duration::from_millis(drain_ms),
        sessions: SessionRegistryConfig {
            idle_timeout: Duration::from_secs(idle_secs),
            max_sessions,
        },
        logging: LogConfig {
            format,
            level,
            output_path: None,
        },
    }
}

impl ServingConfig {
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            wait_for_model_loaded_timeout_ms: self.wait_for_model_loaded_timeout.as_millis() as u64,
            sequence_cleaner_interval_minutes: self.sequence_cleaner_interval_minutes,
            drain_grace_period_ms: self.drain_grace_period.as_millis() as u64,
            session_idle_timeout_secs: self.sessions.idle_timeout.as_secs(),
            max_sessions: self.sessions.max_sessions,
            log_format: match self.logging.format {
                LogFormat::Json => "json".to_string(),
                LogFormat::Pretty => "pretty".to_string(),
            },
            log_level: self.logging.level.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "SERVING_CORE_WAIT_FOR_MODEL_LOADED_TIMEOUT_MS",
        "SERVING_CORE_SEQUENCE_CLEANER_INTERVAL_MINUTES",
        "SERVING_CORE_DRAIN_GRACE_PERIOD_MS",
        "SERVING_CORE_SESSION_IDLE_TIMEOUT_SECS",
        "SERVING_CORE_MAX_SESSIONS",
        "SERVING_CORE_LOG_FORMAT",
        "SERVING_CORE_LOG_LEVEL",
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg.wait_for_model_loaded_timeout, Duration::from_secs(10));
        assert_eq!(cfg.sequence_cleaner_interval_minutes, 5);
        assert_eq!(cfg.drain_grace_period, Duration::from_secs(30));
        assert_eq!(cfg.sessions.idle_timeout, Duration::from_secs(300));
        assert_eq!(cfg.sessions.max_sessions, 500);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("SERVING_CORE_WAIT_FOR_MODEL_LOADED_TIMEOUT_MS", "250");
        std::env::set_var("SERVING_CORE_SEQUENCE_CLEANER_INTERVAL_MINUTES", "0");
        std::env::set_var("SERVING_CORE_MAX_SESSIONS", "8");
        std::env::set_var("SERVING_CORE_LOG_FORMAT", "pretty");
        std::env::set_var("SERVING_CORE_LOG_LEVEL", "serving_core=debug");
        let cfg = load();
        assert_eq!(cfg.wait_for_model_loaded_timeout, Duration::from_millis(250));
        assert_eq!(cfg.sequence_cleaner_interval_minutes, 0);
        assert_eq!(cfg.sessions.max_sessions, 8);
        assert_eq!(cfg.logging.format, LogFormat::Pretty);
        assert_eq!(cfg.logging.level, "serving_core=debug");
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("SERVING_CORE_WAIT_FOR_MODEL_LOADED_TIMEOUT_MS", "soon");
        std::env::set_var("SERVING_CORE_SEQUENCE_CLEANER_INTERVAL_MINUTES", "-3");
        std::env::set_var("SERVING_CORE_LOG_FORMAT", "xml");
        let cfg = load();
        assert_eq!(cfg.wait_for_model_loaded_timeout, Duration::from_secs(10));
        assert_eq!(cfg.sequence_cleaner_interval_minutes, 5);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        clear_env_vars();
    }

    #[test]
    fn test_floors_applied() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("SERVING_CORE_WAIT_FOR_MODEL_LOADED_TIMEOUT_MS", "0");
        std::env::set_var("SERVING_CORE_MAX_SESSIONS", "0");
        let cfg = load();
        assert!(cfg.wait_for_model_loaded_timeout >= Duration::from_millis(1));
        assert!(cfg.sessions.max_sessions >= 1);
        clear_env_vars();
    }

    #[test]
    fn test_effective_config_serializes() {
        let cfg = ServingConfig::default();
        let json = serde_json::to_string(&cfg.effective_config()).unwrap();
        assert!(json.contains("\"wait_for_model_loaded_timeout_ms\":10000"));
        assert!(json.contains("\"log_format\":\"json\""));
    }
}
