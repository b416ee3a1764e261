//! Error types for the serving core.
//!
//! Every failure on the request path and the lifecycle control path is
//! returned as a value. Each variant carries a stable code so the transport
//! layer can map it to a client response without inspecting internal state.

use thiserror::Error;

/// Errors produced by resolution, lifecycle transitions and session tracking.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServingError {
    #[error("Model with requested name is not found: {name}")]
    ModelNameMissing { name: String },

    #[error("Model with requested version is not found: {name} v{version}")]
    ModelVersionMissing { name: String, version: u64 },

    #[error("Model with requested version is retired: {name} v{version}")]
    ModelVersionNotLoadedAnymore { name: String, version: u64 },

    #[error("Model with requested version is not loaded yet: {name} v{version}")]
    ModelVersionNotLoadedYet { name: String, version: u64 },

    #[error("No model version available for model: {0}")]
    NoModelVersionAvailable(String),

    #[error("Reload already in progress for model: {0}")]
    ReloadInProgress(String),

    #[error("Load failed for {name} v{version}: {reason}")]
    LoadFailed {
        name: String,
        version: u64,
        reason: String,
    },

    #[error("Drain timed out for {name} v{version} with {in_flight} requests in flight")]
    DrainTimeout {
        name: String,
        version: u64,
        in_flight: u32,
    },

    #[error("Sequence limit reached: {max} active sequences")]
    SequenceLimitReached { max: usize },

    #[error("Sequence already exists: {0}")]
    SequenceAlreadyExists(u64),

    #[error("Sequence is missing: {0}")]
    SequenceMissing(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServingError {
    /// Stable, machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModelNameMissing { .. } => "MODEL_NAME_MISSING",
            Self::ModelVersionMissing { .. } => "MODEL_VERSION_MISSING",
            Self::ModelVersionNotLoadedAnymore { .. } => "MODEL_VERSION_NOT_LOADED_ANYMORE",
            Self::ModelVersionNotLoadedYet { .. } => "MODEL_VERSION_NOT_LOADED_YET",
            Self::NoModelVersionAvailable(_) => "NO_MODEL_VERSION_AVAILABLE",
            Self::ReloadInProgress(_) => "RELOAD_IN_PROGRESS",
            Self::LoadFailed { .. } => "LOAD_FAILED",
            Self::DrainTimeout { .. } => "DRAIN_TIMEOUT",
            Self::SequenceLimitReached { .. } => "SEQUENCE_LIMIT_REACHED",
            Self::SequenceAlreadyExists(_) => "SEQUENCE_ALREADY_EXISTS",
            Self::SequenceMissing(_) => "SEQUENCE_MISSING",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status a REST front-end should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ModelNameMissing { .. }
            | Self::ModelVersionMissing { .. }
            | Self::ModelVersionNotLoadedAnymore { .. }
            | Self::NoModelVersionAvailable(_)
            | Self::SequenceMissing(_) => 404,
            Self::ModelVersionNotLoadedYet { .. } => 503,
            Self::ReloadInProgress(_) | Self::SequenceAlreadyExists(_) => 409,
            Self::SequenceLimitReached { .. } => 429,
            Self::LoadFailed { .. } | Self::DrainTimeout { .. } | Self::Internal(_) => 500,
        }
    }

    /// Returns true if the same request may succeed when retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ModelVersionNotLoadedYet { .. }
                | Self::ReloadInProgress(_)
                | Self::SequenceLimitReached { .. }
        )
    }

    pub(crate) fn not_loaded_anymore(name: &str, version: u64) -> Self {
        Self::ModelVersionNotLoadedAnymore {
            name: name.to_string(),
            version,
        }
    }

    pub(crate) fn not_loaded_yet(name: &str, version: u64) -> Self {
        Self::ModelVersionNotLoadedYet {
            name: name.to_string(),
            version,
        }
    }
}
