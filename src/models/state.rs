//! Version lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one model version.
///
/// `Start -> Loading -> Available -> Unloading -> End`, with `LoadingFailed`
/// reachable from `Loading`. `LoadingFailed` and `End` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelVersionState {
    Start,
    Loading,
    Available,
    Unloading,
    End,
    LoadingFailed,
}

impl ModelVersionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Loading => "LOADING",
            Self::Available => "AVAILABLE",
            Self::Unloading => "UNLOADING",
            Self::End => "END",
            Self::LoadingFailed => "LOADING_FAILED",
        }
    }

    /// Returns true if `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: ModelVersionState) -> bool {
        use ModelVersionState::*;
        matches!(
            (self, next),
            (Start, Loading)
                | (Loading, Available)
                | (Loading, LoadingFailed)
                | (Available, Unloading)
                | (Unloading, End)
        )
    }

    /// Not yet usable, but may become usable.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Start | Self::Loading)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End | Self::LoadingFailed)
    }
}

impl std::fmt::Display for ModelVersionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time status of a model version, as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersionStatus {
    pub model_name: String,
    pub version: u64,
    pub state: ModelVersionState,
    /// Stable error code for the last failed transition, if any.
    pub error: Option<String>,
}
