//! Model configuration and the collaborators that discover and load versions.
//!
//! Discovery and artifact parsing live outside the serving core; the registry
//! only sees them through [`VersionSource`] and [`ArtifactLoader`].

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use super::instance::ModelArtifact;
use crate::error::ServingError;

/// Which of the discovered versions should be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionPolicy {
    All,
    /// The `n` highest version numbers.
    Latest(usize),
    Specific(BTreeSet<u64>),
}

impl Default for VersionPolicy {
    fn default() -> Self {
        Self::Latest(1)
    }
}

impl VersionPolicy {
    /// Select target versions from the discovered ones.
    ///
    /// Version 0 is reserved for "default version" requests and never served.
    pub fn select(&self, available: &[u64]) -> BTreeSet<u64> {
        let mut discovered: BTreeSet<u64> = BTreeSet::new();
        for &version in available {
            if version == 0 {
                warn!("Ignoring model version 0, reserved for default version requests");
                continue;
            }
            discovered.insert(version);
        }

        match self {
            Self::All => discovered,
            Self::Latest(n) => discovered.into_iter().rev().take(*n).collect(),
            Self::Specific(wanted) => discovered.intersection(wanted).copied().collect(),
        }
    }
}

/// Configuration of one served model.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub name: String,
    /// Where the model's versions live. Interpreted by the collaborators only.
    pub base_path: PathBuf,
    pub policy: VersionPolicy,
    /// Sequence-aware model with per-version session tracking.
    pub stateful: bool,
}

impl ModelConfig {
    pub fn new(name: impl Into<String>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            base_path: base_path.into(),
            policy: VersionPolicy::default(),
            stateful: false,
        }
    }

    pub fn with_policy(mut self, policy: VersionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn stateful(mut self, stateful: bool) -> Self {
        self.stateful = stateful;
        self
    }
}

/// Reports which version numbers exist for a model.
pub trait VersionSource: Send + Sync {
    fn read_available_versions(&self, config: &ModelConfig) -> Result<Vec<u64>, ServingError>;
}

/// Loads the artifact of one model version.
///
/// Called on the management thread; may block for as long as loading takes.
pub trait ArtifactLoader: Send + Sync {
    fn load(&self, config: &ModelConfig, version: u64) -> Result<Arc<dyn ModelArtifact>, String>;
}
