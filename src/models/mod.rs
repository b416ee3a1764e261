//! Model version management for the serving core.
//!
//! Version state machine, admission guards, per-model version maps and the
//! registry driving reload and retirement.

mod instance;
mod loader;
mod model;
mod registry;
mod state;

pub use instance::{AdmissionGuard, ModelArtifact, ModelInstance};
pub use loader::{ArtifactLoader, ModelConfig, VersionPolicy, VersionSource};
pub use model::{Model, VersionLookup};
pub use registry::ModelRegistry;
pub use state::{ModelVersionState, ModelVersionStatus};
