//! Serving Core
//!
//! Lifecycle and admission control for the model versions of an inference
//! server. Requests resolve a model name and version to an admitted instance
//! while a management loop loads, reloads and retires versions concurrently.
//!
//! # Components
//!
//! - [`models`]: version state machine, admission guards, model registry
//! - [`resolver`]: request-path resolution with bounded waiting for loads
//! - [`sessions`]: per-version session registries of stateful models
//! - [`reaper`]: background sweeping of idle sessions
//!
//! # Guarantees
//!
//! - A version never reaches `End` while a request holds its admission guard.
//! - Every resolution failure is a stable [`ServingError`] kind.
//! - Reaper shutdown latency is bounded by one in-flight sweep.

pub mod config;
pub mod error;
pub mod models;
pub mod reaper;
pub mod resolver;
pub mod sessions;
pub mod telemetry;

use std::sync::Arc;

use tracing::info;

pub use config::ServingConfig;
pub use error::ServingError;
use models::{ArtifactLoader, ModelRegistry, VersionSource};
use reaper::LifecycleReaper;
use resolver::{ResolvedInstance, VersionResolver};

/// The serving core: registry, resolver and session reaper wired together.
pub struct ServingCore {
    config: ServingConfig,
    reaper: Arc<LifecycleReaper>,
    registry: Arc<ModelRegistry>,
    resolver: VersionResolver,
}

impl ServingCore {
    pub fn new(
        config: ServingConfig,
        source: Arc<dyn VersionSource>,
        loader: Arc<dyn ArtifactLoader>,
    ) -> Self {
        telemetry::init_metrics();
        let reaper = Arc::new(LifecycleReaper::new());
        let registry = Arc::new(
            ModelRegistry::new(Arc::clone(&reaper), source, loader)
                .with_drain_grace_period(config.drain_grace_period)
                .with_session_config(config.sessions.clone()),
        );
        let resolver = VersionResolver::new(Arc::clone(&registry))
            .with_wait_timeout(config.wait_for_model_loaded_timeout);

        Self {
            config,
            reaper,
            registry,
            resolver,
        }
    }

    /// Start background work. Returns true if the session reaper was started.
    pub fn start(&self) -> Result<bool, ServingError> {
        let started = self
            .reaper
            .start_cleaner_thread(self.config.sequence_cleaner_interval_minutes)?;
        info!(
            reaper = started,
            interval_minutes = self.config.sequence_cleaner_interval_minutes,
            "Serving core started"
        );
        Ok(started)
    }

    pub fn config(&self) -> &ServingConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn reaper(&self) -> &Arc<LifecycleReaper> {
        &self.reaper
    }

    pub fn resolver(&self) -> &VersionResolver {
        &self.resolver
    }

    /// Resolve a model version for one request. Version `0` means default.
    pub fn resolve(&self, name: &str, version: u64) -> Result<ResolvedInstance, ServingError> {
        self.resolver.resolve(name, version)
    }

    /// Stop the reaper, then retire every served version.
    pub fn shutdown(&self) -> Result<(), ServingError> {
        self.reaper.join();
        let result = self.registry.retire_all();
        info!(clean = result.is_ok(), "Serving core stopped");
        result
    }
}
