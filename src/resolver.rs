//! Resolution of `(model name, version)` to an admitted model instance.
//!
//! A request for a version that is still loading waits on the instance's
//! condition, bounded by the wait timeout, instead of failing right away.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::DEFAULT_WAIT_FOR_MODEL_LOADED_TIMEOUT_MS;
use crate::error::ServingError;
use crate::models::{AdmissionGuard, ModelInstance, ModelRegistry, ModelVersionState, VersionLookup};
use crate::telemetry::{self, ResolveSpan, SpanExt};

/// Default bound on waiting for a loading version.
pub const WAIT_FOR_MODEL_LOADED_TIMEOUT: Duration =
    Duration::from_millis(DEFAULT_WAIT_FOR_MODEL_LOADED_TIMEOUT_MS);

/// An admitted instance. The guard must be held for the whole request.
pub type ResolvedInstance = (Arc<ModelInstance>, AdmissionGuard);

/// Resolve with the default wait timeout. Version `0` selects the default version.
pub fn get_model_instance(
    registry: &ModelRegistry,
    name: &str,
    version: u64,
) -> Result<ResolvedInstance, ServingError> {
    get_model_instance_with_timeout(registry, name, version, WAIT_FOR_MODEL_LOADED_TIMEOUT)
}

/// Resolve, waiting at most `wait_timeout` for a loading version.
pub fn get_model_instance_with_timeout(
    registry: &ModelRegistry,
    name: &str,
    version: u64,
    wait_timeout: Duration,
) -> Result<ResolvedInstance, ServingError> {
    let span = ResolveSpan::new(name, version);
    let _enter = span.enter();

    let result = resolve(registry, name, version, wait_timeout);

    span.record_result(&result);
    let outcome = match &result {
        Ok((instance, _)) => {
            span.record("version", instance.version());
            "ok"
        }
        Err(e) => e.code(),
    };
    telemetry::record_resolve_outcome(name, outcome);
    result
}

fn resolve(
    registry: &ModelRegistry,
    name: &str,
    version: u64,
    wait_timeout: Duration,
) -> Result<ResolvedInstance, ServingError> {
    let model = registry.get_model(name).ok_or_else(|| ServingError::ModelNameMissing {
        name: name.to_string(),
    })?;

    let instance = match model.lookup(version) {
        VersionLookup::Found(instance) => instance,
        VersionLookup::Retired(retired) => {
            return Err(ServingError::not_loaded_anymore(name, retired))
        }
        VersionLookup::Missing => {
            return Err(ServingError::ModelVersionMissing {
                name: name.to_string(),
                version,
            })
        }
    };

    let deadline = Instant::now() + wait_timeout;
    loop {
        match instance.state() {
            ModelVersionState::Available => {
                let guard = AdmissionGuard::acquire(&instance)?;
                return Ok((instance, guard));
            }
            ModelVersionState::Unloading | ModelVersionState::End => {
                return Err(ServingError::not_loaded_anymore(name, instance.version()));
            }
            ModelVersionState::LoadingFailed => {
                return Err(ServingError::not_loaded_yet(name, instance.version()));
            }
            ModelVersionState::Start | ModelVersionState::Loading => {
                debug!(model = name, version = instance.version(), "Waiting for model version to load");
                let started = Instant::now();
                let waited = instance.wait_for_loaded_until(deadline);
                telemetry::record_resolve_wait(started.elapsed());
                waited?;
            }
        }
    }
}

/// Request-path entry point bound to one registry.
pub struct VersionResolver {
    registry: Arc<ModelRegistry>,
    wait_timeout: Duration,
}

impl VersionResolver {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            wait_timeout: WAIT_FOR_MODEL_LOADED_TIMEOUT,
        }
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Resolve on the calling thread. May block up to the wait timeout.
    pub fn resolve(&self, name: &str, version: u64) -> Result<ResolvedInstance, ServingError> {
        get_model_instance_with_timeout(&self.registry, name, version, self.wait_timeout)
    }

    /// Resolve from async code without blocking the executor.
    pub async fn resolve_async(
        &self,
        name: &str,
        version: u64,
    ) -> Result<ResolvedInstance, ServingError> {
        let registry = Arc::clone(&self.registry);
        let name = name.to_string();
        let wait_timeout = self.wait_timeout;
        tokio::task::spawn_blocking(move || {
            get_model_instance_with_timeout(&registry, &name, version, wait_timeout)
        })
        .await
        .map_err(|e| ServingError::Internal(format!("resolution task failed: {e}")))?
    }
}
