//! One loaded model version and the admission guard protecting it.
//!
//! Every instance is a monitor: a `parking_lot::Mutex` over its status plus a
//! `Condvar` signalled on each state change and whenever the in-flight count
//! drops to zero. Unrelated versions never contend on the same lock.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use super::state::{ModelVersionState, ModelVersionStatus};
use crate::error::ServingError;
use crate::sessions::SessionRegistry;

/// Loaded model artifact. Opaque to the serving core.
pub trait ModelArtifact: Send + Sync + fmt::Debug {
    /// Approximate resident size, for diagnostics.
    fn memory_bytes(&self) -> usize {
        0
    }
}

struct VersionStatus {
    state: ModelVersionState,
    in_flight: u32,
    artifact: Option<Arc<dyn ModelArtifact>>,
    error: Option<String>,
}

/// A single version of a model with its lifecycle state.
pub struct ModelInstance {
    name: String,
    version: u64,
    status: Mutex<VersionStatus>,
    changed: Condvar,
    sessions: Option<Arc<SessionRegistry>>,
}

impl ModelInstance {
    pub fn new(name: impl Into<String>, version: u64) -> Self {
        Self {
            name: name.into(),
            version,
            status: Mutex::new(VersionStatus {
                state: ModelVersionState::Start,
                in_flight: 0,
                artifact: None,
                error: None,
            }),
            changed: Condvar::new(),
            sessions: None,
        }
    }

    /// Attach the session registry of a stateful model.
    pub fn with_sessions(mut self, sessions: Arc<SessionRegistry>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn state(&self) -> ModelVersionState {
        self.status.lock().state
    }

    pub fn in_flight_count(&self) -> u32 {
        self.status.lock().in_flight
    }

    pub fn is_stateful(&self) -> bool {
        self.sessions.is_some()
    }

    pub fn sessions(&self) -> Option<&Arc<SessionRegistry>> {
        self.sessions.as_ref()
    }

    /// The loaded artifact. `None` unless the version is (or was) available
    /// and has not reached `End`.
    pub fn artifact(&self) -> Option<Arc<dyn ModelArtifact>> {
        self.status.lock().artifact.clone()
    }

    pub fn status(&self) -> ModelVersionStatus {
        let status = self.status.lock();
        ModelVersionStatus {
            model_name: self.name.clone(),
            version: self.version,
            state: status.state,
            error: status.error.clone(),
        }
    }

    /// `Start -> Loading`.
    pub fn begin_loading(&self) -> Result<(), ServingError> {
        let mut status = self.status.lock();
        self.transition(&mut status, ModelVersionState::Loading)?;
        debug!(model = %self.name, version = self.version, "Loading model version");
        Ok(())
    }

    /// `Loading -> Available`. Wakes every resolver waiting on this version.
    pub fn notify_version_available(
        &self,
        artifact: Arc<dyn ModelArtifact>,
    ) -> Result<(), ServingError> {
        let mut status = self.status.lock();
        self.transition(&mut status, ModelVersionState::Available)?;
        let memory_bytes = artifact.memory_bytes();
        status.artifact = Some(artifact);
        status.error = None;
        self.changed.notify_all();
        info!(
            model = %self.name,
            version = self.version,
            memory_bytes,
            "Model version available"
        );
        Ok(())
    }

    /// `Loading -> LoadingFailed`. Waiters are woken and give up.
    pub fn notify_version_failed(&self, reason: &str) -> Result<(), ServingError> {
        let mut status = self.status.lock();
        self.transition(&mut status, ModelVersionState::LoadingFailed)?;
        status.error = Some(reason.to_string());
        self.changed.notify_all();
        warn!(model = %self.name, version = self.version, reason, "Model version failed to load");
        Ok(())
    }

    /// `Available -> Unloading`. New admissions are refused from here on.
    pub fn begin_unloading(&self) -> Result<(), ServingError> {
        let mut status = self.status.lock();
        self.transition(&mut status, ModelVersionState::Unloading)?;
        self.changed.notify_all();
        info!(
            model = %self.name,
            version = self.version,
            in_flight = status.in_flight,
            "Unloading model version"
        );
        Ok(())
    }

    /// Block until no admission guard is outstanding, or `grace` elapses.
    pub fn wait_for_drain(&self, grace: Duration) -> Result<(), ServingError> {
        let deadline = Instant::now() + grace;
        let mut status = self.status.lock();
        while status.in_flight > 0 {
            if self.changed.wait_until(&mut status, deadline).timed_out() && status.in_flight > 0 {
                return Err(ServingError::DrainTimeout {
                    name: self.name.clone(),
                    version: self.version,
                    in_flight: status.in_flight,
                });
            }
        }
        Ok(())
    }

    /// `Unloading -> End`. Refused while any request is still in flight.
    pub fn finish_unloading(&self) -> Result<(), ServingError> {
        let mut status = self.status.lock();
        if status.in_flight > 0 {
            return Err(ServingError::Internal(format!(
                "cannot end {} v{} with {} requests in flight",
                self.name, self.version, status.in_flight
            )));
        }
        self.transition(&mut status, ModelVersionState::End)?;
        status.artifact = None;
        self.changed.notify_all();
        info!(model = %self.name, version = self.version, "Model version unloaded");
        Ok(())
    }

    /// Block while the version is `Start`/`Loading`, at most until `deadline`.
    ///
    /// Returns once the state has left the pending states. A deadline that
    /// passes first wins, even if the load completes right after it.
    pub fn wait_for_loaded_until(&self, deadline: Instant) -> Result<(), ServingError> {
        let mut status = self.status.lock();
        while status.state.is_pending() {
            if self.changed.wait_until(&mut status, deadline).timed_out() {
                return Err(ServingError::not_loaded_yet(&self.name, self.version));
            }
        }
        Ok(())
    }

    fn transition(
        &self,
        status: &mut VersionStatus,
        next: ModelVersionState,
    ) -> Result<(), ServingError> {
        if !status.state.can_transition_to(next) {
            error!(
                model = %self.name,
                version = self.version,
                from = %status.state,
                to = %next,
                "Illegal model version transition"
            );
            return Err(ServingError::Internal(format!(
                "illegal transition {} -> {} for {} v{}",
                status.state, next, self.name, self.version
            )));
        }
        status.state = next;
        Ok(())
    }
}

impl fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status.lock();
        f.debug_struct("ModelInstance")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("state", &status.state)
            .field("in_flight", &status.in_flight)
            .field("stateful", &self.sessions.is_some())
            .finish()
    }
}

/// RAII token for one in-flight request against a model version.
///
/// While any guard is alive the version cannot reach `End`.
pub struct AdmissionGuard {
    instance: Arc<ModelInstance>,
}

impl AdmissionGuard {
    /// Admit one request. Only an `Available` version admits.
    pub fn acquire(instance: &Arc<ModelInstance>) -> Result<Self, ServingError> {
        let mut status = instance.status.lock();
        match status.state {
            ModelVersionState::Available => {
                status.in_flight += 1;
                Ok(Self {
                    instance: Arc::clone(instance),
                })
            }
            ModelVersionState::Unloading | ModelVersionState::End => Err(
                ServingError::not_loaded_anymore(&instance.name, instance.version),
            ),
            ModelVersionState::Start
            | ModelVersionState::Loading
            | ModelVersionState::LoadingFailed => Err(ServingError::not_loaded_yet(
                &instance.name,
                instance.version,
            )),
        }
    }

    pub fn instance(&self) -> &Arc<ModelInstance> {
        &self.instance
    }
}

impl fmt::Debug for AdmissionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionGuard")
            .field("model", &self.instance.name)
            .field("version", &self.instance.version)
            .finish()
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        let mut status = self.instance.status.lock();
        debug_assert!(status.in_flight > 0, "admission count underflow");
        status.in_flight = status.in_flight.saturating_sub(1);
        if status.in_flight == 0 {
            self.instance.changed.notify_all();
        }
    }
}
