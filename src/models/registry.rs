//! Registry of served models and their version lifecycle operations.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::instance::ModelInstance;
use super::loader::{ArtifactLoader, ModelConfig, VersionSource};
use super::model::Model;
use super::state::{ModelVersionState, ModelVersionStatus};
use crate::config::DEFAULT_DRAIN_GRACE_PERIOD_MS;
use crate::error::ServingError;
use crate::reaper::LifecycleReaper;
use crate::sessions::{SessionRegistry, SessionRegistryConfig};

/// Thread-safe registry of all served models.
pub struct ModelRegistry {
    models: DashMap<String, Arc<Model>>,
    reaper: Arc<LifecycleReaper>,
    source: Arc<dyn VersionSource>,
    loader: Arc<dyn ArtifactLoader>,
    sessions: SessionRegistryConfig,
    drain_grace_period: Duration,
}

impl ModelRegistry {
    pub fn new(
        reaper: Arc<LifecycleReaper>,
        source: Arc<dyn VersionSource>,
        loader: Arc<dyn ArtifactLoader>,
    ) -> Self {
        Self {
            models: DashMap::new(),
            reaper,
            source,
            loader,
            sessions: SessionRegistryConfig::default(),
            drain_grace_period: Duration::from_millis(DEFAULT_DRAIN_GRACE_PERIOD_MS),
        }
    }

    /// How long retirement waits for in-flight requests to finish.
    pub fn with_drain_grace_period(mut self, grace: Duration) -> Self {
        self.drain_grace_period = grace;
        self
    }

    /// Session settings for versions of stateful models.
    pub fn with_session_config(mut self, sessions: SessionRegistryConfig) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn reaper(&self) -> &Arc<LifecycleReaper> {
        &self.reaper
    }

    pub fn get_model(&self, name: &str) -> Option<Arc<Model>> {
        self.models.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.models.len()
    }

    /// Bring a model's served versions in line with its configuration.
    ///
    /// New, retired and failed target versions are loaded. Versions outside
    /// the target set are then cleaned up: failed ones are dropped, unloading
    /// ones finish their drain, and available ones are retired only if every
    /// target load succeeded, so a failed upgrade keeps the old version
    /// serving. A load failure does not stop the remaining versions; the
    /// first error is returned once all of them were processed.
    pub fn reload_model_with_versions(&self, config: &ModelConfig) -> Result<(), ServingError> {
        let model = Arc::clone(
            self.models
                .entry(config.name.clone())
                .or_insert_with(|| Arc::new(Model::new(config.name.clone())))
                .value(),
        );

        let Some(_reload) = model.try_lock_reload() else {
            warn!(model = %config.name, "Reload rejected, another reload is in progress");
            return Err(ServingError::ReloadInProgress(config.name.clone()));
        };

        let available = self.source.read_available_versions(config)?;
        let target = config.policy.select(&available);
        if target.is_empty() {
            warn!(model = %config.name, "No model version available");
            return Err(ServingError::NoModelVersionAvailable(config.name.clone()));
        }

        let mut first_error = None;
        for &version in &target {
            let needs_load = match model.instance(version) {
                None => true,
                Some(instance) => instance.state().is_terminal(),
            };
            if !needs_load {
                continue;
            }
            if let Err(e) = self.load_version(&model, config, version) {
                first_error.get_or_insert(e);
            }
        }
        let loads_failed = first_error.is_some();

        let mut to_retire = Vec::new();
        let mut kept = Vec::new();
        for instance in model.instances() {
            let version = instance.version();
            if target.contains(&version) {
                continue;
            }
            match instance.state() {
                ModelVersionState::Available if loads_failed => kept.push(version),
                ModelVersionState::Start | ModelVersionState::Loading => {}
                _ => to_retire.push(version),
            }
        }
        if !kept.is_empty() {
            warn!(
                model = %config.name,
                kept = ?kept,
                "Target versions failed to load, keeping previous versions"
            );
        }

        if !to_retire.is_empty() {
            if let Err(e) = self.retire_locked(&model, &to_retire) {
                first_error.get_or_insert(e);
            }
        }

        info!(
            model = %config.name,
            versions = ?target,
            retired = ?to_retire,
            "Model reload finished"
        );
        first_error.map_or(Ok(()), Err)
    }

    /// Retire the listed versions of a model.
    ///
    /// Each version stops admitting requests, drains within the grace period,
    /// reaches `End` and is removed. A version whose drain times out stays
    /// `Unloading`; retiring it again resumes the drain.
    pub fn retire_versions(&self, name: &str, versions: &[u64]) -> Result<(), ServingError> {
        let model = self.get_model(name).ok_or_else(|| ServingError::ModelNameMissing {
            name: name.to_string(),
        })?;
        let _reload = model.lock_reload();
        self.retire_locked(&model, versions)
    }

    /// Retire every version of every model.
    pub fn retire_all(&self) -> Result<(), ServingError> {
        let mut first_error = None;
        for name in self.model_names() {
            let Some(model) = self.get_model(&name) else {
                continue;
            };
            let _reload = model.lock_reload();
            let versions: Vec<u64> = model.instances().iter().map(|i| i.version()).collect();
            if let Err(e) = self.retire_locked(&model, &versions) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Status of one version, or of all known versions (descending) for `0`.
    pub fn model_status(
        &self,
        name: &str,
        version: u64,
    ) -> Result<Vec<ModelVersionStatus>, ServingError> {
        let model = self.get_model(name).ok_or_else(|| ServingError::ModelNameMissing {
            name: name.to_string(),
        })?;

        let retired_status = |version: u64| ModelVersionStatus {
            model_name: name.to_string(),
            version,
            state: ModelVersionState::End,
            error: None,
        };

        if version != 0 {
            if let Some(instance) = model.instance(version) {
                return Ok(vec![instance.status()]);
            }
            if model.is_retired(version) {
                return Ok(vec![retired_status(version)]);
            }
            return Err(ServingError::ModelVersionMissing {
                name: name.to_string(),
                version,
            });
        }

        let mut statuses: Vec<ModelVersionStatus> =
            model.instances().iter().map(|i| i.status()).collect();
        statuses.extend(model.retired_versions().into_iter().map(retired_status));
        if statuses.is_empty() {
            return Err(ServingError::ModelVersionMissing {
                name: name.to_string(),
                version,
            });
        }
        statuses.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(statuses)
    }

    fn load_version(
        &self,
        model: &Model,
        config: &ModelConfig,
        version: u64,
    ) -> Result<(), ServingError> {
        let sessions = config.stateful.then(|| {
            Arc::new(SessionRegistry::new(
                config.name.clone(),
                version,
                self.sessions.clone(),
            ))
        });

        let mut instance = ModelInstance::new(config.name.clone(), version);
        if let Some(sessions) = &sessions {
            instance = instance.with_sessions(Arc::clone(sessions));
        }
        let instance = Arc::new(instance);

        instance.begin_loading()?;
        // Visible while loading so resolvers can wait on it.
        model.insert_instance(Arc::clone(&instance));

        match self.loader.load(config, version) {
            Ok(artifact) => {
                instance.notify_version_available(artifact)?;
                if let Some(sessions) = sessions {
                    if let Err(e) = self.reaper.register(&config.name, version, sessions) {
                        warn!(model = %config.name, version, error = %e, "Session reaper registration failed");
                    }
                }
                Ok(())
            }
            Err(reason) => {
                instance.notify_version_failed(&reason)?;
                Err(ServingError::LoadFailed {
                    name: config.name.clone(),
                    version,
                    reason,
                })
            }
        }
    }

    fn retire_locked(&self, model: &Model, versions: &[u64]) -> Result<(), ServingError> {
        let mut first_error = None;
        for &version in versions {
            if let Err(e) = self.retire_one(model, version) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn retire_one(&self, model: &Model, version: u64) -> Result<(), ServingError> {
        let name = model.name();
        let Some(instance) = model.instance(version) else {
            if model.is_retired(version) {
                debug!(model = name, version, "Model version already retired");
                return Ok(());
            }
            return Err(ServingError::ModelVersionMissing {
                name: name.to_string(),
                version,
            });
        };

        match instance.state() {
            ModelVersionState::Available => instance.begin_unloading()?,
            ModelVersionState::Unloading => {
                debug!(model = name, version, "Resuming drain of unloading model version")
            }
            ModelVersionState::LoadingFailed => {
                // Never served, so no tombstone.
                model.discard_instance(version);
                return Ok(());
            }
            ModelVersionState::End => {
                model.remove_instance(version);
                return Ok(());
            }
            ModelVersionState::Start | ModelVersionState::Loading => {
                return Err(ServingError::not_loaded_yet(name, version));
            }
        }

        if let Err(e) = instance.wait_for_drain(self.drain_grace_period) {
            warn!(model = name, version, error = %e, "Model version did not drain in time");
            return Err(e);
        }
        instance.finish_unloading()?;
        model.remove_instance(version);

        if instance.is_stateful() {
            if let Err(e) = self.reaper.unregister(name, version) {
                warn!(model = name, version, error = %e, "Session reaper unregistration failed");
            }
        }
        Ok(())
    }
}
