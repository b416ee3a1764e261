//! A served model: its versions and the derived default version.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

use super::instance::ModelInstance;
use super::state::ModelVersionState;

/// Outcome of looking up a requested version.
#[derive(Debug, Clone)]
pub enum VersionLookup {
    Found(Arc<ModelInstance>),
    /// The version existed but was retired and removed.
    Retired(u64),
    Missing,
}

#[derive(Default)]
struct Versions {
    instances: BTreeMap<u64, Arc<ModelInstance>>,
    retired: BTreeSet<u64>,
}

/// All versions of one model.
///
/// Version maps are mutated only by the registry's reload/retire path, which
/// holds the model's reload lock.
pub struct Model {
    name: String,
    versions: RwLock<Versions>,
    reload_lock: Mutex<()>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: RwLock::new(Versions::default()),
            reload_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self, version: u64) -> Option<Arc<ModelInstance>> {
        self.versions.read().instances.get(&version).cloned()
    }

    /// All live instances, ascending by version.
    pub fn instances(&self) -> Vec<Arc<ModelInstance>> {
        self.versions.read().instances.values().cloned().collect()
    }

    pub fn retired_versions(&self) -> Vec<u64> {
        self.versions.read().retired.iter().copied().collect()
    }

    pub fn is_retired(&self, version: u64) -> bool {
        self.versions.read().retired.contains(&version)
    }

    /// Highest version currently `Available`.
    pub fn default_version(&self) -> Option<u64> {
        self.versions
            .read()
            .instances
            .iter()
            .rev()
            .find(|(_, instance)| instance.state() == ModelVersionState::Available)
            .map(|(version, _)| *version)
    }

    /// Resolve a requested version number; `0` selects the default version.
    ///
    /// Without any available version the default request falls back to the
    /// highest known version, live or retired, so the caller can report why
    /// it is not servable.
    pub fn lookup(&self, requested: u64) -> VersionLookup {
        let versions = self.versions.read();
        if requested != 0 {
            if let Some(instance) = versions.instances.get(&requested) {
                return VersionLookup::Found(Arc::clone(instance));
            }
            if versions.retired.contains(&requested) {
                return VersionLookup::Retired(requested);
            }
            return VersionLookup::Missing;
        }

        if let Some(instance) = versions
            .instances
            .values()
            .rev()
            .find(|instance| instance.state() == ModelVersionState::Available)
        {
            return VersionLookup::Found(Arc::clone(instance));
        }

        let highest_live = versions.instances.iter().next_back();
        let highest_retired = versions.retired.iter().next_back().copied();
        match (highest_live, highest_retired) {
            (Some((live, _)), Some(retired)) if retired > *live => VersionLookup::Retired(retired),
            (Some((_, instance)), _) => VersionLookup::Found(Arc::clone(instance)),
            (None, Some(retired)) => VersionLookup::Retired(retired),
            (None, None) => VersionLookup::Missing,
        }
    }

    /// Serialize reload/retire of this model. `None` if one is in progress.
    pub(crate) fn try_lock_reload(&self) -> Option<MutexGuard<'_, ()>> {
        self.reload_lock.try_lock()
    }

    pub(crate) fn lock_reload(&self) -> MutexGuard<'_, ()> {
        self.reload_lock.lock()
    }

    /// Insert or replace an instance, clearing any tombstone for its version.
    pub(crate) fn insert_instance(&self, instance: Arc<ModelInstance>) {
        let mut versions = self.versions.write();
        let version = instance.version();
        versions.retired.remove(&version);
        versions.instances.insert(version, instance);
    }

    /// Remove an instance and leave a tombstone for its version.
    pub(crate) fn remove_instance(&self, version: u64) -> Option<Arc<ModelInstance>> {
        let mut versions = self.versions.write();
        let removed = versions.instances.remove(&version);
        if removed.is_some() {
            versions.retired.insert(version);
        }
        removed
    }

    /// Remove an instance that never served, without a tombstone.
    pub(crate) fn discard_instance(&self, version: u64) -> Option<Arc<ModelInstance>> {
        self.versions.write().instances.remove(&version)
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let versions = self.versions.read();
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("versions", &versions.instances.keys().collect::<Vec<_>>())
            .field("retired", &versions.retired)
            .finish()
    }
}
