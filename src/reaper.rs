//! Background reaper for idle sessions of stateful models.
//!
//! Stateful model versions register their session registry here when they
//! become available and unregister when retired. A single background thread
//! periodically sweeps every registered registry. All start/stop state lives
//! in the reaper instance, so independent reapers never interfere.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::ServingError;
use crate::sessions::IdleSessionSweep;
use crate::telemetry;

const KEY_SEPARATOR: &str = "_";

/// Registration key for a model version.
pub fn registration_key(model_name: &str, version: u64) -> String {
    format!("{model_name}{KEY_SEPARATOR}{version}")
}

type RegistrationTable = BTreeMap<String, Arc<dyn IdleSessionSweep>>;

/// Cancellation signal observed by the cleaner thread's interval wait.
struct Cancellation {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

impl Cancellation {
    fn new() -> Self {
        Self {
            cancelled: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    fn cancel(&self) {
        *self.cancelled.lock() = true;
        self.signal.notify_all();
    }

    /// Wait up to `interval`. Returns true if cancelled.
    ///
    /// An interval too large to express as a deadline waits for cancellation.
    fn wait(&self, interval: Duration) -> bool {
        let deadline = Instant::now().checked_add(interval);
        let mut cancelled = self.cancelled.lock();
        while !*cancelled {
            match deadline {
                Some(deadline) => {
                    if self.signal.wait_until(&mut cancelled, deadline).timed_out() {
                        break;
                    }
                }
                None => self.signal.wait(&mut cancelled),
            }
        }
        *cancelled
    }
}

struct CleanerThread {
    handle: JoinHandle<()>,
    cancellation: Arc<Cancellation>,
}

/// Process-wide coordinator of idle-session sweeps.
pub struct LifecycleReaper {
    table: Arc<Mutex<RegistrationTable>>,
    cleaner: Mutex<Option<CleanerThread>>,
}

impl LifecycleReaper {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(BTreeMap::new())),
            cleaner: Mutex::new(None),
        }
    }

    /// Register a version's session registry for periodic cleanup.
    ///
    /// A key may be registered once; a second registration is reported as an
    /// internal error and leaves the first one in place.
    pub fn register(
        &self,
        model_name: &str,
        version: u64,
        registry: Arc<dyn IdleSessionSweep>,
    ) -> Result<(), ServingError> {
        let key = registration_key(model_name, version);
        let mut table = self.table.lock();
        if table.contains_key(&key) {
            error!(
                model = model_name,
                version,
                "Cannot register model instance in session reaper. Already registered."
            );
            return Err(ServingError::Internal(format!("{key} already registered for cleanup")));
        }
        table.insert(key, registry);
        telemetry::record_registered_registries(table.len());
        debug!(model = model_name, version, "Registered in session reaper");
        Ok(())
    }

    /// Remove a version from periodic cleanup.
    pub fn unregister(&self, model_name: &str, version: u64) -> Result<(), ServingError> {
        let key = registration_key(model_name, version);
        let mut table = self.table.lock();
        if table.remove(&key).is_none() {
            debug!(
                model = model_name,
                version,
                "Cannot unregister model instance from session reaper. It has not been registered."
            );
            return Err(ServingError::Internal(format!("{key} is not registered for cleanup")));
        }
        telemetry::record_registered_registries(table.len());
        debug!(model = model_name, version, "Unregistered from session reaper");
        Ok(())
    }

    pub fn is_registered(&self, model_name: &str, version: u64) -> bool {
        self.table.lock().contains_key(&registration_key(model_name, version))
    }

    pub fn registered_count(&self) -> usize {
        self.table.lock().len()
    }

    /// Run one sweep over every registered registry.
    ///
    /// The table lock is released before sweeping. The first failing sweep
    /// ends the pass and its error is returned.
    pub fn remove_idle_sequences(&self) -> Result<(), ServingError> {
        sweep(&self.table)
    }

    /// Start the background cleaner with an interval in minutes.
    ///
    /// Returns `Ok(true)` if a thread was spawned. A zero interval disables
    /// the cleaner and a running cleaner is left as is.
    pub fn start_cleaner_thread(&self, interval_minutes: u32) -> Result<bool, ServingError> {
        self.start_cleaner_thread_with_interval(Duration::from_secs(u64::from(interval_minutes) * 60))
    }

    /// Start the background cleaner with an arbitrary interval.
    pub fn start_cleaner_thread_with_interval(&self, interval: Duration) -> Result<bool, ServingError> {
        if interval.is_zero() {
            debug!("Session reaper disabled");
            return Ok(false);
        }

        let mut cleaner = self.cleaner.lock();
        if cleaner.is_some() {
            debug!("Session reaper already running");
            return Ok(false);
        }

        let cancellation = Arc::new(Cancellation::new());
        let table = Arc::clone(&self.table);
        let thread_cancellation = Arc::clone(&cancellation);

        let handle = thread::Builder::new()
            .name("session-reaper".to_string())
            .spawn(move || cleaner_routine(table, thread_cancellation, interval))
            .map_err(|e| ServingError::Internal(format!("failed to spawn session reaper: {e}")))?;

        *cleaner = Some(CleanerThread { handle, cancellation });
        Ok(true)
    }

    pub fn is_running(&self) -> bool {
        self.cleaner.lock().is_some()
    }

    /// Signal the cleaner to stop and wait for it to exit. No-op if not running.
    pub fn join(&self) {
        let Some(cleaner) = self.cleaner.lock().take() else {
            return;
        };
        cleaner.cancellation.cancel();
        if cleaner.handle.join().is_err() {
            error!("Session reaper thread panicked");
            return;
        }
        info!("Shutdown session reaper");
    }
}

impl Default for LifecycleReaper {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LifecycleReaper {
    fn drop(&mut self) {
        self.join();
    }
}

fn sweep(table: &Mutex<RegistrationTable>) -> Result<(), ServingError> {
    let snapshot: Vec<(String, Arc<dyn IdleSessionSweep>)> = table
        .lock()
        .iter()
        .map(|(key, registry)| (key.clone(), Arc::clone(registry)))
        .collect();

    for (key, registry) in snapshot {
        match registry.remove_idle_sessions() {
            Ok(evicted) => telemetry::record_sessions_evicted(evicted),
            Err(e) => {
                warn!(registration = %key, error = %e, "Idle session sweep failed");
                telemetry::record_sweep_failure();
                return Err(e);
            }
        }
    }
    Ok(())
}

fn cleaner_routine(
    table: Arc<Mutex<RegistrationTable>>,
    cancellation: Arc<Cancellation>,
    interval: Duration,
) {
    info!(interval_secs = interval.as_secs(), "Started session reaper thread");
    while !cancellation.wait(interval) {
        debug!("Session reaper scan begin");
        // A failed pass is retried on the next interval.
        let _ = sweep(&table);
        debug!("Session reaper scan end");
    }
    info!("Stopped session reaper thread");
}
