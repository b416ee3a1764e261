//! Per-version registry of stateful client sessions.
//!
//! Stateful (sequence-aware) models keep one entry per open session. A
//! session that has seen no activity for longer than the idle timeout is
//! evicted by the next sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::ServingError;

/// Anything the lifecycle reaper can sweep for idle entries.
pub trait IdleSessionSweep: Send + Sync {
    /// Evict idle entries, returning how many were removed.
    fn remove_idle_sessions(&self) -> Result<usize, ServingError>;
}

/// Configuration for a session registry.
#[derive(Debug, Clone)]
pub struct SessionRegistryConfig {
    pub idle_timeout: Duration,
    pub max_sessions: usize,
}

impl Default for SessionRegistryConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            max_sessions: 500,
        }
    }
}

struct SessionEntry {
    last_activity: Instant,
}

/// Sessions of one stateful model version.
pub struct SessionRegistry {
    model_name: String,
    version: u64,
    sessions: Mutex<HashMap<u64, SessionEntry>>,
    next_id: AtomicU64,
    config: SessionRegistryConfig,
}

impl SessionRegistry {
    pub fn new(model_name: impl Into<String>, version: u64, config: SessionRegistryConfig) -> Self {
        Self {
            model_name: model_name.into(),
            version,
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Open a session under a client-chosen id.
    pub fn open_session(&self, id: u64) -> Result<(), ServingError> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&id) {
            return Err(ServingError::SequenceAlreadyExists(id));
        }
        if sessions.len() >= self.config.max_sessions {
            return Err(ServingError::SequenceLimitReached {
                max: self.config.max_sessions,
            });
        }
        sessions.insert(id, SessionEntry { last_activity: Instant::now() });
        Ok(())
    }

    /// Open a session with a server-assigned id.
    pub fn open_next_session(&self) -> Result<u64, ServingError> {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            match self.open_session(id) {
                Err(ServingError::SequenceAlreadyExists(_)) => continue,
                other => return other.map(|()| id),
            }
        }
    }

    /// Record activity on a session.
    pub fn touch(&self, id: u64) -> Result<(), ServingError> {
        let mut sessions = self.sessions.lock();
        let entry = sessions.get_mut(&id).ok_or(ServingError::SequenceMissing(id))?;
        entry.last_activity = Instant::now();
        Ok(())
    }

    pub fn close_session(&self, id: u64) -> Result<(), ServingError> {
        self.sessions
            .lock()
            .remove(&id)
            .map(|_| ())
            .ok_or(ServingError::SequenceMissing(id))
    }

    pub fn contains(&self, id: u64) -> bool {
        self.sessions.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl IdleSessionSweep for SessionRegistry {
    fn remove_idle_sessions(&self) -> Result<usize, ServingError> {
        let idle_timeout = self.config.idle_timeout;
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_activity.elapsed() < idle_timeout);
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(
                model = %self.model_name,
                version = self.version,
                evicted,
                remaining = sessions.len(),
                "Removed idle sessions"
            );
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn registry(idle_ms: u64, max: usize) -> SessionRegistry {
        SessionRegistry::new(
            "stateful",
            1,
            SessionRegistryConfig {
                idle_timeout: Duration::from_millis(idle_ms),
                max_sessions: max,
            },
        )
    }

    #[test]
    fn test_open_and_close() {
        let reg = registry(1000, 10);
        reg.open_session(42).unwrap();
        assert!(reg.contains(42));
        assert_eq!(reg.len(), 1);

        reg.close_session(42).unwrap();
        assert!(reg.is_empty());
        assert!(matches!(reg.close_session(42), Err(ServingError::SequenceMissing(42))));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let reg = registry(1000, 10);
        reg.open_session(7).unwrap();
        assert!(matches!(
            reg.open_session(7),
            Err(ServingError::SequenceAlreadyExists(7))
        ));
    }

    #[test]
    fn test_limit_enforced() {
        let reg = registry(1000, 2);
        reg.open_next_session().unwrap();
        reg.open_next_session().unwrap();
        assert!(matches!(
            reg.open_next_session(),
            Err(ServingError::SequenceLimitReached { max: 2 })
        ));
    }

    #[test]
    fn test_next_session_skips_taken_ids() {
        let reg = registry(1000, 10);
        reg.open_session(1).unwrap();
        let id = reg.open_next_session().unwrap();
        assert_ne!(id, 1);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn test_sweep_evicts_only_idle() {
        let reg = registry(50, 10);
        reg.open_session(1).unwrap();
        reg.open_session(2).unwrap();

        thread::sleep(Duration::from_millis(80));
        reg.touch(2).unwrap();

        let evicted = reg.remove_idle_sessions().unwrap();
        assert_eq!(evicted, 1);
        assert!(!reg.contains(1));
        assert!(reg.contains(2));
    }

    #[test]
    fn test_touch_unknown_session() {
        let reg = registry(1000, 10);
        assert!(matches!(reg.touch(9), Err(ServingError::SequenceMissing(9))));
    }
}
