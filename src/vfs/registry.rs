//! Registry of live filesystem sessions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Identifier handed out by [`SessionRegistry::register`].
pub type SessionId = u64;

/// What the registry knows about one mounted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub container: PathBuf,
    pub read_only: bool,
}

/// Thread-safe list of active sessions, shared by whoever hosts them.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<BTreeMap<SessionId, SessionInfo>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<SessionId, SessionInfo>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a session and return its id.
    pub fn register(&self, container: &Path, read_only: bool) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.lock().insert(
            id,
            SessionInfo {
                id,
                container: container.to_path_buf(),
                read_only,
            },
        );
        id
    }

    /// Remove a session. Removing an unknown id is not an error.
    pub fn deregister(&self, id: SessionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Snapshot of active sessions, oldest first.
    pub fn active(&self) -> Vec<SessionInfo> {
        self.lock().values().cloned().collect()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
