use moka::sync::Cache;
use std::sync::Arc;
use tracing::info;

use crate::error::SessionError;
use crate::ws::session::SessionHandle;

/// Process-wide map from session id to its live state.
///
/// Lookups and inserts for different ids never contend on a shared lock.
/// Entries have no TTL: a session leaves only through `remove`.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Cache<String, Arc<SessionHandle>>,
    broadcast_capacity: usize,
}

impl SessionRegistry {
    pub fn new(broadcast_capacity: usize) -> Self {
        Self {
            sessions: Cache::builder().build(),
            broadcast_capacity,
        }
    }

    /// Return the registered session or register an empty one. Never touches storage.
    pub fn get_or_create(&self, session_id: &str) -> Arc<SessionHandle> {
        self.sessions.get_with(session_id.to_string(), || {
            info!(session_id = %session_id, "Registering session");
            SessionHandle::new(session_id, self.broadcast_capacity)
        })
    }

    pub fn get(&self, session_id: &str) -> Result<Arc<SessionHandle>, SessionError> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        let removed = self.sessions.remove(session_id);
        if removed.is_some() {
            info!(session_id = %session_id, "Session removed from registry");
        }
        removed
    }

    pub fn sessions(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.iter().map(|(_, handle)| handle).collect()
    }

    pub fn len(&self) -> u64 {
        self.sessions.run_pending_tasks();
        self.sessions.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let registry = SessionRegistry::new(8);
        let first = registry.get_or_create("r1");
        let second = registry.get_or_create("r1");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn get_unknown_session_is_not_found() {
        let registry = SessionRegistry::new(8);
        let err = registry.get("nope").unwrap_err();
        assert!(matches!(err, SessionError::SessionNotFound(id) if id == "nope"));
    }

    #[test]
    fn remove_then_create_yields_fresh_handle() {
        let registry = SessionRegistry::new(8);
        let first = registry.get_or_create("r1");
        assert!(registry.remove("r1").is_some());
        assert!(registry.remove("r1").is_none());
        let second = registry.get_or_create("r1");
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn registries_are_isolated() {
        let a = SessionRegistry::new(8);
        let b = SessionRegistry::new(8);
        a.get_or_create("r1");
        assert!(b.get("r1").is_err());
        assert_eq!(a.sessions().len(), 1);
    }

    #[test]
    fn concurrent_creation_yields_one_handle() {
        let registry = SessionRegistry::new(8);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.get_or_create("shared"))
            })
            .collect();
        let created: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(created.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
