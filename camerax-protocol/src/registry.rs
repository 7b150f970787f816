//! Session registry
//!
//! Every mutation of the session map and every event fan-out that reads it
//! runs under one async mutex. Closures passed in run with the lock held and
//! must not block.

use crate::message::SessionKey;
use crate::session::{Session, SessionSnapshot};
use crate::{CameraError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<SessionKey, Session>,
    /// Set by teardown; later inserts are refused
    closed: bool,
}

/// Insert refused; the session is handed back for cleanup
pub struct InsertError {
    pub error: CameraError,
    pub session: Session,
}

impl fmt::Debug for InsertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsertError")
            .field("error", &self.error)
            .field("key", &self.session.key)
            .finish()
    }
}

impl fmt::Display for InsertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

/// Map of active sessions keyed by host-chosen key
#[derive(Clone, Default)]
pub struct SessionRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session
    ///
    /// Fails with `AlreadyBound` if the key is taken and with
    /// `ContextUnavailable` once the registry has been drained.
    pub async fn insert(&self, session: Session) -> std::result::Result<(), InsertError> {
        let mut state = self.state.lock().await;

        if state.closed {
            return Err(InsertError {
                error: CameraError::activity_detached(),
                session,
            });
        }
        if state.sessions.contains_key(&session.key) {
            return Err(InsertError {
                error: CameraError::AlreadyBound(session.key),
                session,
            });
        }

        debug!("Registered session {}", session.key);
        state.sessions.insert(session.key, session);
        Ok(())
    }

    pub async fn remove(&self, key: SessionKey) -> Result<Session> {
        let mut state = self.state.lock().await;
        state
            .sessions
            .remove(&key)
            .ok_or(CameraError::NotFound(key))
    }

    pub async fn get(&self, key: SessionKey) -> Option<SessionSnapshot> {
        self.state
            .lock()
            .await
            .sessions
            .get(&key)
            .map(Session::snapshot)
    }

    pub async fn contains(&self, key: SessionKey) -> bool {
        self.state.lock().await.sessions.contains_key(&key)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn keys(&self) -> Vec<SessionKey> {
        let mut keys: Vec<_> = self.state.lock().await.sessions.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Run `f` over all sessions with the lock held
    pub async fn with_sessions<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&HashMap<SessionKey, Session>) -> R,
    {
        let state = self.state.lock().await;
        f(&state.sessions)
    }

    /// Mutate one session with the lock held
    ///
    /// Returns `None` when no session has that key.
    pub async fn update<F, R>(&self, key: SessionKey, f: F) -> Option<R>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut state = self.state.lock().await;
        state.sessions.get_mut(&key).map(f)
    }

    /// Remove every session and refuse further inserts
    pub async fn drain(&self) -> Vec<Session> {
        let mut state = self.state.lock().await;
        state.closed = true;
        let drained: Vec<Session> = state.sessions.drain().map(|(_, session)| session).collect();
        debug!("Drained {} session(s)", drained.len());
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::bound_session;

    #[tokio::test]
    async fn test_insert_and_remove() {
        let registry = SessionRegistry::new();
        registry.insert(bound_session(1)).await.unwrap();
        registry.insert(bound_session(2)).await.unwrap();

        assert_eq!(registry.keys().await, vec![1, 2]);
        assert!(registry.contains(1).await);

        let removed = registry.remove(1).await.unwrap();
        assert_eq!(removed.key, 1);
        assert_eq!(registry.len().await, 1);
        removed.release();
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let registry = SessionRegistry::new();
        registry.insert(bound_session(4)).await.unwrap();

        let err = registry.insert(bound_session(4)).await.unwrap_err();
        assert!(matches!(err.error, CameraError::AlreadyBound(4)));
        assert_eq!(err.session.key, 4);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_missing_key() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            registry.remove(7).await,
            Err(CameraError::NotFound(7))
        ));
    }

    #[tokio::test]
    async fn test_update_missing_key() {
        let registry = SessionRegistry::new();
        assert!(registry.update(1, |session| session.key).await.is_none());
    }

    #[tokio::test]
    async fn test_drain_closes_registry() {
        let registry = SessionRegistry::new();
        registry.insert(bound_session(1)).await.unwrap();

        let drained = registry.drain().await;
        assert_eq!(drained.len(), 1);
        assert!(registry.is_empty().await);

        let err = registry.insert(bound_session(2)).await.unwrap_err();
        assert!(matches!(err.error, CameraError::ContextUnavailable(_)));
    }
}
