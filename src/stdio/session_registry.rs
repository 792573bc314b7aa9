//! Live session tracking for the stdio server
//!
//! Each stdio connection gets a UUID and a cancellation token. In-flight
//! tool calls watch that token, so tearing down a session stops its
//! downstream HTTP requests.
//!
//! Registration hands back a [`SessionGuard`]. The entry is removed when the
//! guard drops, which covers normal exit, error returns and task aborts
//! alike.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// State kept for one live connection
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub opened_at: DateTime<Utc>,
    pub cancel: CancellationToken,
}

/// Thread-safe map of connection id to live session
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection under a fresh UUID.
    ///
    /// The returned guard owns the entry; keep it alive for as long as the
    /// connection is being served.
    pub fn register(&self) -> SessionGuard {
        let connection_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let handle = SessionHandle {
            opened_at: Utc::now(),
            cancel: cancel.clone(),
        };
        self.sessions.insert(connection_id.clone(), handle);
        log::debug!("Registered session {connection_id}");

        SessionGuard {
            registry: self.clone(),
            connection_id,
            cancel,
        }
    }

    pub fn get(&self, connection_id: &str) -> Option<SessionHandle> {
        self.sessions.get(connection_id).map(|entry| entry.value().clone())
    }

    /// Cancel every live session, e.g. on a shutdown signal.
    ///
    /// Entries stay until their guards drop.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for entry in self.sessions.iter() {
            entry.value().cancel.cancel();
            cancelled += 1;
        }
        if cancelled > 0 {
            log::info!("Cancelled {cancelled} live session(s)");
        }
        cancelled
    }

    fn remove(&self, connection_id: &str) {
        if let Some((_, handle)) = self.sessions.remove(connection_id) {
            handle.cancel.cancel();
            let lifetime = Utc::now() - handle.opened_at;
            log::info!(
                "Closed session {} after {}s",
                connection_id,
                lifetime.num_seconds()
            );
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Scoped registration; dropping it removes the session and cancels its token
pub struct SessionGuard {
    registry: SessionRegistry,
    connection_id: String,
    cancel: CancellationToken,
}

impl SessionGuard {
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Token that fires when this session ends
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.connection_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_register_and_drop() {
        let registry = SessionRegistry::new();
        let guard = registry.register();
        let id = guard.connection_id().to_string();

        assert_eq!(registry.len(), 1);
        assert!(Uuid::parse_str(&id).is_ok());
        assert!(registry.get(&id).is_some());

        let token = guard.cancellation();
        drop(guard);
        assert!(registry.is_empty());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_sessions_are_independent() {
        let registry = SessionRegistry::new();
        let first = registry.register();
        let second = registry.register();
        assert_ne!(first.connection_id(), second.connection_id());

        let second_token = second.cancellation();
        drop(first);
        assert_eq!(registry.len(), 1);
        assert!(!second_token.is_cancelled());
    }

    #[test]
    fn test_cancel_all_leaves_entries_until_drop() {
        let registry = SessionRegistry::new();
        let guard = registry.register();
        assert_eq!(registry.cancel_all(), 1);
        assert!(guard.cancellation().is_cancelled());
        assert_eq!(registry.len(), 1);
        drop(guard);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_aborted_task_releases_session() {
        let registry = SessionRegistry::new();
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

        let task_registry = registry.clone();
        let task = tokio::spawn(async move {
            let guard = task_registry.register();
            let _ = ready_tx.send(guard.cancellation());
            // Simulates a connection stuck mid-stream.
            tokio::time::sleep(Duration::from_secs(3600)).await;
            drop(guard);
        });

        let token = ready_rx.await.unwrap();
        assert_eq!(registry.len(), 1);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(registry.is_empty());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_panicking_task_releases_session() {
        let registry = SessionRegistry::new();
        let task_registry = registry.clone();
        let task = tokio::spawn(async move {
            let _guard = task_registry.register();
            panic!("connection handler crashed");
        });
        assert!(task.await.unwrap_err().is_panic());
        assert!(registry.is_empty());
    }
}
