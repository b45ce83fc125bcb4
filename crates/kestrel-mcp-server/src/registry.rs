//! Session registry and supervision.
//!
//! A dynamic set of session actors keyed by session id. The registry
//! resolves handles, respawns crashed actors in UNINITIALIZED state,
//! restores persisted sessions at startup (best effort), and evicts idle
//! sessions past their TTL.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use kestrel_mcp_session_storage::{LoadOutcome, SessionSnapshot, SessionStorage};

use crate::dispatcher::Dispatcher;
use crate::notifications::FrameSink;
use crate::session::{SessionActor, SessionHandle};

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    dispatcher: Arc<Dispatcher>,
    storage: Arc<dyn SessionStorage>,
    sink: Arc<dyn FrameSink>,
    mailbox_capacity: usize,
    ttl_seconds: u64,
}

impl SessionRegistry {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        storage: Arc<dyn SessionStorage>,
        sink: Arc<dyn FrameSink>,
        mailbox_capacity: usize,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            dispatcher,
            storage,
            sink,
            mailbox_capacity,
            ttl_seconds,
        }
    }

    /// Resolve a live handle by session id.
    ///
    /// A dead actor (crashed task) is respawned in UNINITIALIZED state from
    /// its stored snapshot; clients observe `session_restarted` failures on
    /// whatever was in flight and re-initialize.
    pub async fn whereis(&self, session_id: &str) -> Option<SessionHandle> {
        let existing = self.sessions.read().await.get(session_id).cloned();

        match existing {
            Some(handle) if handle.is_alive() => Some(handle),
            Some(_) => {
                warn!(session_id, "session actor died; restarting uninitialized");
                let mut sessions = self.sessions.write().await;
                // Double-check under the write lock.
                if let Some(handle) = sessions.get(session_id) {
                    if handle.is_alive() {
                        return Some(handle.clone());
                    }
                }
                let snapshot =
                    SessionSnapshot::with_id(session_id.to_string(), self.ttl_seconds);
                let handle = self.spawn(snapshot);
                sessions.insert(session_id.to_string(), handle.clone());
                Some(handle)
            }
            None => self.respawn_from_storage(session_id).await,
        }
    }

    /// Bring a persisted session back as an actor, if storage knows it.
    async fn respawn_from_storage(&self, session_id: &str) -> Option<SessionHandle> {
        let snapshot = match self.storage.load(session_id).await {
            Ok(LoadOutcome::Found(snapshot)) => snapshot,
            Ok(LoadOutcome::NotFound) | Ok(LoadOutcome::Expired) => return None,
            Err(err) => {
                warn!(session_id, error = %err, "storage lookup failed");
                return None;
            }
        };

        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(session_id) {
            if existing.is_alive() {
                return Some(existing.clone());
            }
        }
        debug!(session_id, "restoring session from storage");
        let handle = self.spawn(snapshot);
        sessions.insert(session_id.to_string(), handle.clone());
        Some(handle)
    }

    /// Create a session, minting an id unless the caller supplies one
    /// (client-driven resume on initialize).
    pub async fn create(&self, session_id: Option<&str>) -> SessionHandle {
        let snapshot = match session_id {
            Some(id) => SessionSnapshot::with_id(id.to_string(), self.ttl_seconds),
            None => SessionSnapshot::new(self.ttl_seconds),
        };
        let id = snapshot.session_id.clone();

        if let Err(err) = self.storage.save(snapshot.clone()).await {
            warn!(session_id = %id, error = %err, "initial session persist failed");
        }

        let handle = self.spawn(snapshot);
        self.sessions
            .write()
            .await
            .insert(id.clone(), handle.clone());
        info!(session_id = %id, "session created");
        handle
    }

    /// Stop and forget a session; storage delete included.
    pub async fn terminate(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id);
        let existed = removed.is_some();
        if let Some(handle) = removed {
            handle.close().await;
        }
        if let Err(err) = self.storage.delete(session_id).await {
            warn!(session_id, error = %err, "storage delete failed");
        }
        if existed {
            info!(session_id, "session terminated");
        }
        existed
    }

    /// Recreate actors for every persisted active session. Failures are
    /// logged and skipped; startup continues.
    pub async fn restore_all(&self) {
        let ids = match self.storage.list_active().await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "session restore skipped");
                return;
            }
        };

        let mut restored = 0usize;
        for id in ids {
            if self.respawn_from_storage(&id).await.is_some() {
                restored += 1;
            }
        }
        if restored > 0 {
            info!(count = restored, "sessions restored from storage");
        }
    }

    /// Evict sessions past their TTL. Returns the evicted ids so the
    /// caller can clean up transport-side state.
    pub async fn evict_expired(&self) -> Vec<String> {
        let expired = match self.storage.cleanup_expired().await {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, "expiry sweep failed");
                0
            }
        };

        // Anything the registry holds that storage no longer knows is dead.
        let mut evicted = Vec::new();
        let ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        for id in ids {
            let gone = match self.storage.load(&id).await {
                Ok(LoadOutcome::Found(_)) => false,
                Ok(_) => true,
                Err(_) => false,
            };
            if gone {
                if let Some(handle) = self.sessions.write().await.remove(&id) {
                    handle.close().await;
                }
                info!(session_id = %id, "idle session evicted");
                evicted.push(id);
            }
        }

        if expired > 0 {
            debug!(count = expired, "expired snapshots dropped");
        }
        evicted
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn spawn(&self, snapshot: SessionSnapshot) -> SessionHandle {
        SessionActor::spawn(
            snapshot,
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.storage),
            Arc::clone(&self.sink),
            self.mailbox_capacity,
        )
    }
}
