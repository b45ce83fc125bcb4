//! In-memory storage adapter for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::traits::{
    LoadOutcome, SessionSnapshot, SessionStorage, SessionStorageError, SseEvent,
};

struct SessionEntry {
    snapshot: SessionSnapshot,
    events: Vec<SseEvent>,
    next_event_id: u64,
}

impl SessionEntry {
    fn new(snapshot: SessionSnapshot) -> Self {
        Self {
            snapshot,
            events: Vec::new(),
            next_event_id: 1,
        }
    }
}

/// Reference adapter: a `RwLock<HashMap>` with bounded event logs.
pub struct InMemorySessionStorage {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    /// Events retained per session; the oldest are trimmed beyond this.
    max_events_per_session: usize,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self::with_event_capacity(1000)
    }

    pub fn with_event_capacity(max_events_per_session: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_events_per_session,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for InMemorySessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    fn backend_name(&self) -> &'static str {
        "in-memory"
    }

    async fn save(&self, snapshot: SessionSnapshot) -> Result<(), SessionStorageError> {
        let mut sessions = self.sessions.write().await;
        let id = snapshot.session_id.clone();
        match sessions.get_mut(&id) {
            Some(entry) => entry.snapshot = snapshot,
            None => {
                sessions.insert(id.clone(), SessionEntry::new(snapshot));
            }
        }
        debug!(session_id = %id, "session snapshot saved");
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<LoadOutcome, SessionStorageError> {
        let sessions = self.sessions.read().await;
        Ok(match sessions.get(session_id) {
            Some(entry) if entry.snapshot.is_expired() => LoadOutcome::Expired,
            Some(entry) => LoadOutcome::Found(entry.snapshot.clone()),
            None => LoadOutcome::NotFound,
        })
    }

    async fn delete(&self, session_id: &str) -> Result<(), SessionStorageError> {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(session_id).is_some() {
            debug!(session_id, "session deleted from storage");
        }
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<String>, SessionStorageError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|entry| !entry.snapshot.is_expired())
            .map(|entry| entry.snapshot.session_id.clone())
            .collect())
    }

    async fn update_ttl(
        &self,
        session_id: &str,
        ttl_seconds: u64,
    ) -> Result<(), SessionStorageError> {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.snapshot.ttl_seconds = ttl_seconds;
            entry.snapshot.touch();
        }
        Ok(())
    }

    async fn update(
        &self,
        session_id: &str,
        partial: HashMap<String, Value>,
    ) -> Result<(), SessionStorageError> {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.snapshot.state.extend(partial);
            entry.snapshot.touch();
        }
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize, SessionStorageError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !entry.snapshot.is_expired());
        Ok(before - sessions.len())
    }

    async fn store_event(
        &self,
        session_id: &str,
        mut event: SseEvent,
    ) -> Result<SseEvent, SessionStorageError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionStorageError::SessionNotFound(session_id.to_string()))?;

        event.id = entry.next_event_id;
        entry.next_event_id += 1;
        entry.events.push(event.clone());

        if entry.events.len() > self.max_events_per_session {
            let excess = entry.events.len() - self.max_events_per_session;
            entry.events.drain(..excess);
        }

        Ok(event)
    }

    async fn events_after(
        &self,
        session_id: &str,
        after_event_id: u64,
    ) -> Result<Vec<SseEvent>, SessionStorageError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .map(|entry| {
                entry
                    .events
                    .iter()
                    .filter(|event| event.id > after_event_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_events_before(
        &self,
        session_id: &str,
        before_event_id: u64,
    ) -> Result<u64, SessionStorageError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .get_mut(session_id)
            .map(|entry| {
                let before = entry.events.len();
                entry.events.retain(|event| event.id >= before_event_id);
                (before - entry.events.len()) as u64
            })
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_load_delete_round_trip() {
        let storage = InMemorySessionStorage::new();
        let snapshot = SessionSnapshot::new(1800);
        let id = snapshot.session_id.clone();

        storage.save(snapshot).await.unwrap();
        assert!(matches!(
            storage.load(&id).await.unwrap(),
            LoadOutcome::Found(_)
        ));

        storage.delete(&id).await.unwrap();
        assert!(matches!(
            storage.load(&id).await.unwrap(),
            LoadOutcome::NotFound
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let storage = InMemorySessionStorage::new();
        assert!(storage.delete("missing").await.is_ok());
        assert!(storage.update("missing", HashMap::new()).await.is_ok());
        assert!(storage.update_ttl("missing", 60).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_session_reported_as_expired() {
        let storage = InMemorySessionStorage::new();
        let mut snapshot = SessionSnapshot::new(1);
        snapshot.last_activity = crate::traits::now_millis() - 5_000;
        let id = snapshot.session_id.clone();
        storage.save(snapshot).await.unwrap();

        assert!(matches!(
            storage.load(&id).await.unwrap(),
            LoadOutcome::Expired
        ));
        assert!(storage.list_active().await.unwrap().is_empty());

        let removed = storage.cleanup_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert!(matches!(
            storage.load(&id).await.unwrap(),
            LoadOutcome::NotFound
        ));
    }

    #[tokio::test]
    async fn test_update_merges_state() {
        let storage = InMemorySessionStorage::new();
        let snapshot = SessionSnapshot::new(1800);
        let id = snapshot.session_id.clone();
        storage.save(snapshot).await.unwrap();

        storage
            .update(&id, HashMap::from([("k".to_string(), json!(1))]))
            .await
            .unwrap();
        storage
            .update(&id, HashMap::from([("k2".to_string(), json!(2))]))
            .await
            .unwrap();

        let loaded = storage.load(&id).await.unwrap().found().unwrap();
        assert_eq!(loaded.state.get("k"), Some(&json!(1)));
        assert_eq!(loaded.state.get("k2"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_event_ids_are_monotonic() {
        let storage = InMemorySessionStorage::new();
        let snapshot = SessionSnapshot::new(1800);
        let id = snapshot.session_id.clone();
        storage.save(snapshot).await.unwrap();

        let first = storage
            .store_event(&id, SseEvent::message(json!({"n": 1})))
            .await
            .unwrap();
        let second = storage
            .store_event(&id, SseEvent::message(json!({"n": 2})))
            .await
            .unwrap();
        assert!(second.id > first.id);

        let replay = storage.events_after(&id, first.id).await.unwrap();
        assert_eq!(replay.len(), 1);
        assert_eq!(replay[0].id, second.id);
    }

    #[tokio::test]
    async fn test_event_log_is_bounded() {
        let storage = InMemorySessionStorage::with_event_capacity(3);
        let snapshot = SessionSnapshot::new(1800);
        let id = snapshot.session_id.clone();
        storage.save(snapshot).await.unwrap();

        for n in 0..5 {
            storage
                .store_event(&id, SseEvent::message(json!({"n": n})))
                .await
                .unwrap();
        }

        let events = storage.events_after(&id, 0).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events.first().unwrap().id, 3);
    }

    #[tokio::test]
    async fn test_events_for_missing_session_are_empty() {
        let storage = InMemorySessionStorage::new();
        assert!(storage.events_after("missing", 0).await.unwrap().is_empty());
        assert!(
            storage
                .store_event("missing", SseEvent::message(json!({})))
                .await
                .is_err()
        );
    }
}
