//! The storage port: session snapshots and the SSE event log.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use kestrel_mcp_protocol::{ClientCapabilities, Implementation, LoggingLevel, ServerCapabilities};

/// A persistable snapshot of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Unique session identifier (UUID v7 for temporal ordering)
    pub session_id: String,
    /// Pinned protocol version, once initialize completed
    pub protocol_version: Option<String>,
    pub client_info: Option<Implementation>,
    pub client_capabilities: Option<ClientCapabilities>,
    pub server_capabilities: Option<ServerCapabilities>,
    /// Session state key-value store (the user frame)
    pub state: HashMap<String, Value>,
    pub log_level: LoggingLevel,
    pub is_initialized: bool,
    /// Creation timestamp (Unix millis)
    pub created_at: u64,
    /// Last activity timestamp (Unix millis)
    pub last_activity: u64,
    /// Time-to-live after last activity, in seconds
    pub ttl_seconds: u64,
}

impl SessionSnapshot {
    /// Create a fresh snapshot with a minted UUID v7 id.
    pub fn new(ttl_seconds: u64) -> Self {
        Self::with_id(Uuid::now_v7().to_string(), ttl_seconds)
    }

    /// Create a snapshot with a caller-chosen id (session resume, tests).
    pub fn with_id(session_id: String, ttl_seconds: u64) -> Self {
        let now = now_millis();
        Self {
            session_id,
            protocol_version: None,
            client_info: None,
            client_capabilities: None,
            server_capabilities: None,
            state: HashMap::new(),
            log_level: LoggingLevel::default(),
            is_initialized: false,
            created_at: now,
            last_activity: now,
            ttl_seconds,
        }
    }

    /// Update the last-activity stamp.
    pub fn touch(&mut self) {
        self.last_activity = now_millis();
    }

    pub fn is_expired(&self) -> bool {
        now_millis().saturating_sub(self.last_activity) > self.ttl_seconds * 1000
    }
}

pub(crate) fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// One event in a session's SSE log.
///
/// `id` is assigned by the store and strictly monotonic per session, which
/// is what makes `Last-Event-ID` replay possible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseEvent {
    pub id: u64,
    /// Unix millis at store time
    pub timestamp: u64,
    pub event_type: String,
    pub data: Value,
    /// Reconnect delay hint in milliseconds
    pub retry: Option<u32>,
}

impl SseEvent {
    /// A `message` event carrying a serialised JSON-RPC frame. The id is
    /// assigned when the event is stored.
    pub fn message(data: Value) -> Self {
        Self {
            id: 0,
            timestamp: now_millis(),
            event_type: "message".to_string(),
            data,
            retry: None,
        }
    }

    /// Format as an SSE wire block.
    ///
    /// Keepalives use comment syntax with no event or id line; everything
    /// else is emitted as `event: message` because mainstream clients
    /// discard custom event names.
    pub fn format(&self) -> String {
        if self.event_type == "keepalive" {
            return ": keepalive\n\n".to_string();
        }

        let mut block = String::new();
        block.push_str(&format!("id: {}\n", self.id));
        block.push_str("event: message\n");
        let data = serde_json::to_string(&self.data).unwrap_or_else(|_| "{}".to_string());
        block.push_str(&format!("data: {}\n", data));
        if let Some(retry) = self.retry {
            block.push_str(&format!("retry: {}\n", retry));
        }
        block.push('\n');
        block
    }

    pub fn keepalive() -> Self {
        Self {
            id: 0,
            timestamp: now_millis(),
            event_type: "keepalive".to_string(),
            data: Value::Null,
            retry: None,
        }
    }
}

/// Outcome of a load: distinguishes "never existed" from "lapsed".
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Found(SessionSnapshot),
    NotFound,
    Expired,
}

impl LoadOutcome {
    pub fn found(self) -> Option<SessionSnapshot> {
        match self {
            LoadOutcome::Found(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

/// Unified error type for storage adapters.
#[derive(Debug, thiserror::Error)]
pub enum SessionStorageError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("maximum sessions limit reached: {0}")]
    MaxSessionsReached(usize),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for SessionStorageError {
    fn from(err: serde_json::Error) -> Self {
        SessionStorageError::Serialization(err.to_string())
    }
}

/// The persistence capability.
///
/// Every operation is idempotent with respect to absence: deleting or
/// updating a missing session succeeds without effect.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Adapter name for logging.
    fn backend_name(&self) -> &'static str;

    /// Persist a full snapshot, replacing any previous one.
    async fn save(&self, snapshot: SessionSnapshot) -> Result<(), SessionStorageError>;

    /// Load a snapshot by id.
    async fn load(&self, session_id: &str) -> Result<LoadOutcome, SessionStorageError>;

    /// Delete a session and its event log.
    async fn delete(&self, session_id: &str) -> Result<(), SessionStorageError>;

    /// Ids of all non-expired sessions.
    async fn list_active(&self) -> Result<Vec<String>, SessionStorageError>;

    /// Reset a session's TTL window.
    async fn update_ttl(&self, session_id: &str, ttl_seconds: u64)
    -> Result<(), SessionStorageError>;

    /// Merge partial state into a stored snapshot's frame.
    async fn update(
        &self,
        session_id: &str,
        partial: HashMap<String, Value>,
    ) -> Result<(), SessionStorageError>;

    /// Drop expired sessions; returns how many were removed.
    async fn cleanup_expired(&self) -> Result<usize, SessionStorageError>;

    /// Append an event to a session's log, assigning its monotonic id.
    async fn store_event(
        &self,
        session_id: &str,
        event: SseEvent,
    ) -> Result<SseEvent, SessionStorageError>;

    /// Events with ids strictly greater than `after_event_id`, in id order.
    async fn events_after(
        &self,
        session_id: &str,
        after_event_id: u64,
    ) -> Result<Vec<SseEvent>, SessionStorageError>;

    /// Trim a session's log below `before_event_id`; returns removed count.
    async fn delete_events_before(
        &self,
        session_id: &str,
        before_event_id: u64,
    ) -> Result<u64, SessionStorageError>;
}
