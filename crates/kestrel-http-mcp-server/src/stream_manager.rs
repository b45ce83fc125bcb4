//! SSE writer registry and the streaming loop.
//!
//! One writer per session: registering a new stream supersedes the old one,
//! whose channel closes and whose loop terminates. Events are stored in the
//! session's event log before delivery, so a client that POSTs before
//! opening its GET stream still receives the response on replay.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};

use kestrel_mcp_session_storage::{SessionStorage, SseEvent};

use crate::BoxBody;

/// Stream configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Writer channel capacity
    pub channel_buffer_size: usize,
    /// Interval between keepalive comments
    pub keepalive_interval: Duration,
    /// Maximum events replayed on (re)connect
    pub max_replay_events: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 1000,
            keepalive_interval: Duration::from_secs(15),
            max_replay_events: 100,
        }
    }
}

/// Errors from stream management.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

struct Writer {
    token: u64,
    sender: mpsc::Sender<SseEvent>,
}

/// The per-session SSE handler registry.
pub struct StreamManager {
    storage: Arc<dyn SessionStorage>,
    writers: RwLock<HashMap<String, Writer>>,
    config: StreamConfig,
    next_token: AtomicU64,
}

impl StreamManager {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self::with_config(storage, StreamConfig::default())
    }

    pub fn with_config(storage: Arc<dyn SessionStorage>, config: StreamConfig) -> Self {
        Self {
            storage,
            writers: RwLock::new(HashMap::new()),
            config,
            next_token: AtomicU64::new(1),
        }
    }

    /// Whether a live writer exists for the session.
    pub async fn has_writer(&self, session_id: &str) -> bool {
        self.writers
            .read()
            .await
            .get(session_id)
            .is_some_and(|writer| !writer.sender.is_closed())
    }

    /// Number of registered writers.
    pub async fn writer_count(&self) -> usize {
        self.writers.read().await.len()
    }

    /// Register a writer for the session, superseding any existing one.
    ///
    /// The superseded writer's channel closes, ending its stream loop.
    async fn register(&self, session_id: &str) -> (u64, mpsc::Receiver<SseEvent>) {
        let (sender, receiver) = mpsc::channel(self.config.channel_buffer_size);
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        let mut writers = self.writers.write().await;
        if let Some(previous) = writers.insert(session_id.to_string(), Writer { token, sender }) {
            debug!(session_id, superseded = previous.token, "SSE writer superseded");
        }
        (token, receiver)
    }

    /// Remove the session's writer unconditionally (DELETE, teardown).
    pub async fn unregister(&self, session_id: &str) {
        if self.writers.write().await.remove(session_id).is_some() {
            debug!(session_id, "SSE writer unregistered");
        }
    }

    /// Remove the writer only if it is still the one identified by `token`.
    /// Called from the stream guard when a connection drops, so a newer
    /// writer that superseded it is left untouched.
    async fn unregister_if(&self, session_id: &str, token: u64) {
        let mut writers = self.writers.write().await;
        if writers.get(session_id).is_some_and(|w| w.token == token) {
            writers.remove(session_id);
            debug!(session_id, token, "SSE writer cleaned up");
        }
    }

    /// Store a `message` event and push it to the live writer, if any.
    ///
    /// Returns the assigned event id. A missing or saturated writer is not
    /// an error: the event sits in the log and is delivered on replay.
    pub async fn send_message(&self, session_id: &str, data: Value) -> Result<u64, StreamError> {
        let event = self
            .storage
            .store_event(session_id, SseEvent::message(data))
            .await
            .map_err(|e| StreamError::Storage(e.to_string()))?;
        let event_id = event.id;

        let writers = self.writers.read().await;
        if let Some(writer) = writers.get(session_id) {
            if let Err(err) = writer.sender.try_send(event) {
                warn!(session_id, event_id, error = %err, "live SSE push failed; event kept for replay");
            }
        }
        Ok(event_id)
    }

    /// Open an SSE response for the session.
    ///
    /// Replays stored events after `last_event_id`, then streams live
    /// events interleaved with keepalives until the connection drops or the
    /// writer is superseded.
    pub async fn open_stream(
        self: &Arc<Self>,
        session_id: &str,
        last_event_id: Option<u64>,
    ) -> Result<Response<BoxBody>, StreamError> {
        if self
            .storage
            .load(session_id)
            .await
            .map_err(|e| StreamError::Storage(e.to_string()))?
            .found()
            .is_none()
        {
            return Err(StreamError::SessionNotFound(session_id.to_string()));
        }

        let (token, mut receiver) = self.register(session_id).await;
        debug!(session_id, token, last_event_id, "SSE stream opened");

        let manager = Arc::clone(self);
        let storage = Arc::clone(&self.storage);
        let session = session_id.to_string();
        let keepalive_interval = self.config.keepalive_interval;
        let max_replay = self.config.max_replay_events;

        let event_stream = async_stream::stream! {
            let _guard = StreamGuard {
                manager,
                session_id: session.clone(),
                token,
            };

            // Replay first, oldest to newest.
            match storage.events_after(&session, last_event_id.unwrap_or(0)).await {
                Ok(events) => {
                    for event in events.into_iter().take(max_replay) {
                        yield Ok::<_, std::convert::Infallible>(Frame::data(Bytes::from(event.format())));
                    }
                }
                Err(err) => {
                    warn!(session_id = %session, error = %err, "event replay failed; continuing live");
                }
            }

            let mut keepalive = tokio::time::interval(keepalive_interval);
            keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; skip it so the stream
            // does not open with a keepalive.
            keepalive.tick().await;

            loop {
                tokio::select! {
                    received = receiver.recv() => {
                        match received {
                            Some(event) => {
                                yield Ok(Frame::data(Bytes::from(event.format())));
                            }
                            None => {
                                debug!(session_id = %session, token, "writer channel closed; ending stream");
                                break;
                            }
                        }
                    }
                    _ = keepalive.tick() => {
                        yield Ok(Frame::data(Bytes::from(SseEvent::keepalive().format())));
                    }
                }
            }
        };

        let body = StreamBody::new(event_stream).boxed_unsync();
        let response = Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/event-stream")
            .header("cache-control", "no-cache")
            .header("x-accel-buffering", "no")
            .body(body)
            .expect("static headers are valid");
        Ok(response)
    }
}

/// Removes the registry entry when a stream is dropped, unless a newer
/// writer already superseded it.
struct StreamGuard {
    manager: Arc<StreamManager>,
    session_id: String,
    token: u64,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let manager = Arc::clone(&self.manager);
        let session_id = std::mem::take(&mut self.session_id);
        let token = self.token;
        tokio::spawn(async move {
            manager.unregister_if(&session_id, token).await;
        });
    }
}
