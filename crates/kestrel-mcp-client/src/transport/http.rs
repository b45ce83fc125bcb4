//! Streamable HTTP client transport.
//!
//! POSTs frames to the single MCP endpoint, captures the session id the
//! server mints on initialize, and listens on a GET SSE stream for
//! server-initiated traffic and stream-routed replies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};
use url::Url;

use kestrel_mcp_json_rpc::{JsonRpcFrame, decode, encode, encode_batch};

use crate::error::TransportError;
use crate::transport::sse::SseParser;
use crate::transport::{Transport, TransportEvent};

/// Client side of the streamable HTTP transport.
pub struct HttpTransport {
    endpoint: Url,
    http: reqwest::Client,
    state: Arc<Mutex<HttpState>>,
}

#[derive(Default)]
struct HttpState {
    session_id: Option<String>,
    events_tx: Option<mpsc::Sender<TransportEvent>>,
    sse_task: Option<tokio::task::JoinHandle<()>>,
    shut_down: bool,
}

impl HttpTransport {
    pub fn new(endpoint: &str) -> Result<Self, TransportError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| TransportError::ConnectionFailed(format!("invalid URL: {}", e)))?;
        Ok(Self {
            endpoint,
            http: reqwest::Client::new(),
            state: Arc::new(Mutex::new(HttpState::default())),
        })
    }

    /// The session id captured from the server, once initialized.
    pub async fn session_id(&self) -> Option<String> {
        self.state.lock().await.session_id.clone()
    }

    async fn post(&self, body: String, timeout: Duration) -> Result<(), TransportError> {
        let session_id = { self.state.lock().await.session_id.clone() };

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header("content-type", "application/json")
            .header("accept", "application/json, text/event-stream")
            .timeout(timeout)
            .body(body);
        if let Some(session_id) = &session_id {
            request = request.header("mcp-session-id", session_id);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::SendFailed(e.to_string())
            }
        })?;
        let status = response.status();

        // First response carrying the header establishes the session and
        // starts the SSE listener.
        if let Some(new_session) = response
            .headers()
            .get("mcp-session-id")
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
        {
            self.adopt_session(new_session).await;
        }

        if status.as_u16() == 202 {
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Error bodies are JSON-RPC frames; surface them to the engine
            // so pendings resolve, then report the status.
            self.push_decoded(&body).await;
            return Err(TransportError::HttpStatus(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        if !body.trim().is_empty() {
            self.push_decoded(&body).await;
        }
        Ok(())
    }

    /// Decode a response body and feed its frames to the engine.
    async fn push_decoded(&self, body: &str) {
        let events_tx = { self.state.lock().await.events_tx.clone() };
        let Some(events_tx) = events_tx else { return };

        match decode(body) {
            Ok(frames) => {
                for frame in frames {
                    if events_tx.send(TransportEvent::Frame(frame)).await.is_err() {
                        return;
                    }
                }
            }
            Err(err) => warn!(error = %err, "undecodable response body dropped"),
        }
    }

    async fn adopt_session(&self, session_id: String) {
        let mut state = self.state.lock().await;
        if state.session_id.as_deref() == Some(session_id.as_str()) {
            return;
        }
        debug!(session_id, "session established");
        state.session_id = Some(session_id.clone());

        // One GET stream per session; replaces any previous listener.
        if let Some(old) = state.sse_task.take() {
            old.abort();
        }
        if let Some(events_tx) = state.events_tx.clone() {
            let task = spawn_sse_listener(
                self.http.clone(),
                self.endpoint.clone(),
                session_id,
                events_tx,
            );
            state.sse_task = Some(task);
        }
    }
}

/// GET the session's event stream and pump decoded frames upward,
/// reconnecting with `Last-Event-ID` until the channel closes.
fn spawn_sse_listener(
    http: reqwest::Client,
    endpoint: Url,
    session_id: String,
    events_tx: mpsc::Sender<TransportEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_event_id: Option<String> = None;
        let mut retry_delay = Duration::from_millis(1000);

        loop {
            if events_tx.is_closed() {
                return;
            }

            let mut request = http
                .get(endpoint.clone())
                .header("accept", "text/event-stream")
                .header("mcp-session-id", &session_id);
            if let Some(last) = &last_event_id {
                request = request.header("last-event-id", last.clone());
            }

            let response = match request.send().await {
                Ok(response) if response.status().is_success() => response,
                Ok(response) => {
                    debug!(status = %response.status(), "SSE stream refused");
                    tokio::time::sleep(retry_delay).await;
                    continue;
                }
                Err(err) => {
                    debug!(error = %err, "SSE connect failed");
                    tokio::time::sleep(retry_delay).await;
                    continue;
                }
            };

            let mut parser = SseParser::new();
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        debug!(error = %err, "SSE stream broke");
                        break;
                    }
                };
                let text = String::from_utf8_lossy(&chunk);
                for event in parser.feed(&text) {
                    if let Some(id) = event.id {
                        last_event_id = Some(id);
                    }
                    if let Some(retry) = event.retry {
                        retry_delay = Duration::from_millis(retry);
                    }
                    if event.data.is_empty() {
                        continue;
                    }
                    match decode(&event.data) {
                        Ok(frames) => {
                            for frame in frames {
                                if events_tx.send(TransportEvent::Frame(frame)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "undecodable SSE event dropped");
                        }
                    }
                }
            }

            tokio::time::sleep(retry_delay).await;
        }
    })
}

#[async_trait]
impl Transport for HttpTransport {
    async fn start(&self) -> Result<mpsc::Receiver<TransportEvent>, TransportError> {
        let (events_tx, events_rx) = mpsc::channel(256);
        self.state.lock().await.events_tx = Some(events_tx);
        Ok(events_rx)
    }

    async fn send(&self, frame: &JsonRpcFrame, timeout: Duration) -> Result<(), TransportError> {
        let body = encode(frame).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.post(body, timeout).await
    }

    async fn send_batch(
        &self,
        frames: &[JsonRpcFrame],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let body = encode_batch(frames).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.post(body, timeout).await
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        let (session_id, sse_task) = {
            let mut state = self.state.lock().await;
            if state.shut_down {
                return Ok(());
            }
            state.shut_down = true;
            state.events_tx = None;
            (state.session_id.take(), state.sse_task.take())
        };

        if let Some(task) = sse_task {
            task.abort();
        }

        // Explicit session teardown, best effort.
        if let Some(session_id) = session_id {
            let result = self
                .http
                .delete(self.endpoint.clone())
                .header("mcp-session-id", &session_id)
                .timeout(Duration::from_secs(5))
                .send()
                .await;
            if let Err(err) = result {
                debug!(error = %err, "session DELETE failed during shutdown");
            }
        }
        Ok(())
    }
}
