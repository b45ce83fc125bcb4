//! Per-session state and the session actor.
//!
//! Every logical client session is one actor: a task draining a bounded
//! single-consumer mailbox. All frames for a session pass through that
//! queue, which is the source of the per-session ordering guarantee.
//! Across sessions, actors run concurrently and share nothing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use kestrel_mcp_json_rpc::{
    JsonRpcFrame, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
    RequestIdGenerator,
};
use kestrel_mcp_protocol::{
    CancelledParams, ClientCapabilities, Implementation, InitializeRequest, InitializeResult,
    LoggingLevel, McpError, McpResult, ProgressToken, ProtocolVersion, methods,
};
use kestrel_mcp_session_storage::{SessionSnapshot, SessionStorage};

use crate::auth::AuthContext;
use crate::dispatcher::Dispatcher;
use crate::notifications::{self, ComponentKind, FrameSink};
use crate::prompt::McpPrompt;
use crate::resource::McpResource;
use crate::tool::McpTool;

/// Cooperative cancellation signal observed by handlers via the frame.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tracks cancellation across the transport/actor boundary.
///
/// The transport records cancellations here without touching the session
/// mailbox, so a cancel can interrupt a handler that is currently blocking
/// the queue.
#[derive(Default)]
pub struct CancellationRegistry {
    inner: Mutex<CancellationState>,
}

#[derive(Default)]
struct CancellationState {
    /// Flags for requests currently executing
    live: HashMap<RequestId, CancelFlag>,
    /// Ids cancelled before their request was dequeued
    early: HashSet<RequestId>,
}

impl CancellationRegistry {
    /// Record a cancellation for `id`, live or early.
    pub fn cancel(&self, id: &RequestId) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match state.live.get(id) {
            Some(flag) => flag.cancel(),
            None => {
                state.early.insert(id.clone());
            }
        }
    }

    /// Begin executing `id`. Returns `None` when the id was already
    /// cancelled, in which case the request must not run.
    fn begin(&self, id: &RequestId) -> Option<CancelFlag> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if state.early.remove(id) {
            return None;
        }
        let flag = CancelFlag::default();
        state.live.insert(id.clone(), flag.clone());
        Some(flag)
    }

    /// Finish executing `id`. Returns whether it was cancelled mid-flight.
    fn finish(&self, id: &RequestId) -> bool {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state
            .live
            .remove(id)
            .map(|flag| flag.is_cancelled())
            .unwrap_or(false)
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Per-session user-accessible state handed to every handler.
pub struct Frame {
    session_id: String,
    state: HashMap<String, Value>,
    auth: Option<AuthContext>,
    log_level: LoggingLevel,
    tools: HashMap<String, Arc<dyn McpTool>>,
    prompts: HashMap<String, Arc<dyn McpPrompt>>,
    resources: Vec<Arc<dyn McpResource>>,
    subscriptions: HashSet<String>,
    progress_token: Option<ProgressToken>,
    cancel_flag: Option<CancelFlag>,
    sink: Arc<dyn FrameSink>,
}

impl Frame {
    fn new(session_id: String, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            session_id,
            state: HashMap::new(),
            auth: None,
            log_level: LoggingLevel::default(),
            tools: HashMap::new(),
            prompts: HashMap::new(),
            resources: Vec::new(),
            subscriptions: HashSet::new(),
            progress_token: None,
            cancel_flag: None,
            sink,
        }
    }

    /// A frame wired to a null sink, for component unit tests.
    pub fn for_tests(session_id: &str) -> Self {
        Self::new(session_id.to_string(), Arc::new(notifications::NullSink))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn get_state(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: Value) {
        self.state.insert(key.into(), value);
    }

    pub fn remove_state(&mut self, key: &str) -> Option<Value> {
        self.state.remove(key)
    }

    pub fn log_level(&self) -> LoggingLevel {
        self.log_level
    }

    pub fn set_log_level(&mut self, level: LoggingLevel) {
        self.log_level = level;
    }

    pub fn authenticated(&self) -> bool {
        self.auth.is_some()
    }

    pub fn auth(&self) -> Option<&AuthContext> {
        self.auth.as_ref()
    }

    pub fn scopes(&self) -> &[String] {
        self.auth.as_ref().map(|a| a.scopes.as_slice()).unwrap_or(&[])
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.auth.as_ref().is_some_and(|a| a.has_scope(scope))
    }

    pub(crate) fn set_auth(&mut self, auth: AuthContext) {
        self.auth = Some(auth);
    }

    /// Whether the current request has been cancelled. Long handlers should
    /// poll this and bail out early.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(CancelFlag::is_cancelled)
    }

    /// Emit `notifications/progress` for the current request.
    ///
    /// A request without a progress token produces nothing.
    pub async fn notify_progress(&self, progress: f64, total: Option<f64>) {
        let Some(token) = &self.progress_token else {
            return;
        };
        let frame = notifications::progress(token, progress, total).into();
        if let Err(err) = self.sink.send(&self.session_id, frame).await {
            warn!(session_id = %self.session_id, error = %err, "progress delivery failed");
        }
    }

    /// Emit `notifications/message` if `level` passes the session's floor.
    pub async fn log(&self, level: LoggingLevel, logger: Option<&str>, data: Value) {
        if !self.log_level.allows(level) {
            return;
        }
        let frame = notifications::log_message(level, logger, data).into();
        if let Err(err) = self.sink.send(&self.session_id, frame).await {
            warn!(session_id = %self.session_id, error = %err, "log delivery failed");
        }
    }

    /// Add a tool without announcing it; used from the init hook, before
    /// the client can have listed anything.
    pub fn add_tool(&mut self, tool: Arc<dyn McpTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn add_prompt(&mut self, prompt: Arc<dyn McpPrompt>) {
        self.prompts.insert(prompt.name().to_string(), prompt);
    }

    pub fn add_resource(&mut self, resource: Arc<dyn McpResource>) {
        self.resources.push(resource);
    }

    /// Register a tool at runtime and announce the change.
    pub async fn register_tool(&mut self, tool: Arc<dyn McpTool>) {
        self.tools.insert(tool.name().to_string(), tool);
        self.announce(ComponentKind::Tool).await;
    }

    pub async fn register_prompt(&mut self, prompt: Arc<dyn McpPrompt>) {
        self.prompts.insert(prompt.name().to_string(), prompt);
        self.announce(ComponentKind::Prompt).await;
    }

    pub async fn register_resource(&mut self, resource: Arc<dyn McpResource>) {
        self.resources.push(resource);
        self.announce(ComponentKind::Resource).await;
    }

    async fn announce(&self, kind: ComponentKind) {
        let frame = notifications::list_changed(kind).into();
        if let Err(err) = self.sink.send(&self.session_id, frame).await {
            warn!(session_id = %self.session_id, error = %err, "list_changed delivery failed");
        }
    }

    pub fn runtime_tools(&self) -> &HashMap<String, Arc<dyn McpTool>> {
        &self.tools
    }

    pub fn runtime_prompts(&self) -> &HashMap<String, Arc<dyn McpPrompt>> {
        &self.prompts
    }

    pub fn runtime_resources(&self) -> &[Arc<dyn McpResource>] {
        &self.resources
    }

    pub fn subscribe(&mut self, uri: impl Into<String>) {
        self.subscriptions.insert(uri.into());
    }

    pub fn unsubscribe(&mut self, uri: &str) {
        self.subscriptions.remove(uri);
    }

    pub fn is_subscribed(&self, uri: &str) -> bool {
        self.subscriptions.contains(uri)
    }

    /// Notify the client that a subscribed resource changed. Delivery is
    /// at-most-once; unsubscribed URIs produce nothing.
    pub async fn notify_resource_updated(&self, uri: &str) {
        if !self.is_subscribed(uri) {
            return;
        }
        let frame = notifications::resource_updated(uri).into();
        if let Err(err) = self.sink.send(&self.session_id, frame).await {
            warn!(session_id = %self.session_id, error = %err, "resource update delivery failed");
        }
    }
}

/// Commands accepted by a session actor.
enum SessionCommand {
    HandleFrame {
        frame: JsonRpcFrame,
        bearer: Option<String>,
        reply: oneshot::Sender<Option<JsonRpcFrame>>,
    },
    /// Emit a server-initiated request and park its completer.
    RequestClient {
        id: RequestId,
        method: String,
        params: Value,
        completer: oneshot::Sender<McpResult<Value>>,
    },
    /// Drop a parked server-initiated request (timeout or caller cancel)
    /// and tell the client via `notifications/cancelled`.
    AbandonClientRequest { id: RequestId, reason: String },
    Close,
}

/// Failures pushing work into a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionSendError {
    #[error("session mailbox full")]
    Overloaded,
    #[error("session actor stopped")]
    Stopped,
}

/// The shared handle to one session actor.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    sender: mpsc::Sender<SessionCommand>,
    cancellations: Arc<CancellationRegistry>,
    ids: Arc<RequestIdGenerator>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Route one inbound frame through the session.
    ///
    /// `notifications/cancelled` is honoured immediately, without queueing,
    /// so it can reach a handler that currently blocks the mailbox.
    pub async fn handle_frame(
        &self,
        frame: JsonRpcFrame,
        bearer: Option<String>,
    ) -> Result<Option<JsonRpcFrame>, SessionSendError> {
        if let JsonRpcFrame::Notification(notification) = &frame {
            if notification.method == methods::NOTIFICATION_CANCELLED {
                if let Ok(params) =
                    serde_json::from_value::<CancelledParams>(params_of(notification))
                {
                    debug!(
                        session_id = %self.session_id,
                        request_id = %params.request_id,
                        reason = params.reason.as_deref().unwrap_or("unspecified"),
                        "request cancelled by peer"
                    );
                    self.cancellations.cancel(&params.request_id);
                }
                return Ok(None);
            }
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.try_send(SessionCommand::HandleFrame {
            frame,
            bearer,
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| SessionSendError::Stopped)
    }

    /// Issue a server-to-client request (sampling, roots) and await the
    /// client's reply, with the same timeout/cancel semantics as the client
    /// engine.
    pub async fn request_from_client(
        &self,
        method: &str,
        params: Value,
        timeout: std::time::Duration,
    ) -> McpResult<Value> {
        let id = self.ids.next_id();
        let (completer, receiver) = oneshot::channel();

        self.try_send(SessionCommand::RequestClient {
            id: id.clone(),
            method: method.to_string(),
            params,
            completer,
        })
        .map_err(|_| McpError::internal("session unavailable"))?;

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpError::internal("session_restarted")),
            Err(_) => {
                let _ = self.try_send(SessionCommand::AbandonClientRequest {
                    id,
                    reason: "timeout".to_string(),
                });
                Err(McpError::Timeout)
            }
        }
    }

    /// Stop the actor. Queued work is answered before the stop is observed.
    pub async fn close(&self) {
        let _ = self.sender.send(SessionCommand::Close).await;
    }

    fn try_send(&self, command: SessionCommand) -> Result<(), SessionSendError> {
        self.sender.try_send(command).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SessionSendError::Overloaded,
            mpsc::error::TrySendError::Closed(_) => SessionSendError::Stopped,
        })
    }
}

fn params_of(notification: &JsonRpcNotification) -> Value {
    notification
        .params
        .as_ref()
        .map(|p| p.to_value())
        .unwrap_or(Value::Null)
}

/// One session's actor: state, mailbox loop, and dispatch glue.
pub struct SessionActor {
    state: SessionState,
    frame: Frame,
    protocol_version: Option<ProtocolVersion>,
    client_info: Option<Implementation>,
    client_capabilities: Option<ClientCapabilities>,
    pending_client_requests: HashMap<RequestId, oneshot::Sender<McpResult<Value>>>,
    dispatcher: Arc<Dispatcher>,
    storage: Arc<dyn SessionStorage>,
    sink: Arc<dyn FrameSink>,
    cancellations: Arc<CancellationRegistry>,
    ttl_seconds: u64,
}

impl SessionActor {
    /// Spawn an actor for `snapshot`, returning its handle.
    pub fn spawn(
        snapshot: SessionSnapshot,
        dispatcher: Arc<Dispatcher>,
        storage: Arc<dyn SessionStorage>,
        sink: Arc<dyn FrameSink>,
        mailbox_capacity: usize,
    ) -> SessionHandle {
        let session_id = snapshot.session_id.clone();
        let cancellations = Arc::new(CancellationRegistry::default());
        let (sender, receiver) = mpsc::channel(mailbox_capacity);

        let mut frame = Frame::new(session_id.clone(), Arc::clone(&sink));
        frame.state = snapshot.state.clone();
        frame.log_level = snapshot.log_level;

        let actor = SessionActor {
            // Restored sessions restart the handshake from scratch.
            state: SessionState::Uninitialized,
            frame,
            protocol_version: None,
            client_info: None,
            client_capabilities: None,
            pending_client_requests: HashMap::new(),
            dispatcher,
            storage,
            sink,
            cancellations: Arc::clone(&cancellations),
            ttl_seconds: snapshot.ttl_seconds,
        };

        tokio::spawn(actor.run(receiver));

        SessionHandle {
            session_id,
            sender,
            cancellations,
            ids: Arc::new(RequestIdGenerator::new()),
        }
    }

    async fn run(mut self, mut receiver: mpsc::Receiver<SessionCommand>) {
        info!(session_id = %self.frame.session_id, "session actor started");

        while let Some(command) = receiver.recv().await {
            match command {
                SessionCommand::HandleFrame {
                    frame,
                    bearer,
                    reply,
                } => {
                    let response = self.handle_frame(frame, bearer).await;
                    let _ = reply.send(response);
                }
                SessionCommand::RequestClient {
                    id,
                    method,
                    params,
                    completer,
                } => {
                    self.emit_client_request(id, method, params, completer).await;
                }
                SessionCommand::AbandonClientRequest { id, reason } => {
                    self.abandon_client_request(id, reason).await;
                }
                SessionCommand::Close => {
                    info!(session_id = %self.frame.session_id, "session closed");
                    break;
                }
            }
        }

        self.state = SessionState::Closed;
        // Parked server-initiated requests resolve with an error rather
        // than hanging their callers.
        for (_, completer) in self.pending_client_requests.drain() {
            let _ = completer.send(Err(McpError::internal("session closed")));
        }
    }

    async fn handle_frame(
        &mut self,
        frame: JsonRpcFrame,
        bearer: Option<String>,
    ) -> Option<JsonRpcFrame> {
        match frame {
            JsonRpcFrame::Request(request) => self.handle_request(request, bearer).await,
            JsonRpcFrame::Notification(notification) => {
                self.handle_notification(notification).await;
                None
            }
            JsonRpcFrame::Response(response) => {
                self.complete_client_request(response.id, Ok(response.result.into_value()));
                None
            }
            JsonRpcFrame::Error(err) => {
                if let Some(id) = err.id.clone() {
                    self.complete_client_request(
                        id,
                        Err(McpError::execution(err.error.message.clone())),
                    );
                }
                None
            }
        }
    }

    async fn handle_request(
        &mut self,
        request: JsonRpcRequest,
        bearer: Option<String>,
    ) -> Option<JsonRpcFrame> {
        let id = request.id.clone();
        let method = request.method.clone();

        let reply = match self.state {
            SessionState::Uninitialized if method == methods::INITIALIZE => {
                self.handle_initialize(&request).await
            }
            SessionState::Uninitialized => Err(McpError::invalid_request(format!(
                "method '{}' before initialize",
                method
            ))),
            SessionState::Initializing => Err(McpError::invalid_request(format!(
                "method '{}' during initialization",
                method
            ))),
            SessionState::Closed => Err(McpError::invalid_request("session closed")),
            SessionState::Ready if method == methods::INITIALIZE => {
                Err(McpError::invalid_request("session already initialized"))
            }
            SessionState::Ready => {
                // Capability gate, before anything touches a handler.
                if self.dispatcher.capabilities().gate(&method) == Some(false) {
                    Err(McpError::method_not_found(method.clone()))
                } else {
                    self.dispatch_ready(request, bearer).await?
                }
            }
        };

        self.touch().await;

        Some(match reply {
            Ok(result) => JsonRpcResponse::new(id, result).into(),
            Err(err) => {
                warn!(
                    session_id = %self.frame.session_id,
                    method,
                    request_id = %id,
                    error = %err,
                    "request failed"
                );
                err.to_json_rpc(Some(id)).into()
            }
        })
    }

    /// Dispatch one READY-state request. Returns `None` (outer) when the
    /// request was cancelled and no response may be emitted.
    async fn dispatch_ready(
        &mut self,
        request: JsonRpcRequest,
        bearer: Option<String>,
    ) -> Option<McpResult<Value>> {
        // Attach a fresh auth context when the transport presented a token.
        if let (Some(token), Some(validator)) =
            (bearer.as_deref(), self.dispatcher.token_validator())
        {
            match validator.validate(token).await {
                Ok(context) => self.frame.set_auth(context),
                Err(err) => {
                    return Some(Err(McpError::unauthorized_with_challenge(
                        err.to_string(),
                        &self.dispatcher.auth_challenge(),
                    )));
                }
            }
        }

        let Some(cancel_flag) = self.cancellations.begin(&request.id) else {
            debug!(
                session_id = %self.frame.session_id,
                request_id = %request.id,
                "request cancelled before dispatch"
            );
            return None;
        };

        self.frame.progress_token = extract_progress_token(&request);
        self.frame.cancel_flag = Some(cancel_flag);

        let dispatcher = Arc::clone(&self.dispatcher);
        let outcome = std::panic::AssertUnwindSafe(dispatcher.dispatch(&request, &mut self.frame))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                error!(
                    session_id = %self.frame.session_id,
                    method = %request.method,
                    "handler panicked"
                );
                Err(McpError::execution("handler panicked"))
            });

        self.frame.progress_token = None;
        self.frame.cancel_flag = None;

        if self.cancellations.finish(&request.id) {
            debug!(
                session_id = %self.frame.session_id,
                request_id = %request.id,
                "response suppressed for cancelled request"
            );
            return None;
        }
        Some(outcome)
    }

    async fn handle_initialize(&mut self, request: &JsonRpcRequest) -> McpResult<Value> {
        let params: InitializeRequest = serde_json::from_value(request.params_value())
            .map_err(|e| McpError::invalid_params(format!("malformed initialize params: {}", e)))?;

        let supported = self.dispatcher.supported_versions();
        let Some(version) = ProtocolVersion::negotiate(&params.protocol_version, supported) else {
            return Err(McpError::InvalidParams {
                message: format!(
                    "unsupported protocol version '{}'",
                    params.protocol_version
                ),
                data: Some(serde_json::json!({
                    "supported": supported.iter().map(|v| v.as_str()).collect::<Vec<_>>(),
                })),
            });
        };

        info!(
            session_id = %self.frame.session_id,
            client = %params.client_info.name,
            version = %version,
            "initialize accepted"
        );

        self.protocol_version = Some(version);
        self.client_info = Some(params.client_info);
        self.client_capabilities = Some(params.capabilities);
        self.state = SessionState::Initializing;
        self.persist().await;

        let result = InitializeResult::new(
            version,
            self.dispatcher.capabilities().clone(),
            self.dispatcher.server_info().clone(),
        );
        let result = match self.dispatcher.instructions() {
            Some(instructions) => result.with_instructions(instructions),
            None => result,
        };
        serde_json::to_value(result).map_err(McpError::from)
    }

    async fn handle_notification(&mut self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            methods::NOTIFICATION_INITIALIZED => match self.state {
                SessionState::Initializing => {
                    self.state = SessionState::Ready;
                    info!(session_id = %self.frame.session_id, "session ready");
                    if let Some(hook) = self.dispatcher.init_hook() {
                        let client_info = self.client_info.clone();
                        hook(client_info.as_ref(), &mut self.frame);
                    }
                    self.persist().await;
                }
                state => {
                    warn!(
                        session_id = %self.frame.session_id,
                        ?state,
                        "unexpected notifications/initialized"
                    );
                }
            },
            methods::NOTIFICATION_PROGRESS => {
                // Client-side progress for server-initiated requests is
                // accepted but unused.
                debug!(session_id = %self.frame.session_id, "client progress ignored");
            }
            other => {
                debug!(session_id = %self.frame.session_id, method = other, "notification ignored");
            }
        }
        self.touch().await;
    }

    async fn emit_client_request(
        &mut self,
        id: RequestId,
        method: String,
        params: Value,
        completer: oneshot::Sender<McpResult<Value>>,
    ) {
        // Sampling and roots requests are gated on the client's advertised
        // capabilities, symmetrically with the server-side gates.
        let allowed = match method.as_str() {
            methods::SAMPLING_CREATE_MESSAGE => self
                .client_capabilities
                .as_ref()
                .is_some_and(ClientCapabilities::supports_sampling),
            methods::ROOTS_LIST => self
                .client_capabilities
                .as_ref()
                .is_some_and(ClientCapabilities::supports_roots),
            _ => true,
        };
        if !allowed {
            let _ = completer.send(Err(McpError::method_not_found(method)));
            return;
        }
        if self.state != SessionState::Ready {
            let _ = completer.send(Err(McpError::internal("session not ready")));
            return;
        }

        let request = JsonRpcRequest::with_value_params(id.clone(), method, params);
        match self
            .sink
            .send(&self.frame.session_id, request.into())
            .await
        {
            Ok(()) => {
                self.pending_client_requests.insert(id, completer);
            }
            Err(err) => {
                let _ = completer.send(Err(err));
            }
        }
    }

    async fn abandon_client_request(&mut self, id: RequestId, reason: String) {
        if self.pending_client_requests.remove(&id).is_none() {
            return;
        }
        let notification = JsonRpcNotification::with_value_params(
            methods::NOTIFICATION_CANCELLED,
            serde_json::to_value(CancelledParams::new(id, reason)).unwrap_or_default(),
        );
        if let Err(err) = self
            .sink
            .send(&self.frame.session_id, notification.into())
            .await
        {
            warn!(session_id = %self.frame.session_id, error = %err, "cancel notification failed");
        }
    }

    fn complete_client_request(&mut self, id: RequestId, result: McpResult<Value>) {
        match self.pending_client_requests.remove(&id) {
            Some(completer) => {
                let _ = completer.send(result);
            }
            None => {
                // Late replies after timeout/cancel are dropped silently.
                debug!(
                    session_id = %self.frame.session_id,
                    request_id = %id,
                    "reply for unknown pending request dropped"
                );
            }
        }
    }

    async fn persist(&self) {
        let mut snapshot = SessionSnapshot::with_id(self.frame.session_id.clone(), self.ttl_seconds);
        snapshot.protocol_version = self.protocol_version.map(|v| v.as_str().to_string());
        snapshot.client_info = self.client_info.clone();
        snapshot.client_capabilities = self.client_capabilities.clone();
        snapshot.server_capabilities = Some(self.dispatcher.capabilities().clone());
        snapshot.state = self.frame.state.clone();
        snapshot.log_level = self.frame.log_level;
        snapshot.is_initialized = self.state == SessionState::Ready;

        if let Err(err) = self.storage.save(snapshot).await {
            warn!(session_id = %self.frame.session_id, error = %err, "session persist failed");
        }
    }

    async fn touch(&self) {
        if let Err(err) = self
            .storage
            .update(&self.frame.session_id, HashMap::new())
            .await
        {
            debug!(session_id = %self.frame.session_id, error = %err, "activity touch failed");
        }
    }
}

/// Progress tokens ride in `params._meta.progressToken`.
fn extract_progress_token(request: &JsonRpcRequest) -> Option<ProgressToken> {
    request
        .get_param("_meta")
        .and_then(|meta| meta.get("progressToken"))
        .and_then(|token| serde_json::from_value(token.clone()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::default();
        assert!(!flag.is_cancelled());
        flag.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_cancellation_registry_live_and_early() {
        let registry = CancellationRegistry::default();
        let id = RequestId::Number(1);

        // Live request: begin, cancel mid-flight, finish reports it.
        let flag = registry.begin(&id).unwrap();
        registry.cancel(&id);
        assert!(flag.is_cancelled());
        assert!(registry.finish(&id));

        // Early cancel: begin refuses to start the request.
        let early = RequestId::Number(2);
        registry.cancel(&early);
        assert!(registry.begin(&early).is_none());

        // And the early mark is consumed.
        assert!(registry.begin(&early).is_some());
    }

    #[test]
    fn test_progress_token_extraction() {
        let request = JsonRpcRequest::with_value_params(
            RequestId::Number(1),
            "tools/call",
            serde_json::json!({
                "name": "slow",
                "_meta": {"progressToken": "t1"}
            }),
        );
        assert_eq!(
            extract_progress_token(&request),
            Some(ProgressToken::from("t1"))
        );

        let without = JsonRpcRequest::new(RequestId::Number(2), "ping", None);
        assert!(extract_progress_token(&without).is_none());
    }

    #[test]
    fn test_frame_state_access() {
        let mut frame = Frame::for_tests("s-1");
        frame.set_state("count", serde_json::json!(1));
        assert_eq!(frame.get_state("count"), Some(&serde_json::json!(1)));
        assert_eq!(frame.remove_state("count"), Some(serde_json::json!(1)));
        assert!(frame.get_state("count").is_none());
    }

    #[test]
    fn test_frame_scope_surface() {
        let mut frame = Frame::for_tests("s-1");
        assert!(!frame.authenticated());
        assert!(frame.scopes().is_empty());

        frame.set_auth(crate::auth::AuthContext::new("u").with_scopes(["read"]));
        assert!(frame.authenticated());
        assert!(frame.has_scope("read"));
        assert!(!frame.has_scope("write"));
    }
}
