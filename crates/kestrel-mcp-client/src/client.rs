//! The client protocol engine.
//!
//! One pending-table entry per in-flight request id, resolved by exactly
//! one of: matching response, matching error, local timeout, or local
//! cancel. Timeout and cancel both send `notifications/cancelled` and then
//! silently drop any late reply.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc, oneshot};
use tracing::{debug, info, warn};

use kestrel_mcp_json_rpc::{
    JsonRpcError, JsonRpcFrame, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
    RequestIdGenerator,
};
use kestrel_mcp_protocol::{
    CallToolResult, CancelledParams, CompleteResult, CompletionReference, GetPromptResult,
    InitializeRequest, InitializeResult, ListPromptsResult, ListResourcesResult, ListToolsResult,
    LoggingLevel, McpError, ProgressParams, ProgressToken, ProtocolVersion, ReadResourceResult,
    ServerCapabilities, methods,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, TransportError};
use crate::transport::{Transport, TransportEvent};

/// Callback invoked for each `notifications/progress` on a call.
pub type ProgressCallback = Arc<dyn Fn(f64, Option<f64>) + Send + Sync>;

/// Callback invoked for each `notifications/message` from the server.
pub type LogCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Cooperative cancel trigger for one call.
#[derive(Clone, Default)]
pub struct CancelHandle {
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.notify.notify_waiters();
    }
}

/// Per-call options.
#[derive(Clone, Default)]
pub struct CallOptions {
    /// Overrides the config-level request timeout
    pub timeout: Option<Duration>,
    pub progress: Option<ProgressCallback>,
    pub cancel: Option<CancelHandle>,
}

impl CallOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_cancel(mut self, handle: CancelHandle) -> Self {
        self.cancel = Some(handle);
        self
    }
}

struct Pending {
    method: String,
    progress_token: Option<ProgressToken>,
    completer: oneshot::Sender<ClientResult<Value>>,
}

#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<RequestId, Pending>>,
    progress: Mutex<HashMap<ProgressToken, ProgressCallback>>,
    log_callback: Mutex<Option<LogCallback>>,
    negotiated: Mutex<Option<(ProtocolVersion, ServerCapabilities)>>,
    initialized: AtomicBool,
}

impl Shared {
    /// Resolve a pending entry; a missing id means a late or alien reply,
    /// which is dropped.
    fn complete(&self, id: &RequestId, outcome: ClientResult<Value>) {
        let entry = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.remove(id)
        };
        match entry {
            Some(entry) => {
                if let Some(token) = &entry.progress_token {
                    self.progress
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(token);
                }
                let _ = entry.completer.send(outcome);
            }
            None => {
                debug!(request_id = %id, "late reply dropped");
            }
        }
    }

    /// Remove an entry without completing it (timeout/cancel paths own the
    /// caller-visible outcome).
    fn abandon(&self, id: &RequestId) -> bool {
        let entry = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.remove(id)
        };
        match entry {
            Some(entry) => {
                if let Some(token) = &entry.progress_token {
                    self.progress
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(token);
                }
                true
            }
            None => false,
        }
    }

    fn fail_all(&self, reason: &str) {
        let entries: Vec<Pending> = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            debug!(method = %entry.method, reason, "pending failed");
            let _ = entry
                .completer
                .send(Err(ClientError::Transport(TransportError::Closed)));
        }
        self.progress
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// The MCP client.
pub struct McpClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    ids: RequestIdGenerator,
    shared: Arc<Shared>,
}

impl McpClient {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            ids: RequestIdGenerator::new(),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Connect the transport and run the initialize handshake.
    pub async fn connect(&self) -> ClientResult<()> {
        let events = self.transport.start().await?;
        self.spawn_router(events);
        self.initialize().await
    }

    /// Pinned protocol version, once initialized.
    pub fn negotiated_version(&self) -> Option<ProtocolVersion> {
        self.shared
            .negotiated
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|(version, _)| *version)
    }

    /// Server capabilities, once initialized.
    pub fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.shared
            .negotiated
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|(_, capabilities)| capabilities.clone())
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::SeqCst)
    }

    /// Install the `notifications/message` callback.
    pub fn on_log(&self, callback: LogCallback) {
        *self
            .shared
            .log_callback
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(callback);
    }

    async fn initialize(&self) -> ClientResult<()> {
        let advertised = *self
            .config
            .protocol_versions
            .first()
            .unwrap_or(&ProtocolVersion::LATEST);
        let params = InitializeRequest::new(
            advertised,
            self.config.capabilities.clone(),
            self.config.client_info.clone(),
        );

        info!(version = %advertised, "initializing MCP session");
        let result = self
            .execute(
                methods::INITIALIZE,
                serde_json::to_value(&params).map_err(McpError::from)?,
                CallOptions::default(),
            )
            .await?;
        let result: InitializeResult =
            serde_json::from_value(result).map_err(McpError::from)?;

        // The server may answer with a narrower version; accept only what
        // we advertised support for.
        let Some(version) = ProtocolVersion::negotiate(
            &result.protocol_version,
            &self.config.protocol_versions,
        ) else {
            return Err(ClientError::Protocol(McpError::invalid_params(format!(
                "server pinned unsupported version '{}'",
                result.protocol_version
            ))));
        };

        *self
            .shared
            .negotiated
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some((version, result.capabilities));

        self.notify(methods::NOTIFICATION_INITIALIZED, json!({})).await?;
        self.shared.initialized.store(true, Ordering::SeqCst);
        info!(version = %version, server = %result.server_info.name, "session initialized");
        Ok(())
    }

    /// Issue a request and await its resolution.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        options: CallOptions,
    ) -> ClientResult<Value> {
        if !self.is_initialized() {
            return Err(ClientError::NotInitialized);
        }

        // Capability gate: fail locally, no wire traffic.
        if let Some(capabilities) = self.server_capabilities() {
            if capabilities.gate(method) == Some(false) {
                return Err(ClientError::MethodNotSupported(method.to_string()));
            }
        }

        self.execute(method, params, options).await
    }

    /// Send a notification (fire and forget).
    pub async fn notify(&self, method: &str, params: Value) -> ClientResult<()> {
        let frame = JsonRpcNotification::with_value_params(method, params).into();
        self.transport
            .send(&frame, self.config.request_timeout)
            .await?;
        Ok(())
    }

    /// Issue several requests as one wire batch.
    ///
    /// Pendings for every gated-in entry are installed before the batch is
    /// handed to the transport; results come back in input order. The
    /// batch shares one deadline.
    pub async fn batch_call(
        &self,
        calls: Vec<(String, Value)>,
        timeout: Option<Duration>,
    ) -> ClientResult<Vec<ClientResult<Value>>> {
        if !self.is_initialized() {
            return Err(ClientError::NotInitialized);
        }
        let deadline = timeout.unwrap_or(self.config.request_timeout);
        let capabilities = self.server_capabilities();

        let mut slots: Vec<Result<(RequestId, oneshot::Receiver<ClientResult<Value>>), ClientError>> =
            Vec::with_capacity(calls.len());
        let mut frames = Vec::new();

        {
            // One lock scope: all inner pendings appear atomically.
            let mut pending = self
                .shared
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            for (method, params) in &calls {
                if let Some(capabilities) = &capabilities {
                    if capabilities.gate(method) == Some(false) {
                        slots.push(Err(ClientError::MethodNotSupported(method.clone())));
                        continue;
                    }
                }
                let id = self.ids.next_id();
                let (completer, receiver) = oneshot::channel();
                pending.insert(
                    id.clone(),
                    Pending {
                        method: method.clone(),
                        progress_token: None,
                        completer,
                    },
                );
                frames.push(JsonRpcFrame::Request(JsonRpcRequest::with_value_params(
                    id.clone(),
                    method.clone(),
                    params.clone(),
                )));
                slots.push(Ok((id, receiver)));
            }
        }

        if !frames.is_empty() {
            if let Err(err) = self.transport.send_batch(&frames, deadline).await {
                for slot in &slots {
                    if let Ok((id, _)) = slot {
                        self.shared.abandon(id);
                    }
                }
                return Err(err.into());
            }
        }

        // One deadline for the whole batch, not per entry.
        let batch_deadline = tokio::time::Instant::now() + deadline;
        let mut outcomes = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                Err(err) => outcomes.push(Err(err)),
                Ok((id, receiver)) => {
                    match tokio::time::timeout_at(batch_deadline, receiver).await {
                        Ok(Ok(outcome)) => outcomes.push(outcome),
                        Ok(Err(_)) => {
                            outcomes.push(Err(ClientError::Transport(TransportError::Closed)))
                        }
                        Err(_) => {
                            if self.shared.abandon(&id) {
                                self.send_cancelled(&id, "timeout").await;
                            }
                            outcomes.push(Err(ClientError::Timeout));
                        }
                    }
                }
            }
        }
        Ok(outcomes)
    }

    /// Close the transport and fail whatever is still pending.
    pub async fn shutdown(&self) -> ClientResult<()> {
        self.shared.fail_all("client shutdown");
        self.transport.shutdown().await?;
        Ok(())
    }

    async fn execute(
        &self,
        method: &str,
        mut params: Value,
        options: CallOptions,
    ) -> ClientResult<Value> {
        let timeout = options.timeout.unwrap_or(self.config.request_timeout);
        let id = self.ids.next_id();

        // A progress callback mints a token and rides it in `_meta`; the
        // server must not emit progress without one.
        let progress_token = if let Some(callback) = options.progress {
            let token = ProgressToken::String(self.ids.next_progress_token());
            if let Value::Object(map) = &mut params {
                let meta = map
                    .entry("_meta")
                    .or_insert_with(|| Value::Object(Default::default()));
                if let Value::Object(meta) = meta {
                    meta.insert("progressToken".to_string(), json!(token));
                }
            }
            self.shared
                .progress
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(token.clone(), callback);
            Some(token)
        } else {
            None
        };

        let (completer, receiver) = oneshot::channel();
        {
            let mut pending = self
                .shared
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            pending.insert(
                id.clone(),
                Pending {
                    method: method.to_string(),
                    progress_token,
                    completer,
                },
            );
        }

        let frame = JsonRpcRequest::with_value_params(id.clone(), method, params).into();
        if let Err(err) = self.transport.send(&frame, timeout).await {
            self.shared.abandon(&id);
            // A send that outlived its deadline counts as the call timing
            // out: tell the server to forget the id.
            if matches!(err, TransportError::Timeout) {
                self.send_cancelled(&id, "timeout").await;
                return Err(ClientError::Timeout);
            }
            return Err(err.into());
        }

        let cancel = options.cancel.unwrap_or_default();
        tokio::select! {
            outcome = receiver => {
                outcome.unwrap_or(Err(ClientError::Transport(TransportError::Closed)))
            }
            _ = tokio::time::sleep(timeout) => {
                if self.shared.abandon(&id) {
                    self.send_cancelled(&id, "timeout").await;
                }
                Err(ClientError::Timeout)
            }
            _ = cancel.notify.notified() => {
                if self.shared.abandon(&id) {
                    self.send_cancelled(&id, "cancelled").await;
                }
                Err(ClientError::Cancelled)
            }
        }
    }

    async fn send_cancelled(&self, id: &RequestId, reason: &str) {
        let params = match serde_json::to_value(CancelledParams::new(id.clone(), reason)) {
            Ok(params) => params,
            Err(_) => return,
        };
        let frame = JsonRpcNotification::with_value_params(
            methods::NOTIFICATION_CANCELLED,
            params,
        )
        .into();
        if let Err(err) = self.transport.send(&frame, Duration::from_secs(5)).await {
            warn!(request_id = %id, error = %err, "cancellation notice failed");
        }
    }

    fn spawn_router(&self, mut events: mpsc::Receiver<TransportEvent>) {
        let shared = Arc::clone(&self.shared);
        let transport = Arc::clone(&self.transport);
        let config = self.config.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::Frame(JsonRpcFrame::Response(response)) => {
                        shared.complete(&response.id.clone(), Ok(response.result.into_value()));
                    }
                    TransportEvent::Frame(JsonRpcFrame::Error(error)) => {
                        route_error(&shared, error);
                    }
                    TransportEvent::Frame(JsonRpcFrame::Notification(notification)) => {
                        route_notification(&shared, notification);
                    }
                    TransportEvent::Frame(JsonRpcFrame::Request(request)) => {
                        // Server-initiated request; answer off the router
                        // task so slow handlers don't stall routing.
                        let transport = Arc::clone(&transport);
                        let config = config.clone();
                        tokio::spawn(async move {
                            let reply = answer_server_request(&config, request).await;
                            if let Err(err) =
                                transport.send(&reply, Duration::from_secs(30)).await
                            {
                                warn!(error = %err, "reply to server request failed");
                            }
                        });
                    }
                    TransportEvent::Closed => {
                        debug!("transport closed; failing pendings");
                        shared.fail_all("transport closed");
                        break;
                    }
                }
            }
        });
    }
}

fn route_error(shared: &Shared, error: JsonRpcError) {
    let Some(id) = error.id.clone() else {
        warn!(code = error.error.code, "unkeyed error frame: {}", error.error.message);
        return;
    };
    let mapped = McpError::from_wire(
        error.error.code,
        error.error.message.clone(),
        error.error.data.clone(),
    );
    shared.complete(&id, Err(ClientError::Protocol(mapped)));
}

fn route_notification(shared: &Shared, notification: JsonRpcNotification) {
    let params = notification
        .params
        .as_ref()
        .map(|p| p.to_value())
        .unwrap_or(Value::Null);

    match notification.method.as_str() {
        methods::NOTIFICATION_PROGRESS => {
            let Ok(progress) = serde_json::from_value::<ProgressParams>(params) else {
                debug!("malformed progress notification dropped");
                return;
            };
            let callback = shared
                .progress
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(&progress.progress_token)
                .cloned();
            match callback {
                Some(callback) => callback(progress.progress, progress.total),
                // Unknown tokens are ignored by design of the correlation
                // table: the call may have timed out already.
                None => debug!("progress for unknown token ignored"),
            }
        }
        methods::NOTIFICATION_MESSAGE => {
            let callback = shared
                .log_callback
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            if let Some(callback) = callback {
                callback(params);
            }
        }
        other => {
            debug!(method = other, "notification ignored");
        }
    }
}

/// Answer `sampling/createMessage` and `roots/list`, gated on the
/// capabilities this client advertised.
async fn answer_server_request(config: &ClientConfig, request: JsonRpcRequest) -> JsonRpcFrame {
    let id = request.id.clone();
    let params = request.params_value();

    let outcome: Result<Value, McpError> = match request.method.as_str() {
        methods::PING => Ok(json!({})),
        methods::SAMPLING_CREATE_MESSAGE => match &config.sampling_handler {
            Some(handler) if config.capabilities.supports_sampling() => {
                handler.create_message(params).await
            }
            _ => Err(McpError::method_not_found(methods::SAMPLING_CREATE_MESSAGE)),
        },
        methods::ROOTS_LIST => match &config.roots_handler {
            Some(handler) if config.capabilities.supports_roots() => handler.list_roots().await,
            _ => Err(McpError::method_not_found(methods::ROOTS_LIST)),
        },
        other => Err(McpError::method_not_found(other)),
    };

    match outcome {
        Ok(result) => JsonRpcResponse::new(id, result).into(),
        Err(err) => err.to_json_rpc(Some(id)).into(),
    }
}

// Typed convenience wrappers over `call`.
impl McpClient {
    pub async fn ping(&self) -> ClientResult<()> {
        self.call(methods::PING, json!({}), CallOptions::default())
            .await?;
        Ok(())
    }

    pub async fn list_tools(&self, cursor: Option<String>) -> ClientResult<ListToolsResult> {
        let params = match cursor {
            Some(cursor) => json!({"cursor": cursor}),
            None => json!({}),
        };
        let result = self
            .call(methods::TOOLS_LIST, params, CallOptions::default())
            .await?;
        Ok(serde_json::from_value(result).map_err(McpError::from)?)
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        options: CallOptions,
    ) -> ClientResult<CallToolResult> {
        let params = json!({"name": name, "arguments": arguments});
        let result = self.call(methods::TOOLS_CALL, params, options).await?;
        Ok(serde_json::from_value(result).map_err(McpError::from)?)
    }

    pub async fn list_prompts(&self, cursor: Option<String>) -> ClientResult<ListPromptsResult> {
        let params = match cursor {
            Some(cursor) => json!({"cursor": cursor}),
            None => json!({}),
        };
        let result = self
            .call(methods::PROMPTS_LIST, params, CallOptions::default())
            .await?;
        Ok(serde_json::from_value(result).map_err(McpError::from)?)
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Value,
    ) -> ClientResult<GetPromptResult> {
        let params = json!({"name": name, "arguments": arguments});
        let result = self
            .call(methods::PROMPTS_GET, params, CallOptions::default())
            .await?;
        Ok(serde_json::from_value(result).map_err(McpError::from)?)
    }

    pub async fn list_resources(
        &self,
        cursor: Option<String>,
    ) -> ClientResult<ListResourcesResult> {
        let params = match cursor {
            Some(cursor) => json!({"cursor": cursor}),
            None => json!({}),
        };
        let result = self
            .call(methods::RESOURCES_LIST, params, CallOptions::default())
            .await?;
        Ok(serde_json::from_value(result).map_err(McpError::from)?)
    }

    pub async fn read_resource(&self, uri: &str) -> ClientResult<ReadResourceResult> {
        let result = self
            .call(
                methods::RESOURCES_READ,
                json!({"uri": uri}),
                CallOptions::default(),
            )
            .await?;
        Ok(serde_json::from_value(result).map_err(McpError::from)?)
    }

    pub async fn subscribe_resource(&self, uri: &str) -> ClientResult<()> {
        self.call(
            methods::RESOURCES_SUBSCRIBE,
            json!({"uri": uri}),
            CallOptions::default(),
        )
        .await?;
        Ok(())
    }

    pub async fn set_log_level(&self, level: LoggingLevel) -> ClientResult<()> {
        self.call(
            methods::LOGGING_SET_LEVEL,
            json!({"level": level}),
            CallOptions::default(),
        )
        .await?;
        Ok(())
    }

    pub async fn complete(
        &self,
        reference: CompletionReference,
        argument_name: &str,
        argument_value: &str,
    ) -> ClientResult<CompleteResult> {
        let params = json!({
            "ref": reference,
            "argument": {"name": argument_name, "value": argument_value}
        });
        let result = self
            .call(methods::COMPLETION_COMPLETE, params, CallOptions::default())
            .await?;
        Ok(serde_json::from_value(result).map_err(McpError::from)?)
    }
}
