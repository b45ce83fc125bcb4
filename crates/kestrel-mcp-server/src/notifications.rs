//! Outbound delivery from sessions to clients.
//!
//! Sessions hand fully-formed frames to a [`FrameSink`]; in production that
//! is the HTTP stream manager, in tests a channel.

use async_trait::async_trait;
use serde_json::json;

use kestrel_mcp_json_rpc::{JsonRpcFrame, JsonRpcNotification};
use kestrel_mcp_protocol::{LoggingLevel, McpError, McpResult, ProgressToken, methods};

/// Delivers frames to a session's client, in FIFO order per session.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send(&self, session_id: &str, frame: JsonRpcFrame) -> McpResult<()>;
}

/// Sink for sessions with no transport attached (stdio-less tests, eviction
/// paths); drops frames after logging.
pub struct NullSink;

#[async_trait]
impl FrameSink for NullSink {
    async fn send(&self, session_id: &str, _frame: JsonRpcFrame) -> McpResult<()> {
        tracing::debug!(session_id, "no sink attached; frame dropped");
        Ok(())
    }
}

/// `notifications/progress`
pub fn progress(
    token: &ProgressToken,
    progress: f64,
    total: Option<f64>,
) -> JsonRpcNotification {
    let mut params = json!({
        "progressToken": token,
        "progress": progress,
    });
    if let Some(total) = total {
        params["total"] = json!(total);
    }
    JsonRpcNotification::with_value_params(methods::NOTIFICATION_PROGRESS, params)
}

/// `notifications/message`
pub fn log_message(
    level: LoggingLevel,
    logger: Option<&str>,
    data: serde_json::Value,
) -> JsonRpcNotification {
    let mut params = json!({
        "level": level,
        "data": data,
    });
    if let Some(logger) = logger {
        params["logger"] = json!(logger);
    }
    JsonRpcNotification::with_value_params(methods::NOTIFICATION_MESSAGE, params)
}

/// `notifications/resources/updated`
pub fn resource_updated(uri: &str) -> JsonRpcNotification {
    JsonRpcNotification::with_value_params(
        methods::NOTIFICATION_RESOURCES_UPDATED,
        json!({ "uri": uri }),
    )
}

/// The list-changed notification for a component kind.
pub fn list_changed(kind: ComponentKind) -> JsonRpcNotification {
    let method = match kind {
        ComponentKind::Tool => methods::NOTIFICATION_TOOLS_LIST_CHANGED,
        ComponentKind::Prompt => methods::NOTIFICATION_PROMPTS_LIST_CHANGED,
        ComponentKind::Resource => methods::NOTIFICATION_RESOURCES_LIST_CHANGED,
    };
    JsonRpcNotification::new(method, None)
}

/// The three component kinds a server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Tool,
    Prompt,
    Resource,
}

/// Channel-backed sink for tests.
pub struct ChannelSink {
    sender: tokio::sync::mpsc::UnboundedSender<(String, JsonRpcFrame)>,
}

impl ChannelSink {
    pub fn new() -> (
        Self,
        tokio::sync::mpsc::UnboundedReceiver<(String, JsonRpcFrame)>,
    ) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&self, session_id: &str, frame: JsonRpcFrame) -> McpResult<()> {
        self.sender
            .send((session_id.to_string(), frame))
            .map_err(|_| McpError::internal("sink receiver dropped"))
    }
}
