//! # Streamable HTTP Transport
//!
//! A single HTTP endpoint carrying the MCP streamable-HTTP transport:
//! POST for inbound JSON-RPC (single or batch), GET for an upgradeable
//! Server-Sent-Events stream, DELETE for explicit session teardown.
//! Responses to requests are computed inline (200) or routed to the
//! session's SSE stream (202) depending on what the client accepts.
//!
//! The crate is session-layer agnostic: it routes frames into an
//! [`McpService`] implementation and owns only HTTP parsing, session-header
//! resolution, the per-session SSE writer registry, and stream replay.

pub mod config;
pub mod context;
pub mod handler;
pub mod server;
pub mod service;
pub mod stream_manager;

pub use config::ServerConfig;
pub use context::RequestContext;
pub use handler::McpHttpHandler;
pub use server::HttpMcpServer;
pub use service::{McpService, ServiceError};
pub use stream_manager::{StreamConfig, StreamError, StreamManager};

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;

/// Body type shared by plain and streaming responses.
pub type BoxBody = UnsyncBoxBody<Bytes, std::convert::Infallible>;

/// Result type for HTTP MCP operations
pub type Result<T> = std::result::Result<T, HttpMcpError>;

/// HTTP transport errors
#[derive(Debug, thiserror::Error)]
pub enum HttpMcpError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stream error: {0}")]
    Stream(#[from] StreamError),
}
