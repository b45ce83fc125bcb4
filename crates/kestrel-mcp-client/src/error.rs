//! Client-side error types.
//!
//! Protocol-plane failures arrive as [`McpError`] values decoded off the
//! wire; `Timeout`, `Cancelled`, and transport failures are local-plane and
//! never travel it.

use thiserror::Error;

use kestrel_mcp_protocol::McpError;

pub type ClientResult<T> = Result<T, ClientError>;

/// Failures surfaced to callers of the client engine.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with a JSON-RPC error frame.
    #[error("server error: {0}")]
    Protocol(#[from] McpError),

    /// The per-call deadline fired; a cancellation notice was sent.
    #[error("request timed out")]
    Timeout,

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// A call was made before `initialize` completed.
    #[error("client not initialized")]
    NotInitialized,

    /// The method's capability was not advertised by the server; failed
    /// locally without a wire request.
    #[error("method '{0}' not supported by server")]
    MethodNotSupported(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("send timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("transport closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
