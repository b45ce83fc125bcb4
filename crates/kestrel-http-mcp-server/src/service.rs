//! The seam between the transport and the session layer.

use async_trait::async_trait;

use kestrel_mcp_json_rpc::JsonRpcFrame;

/// Errors a service can hand back to the transport.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// No session with that id; POST/DELETE against it must fail.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// Session mailbox above its high-water mark; map to 503.
    #[error("session {0} is overloaded")]
    Overloaded(String),

    /// Anything else; map to an internal JSON-RPC error.
    #[error("{0}")]
    Internal(String),
}

/// What the session layer provides to the HTTP transport.
///
/// The transport never touches session state directly: it resolves a
/// session id for each request, pushes frames in arrival order, and routes
/// whatever comes back.
#[async_trait]
pub trait McpService: Send + Sync {
    /// Resolve the session for a POST.
    ///
    /// For a payload containing `initialize`, a provided header id resumes
    /// that session and an absent header mints a fresh one. All other
    /// payloads require the header; the transport rejects them before
    /// calling this.
    async fn resolve_session(
        &self,
        contains_initialize: bool,
        header_session_id: Option<&str>,
    ) -> Result<String, ServiceError>;

    /// Handle one inbound frame within a session.
    ///
    /// Returns the reply frame for requests, `None` for notifications and
    /// client responses to server-initiated requests.
    async fn handle_frame(
        &self,
        session_id: &str,
        frame: JsonRpcFrame,
        bearer_token: Option<&str>,
    ) -> Result<Option<JsonRpcFrame>, ServiceError>;

    /// Whether the session currently exists.
    async fn session_exists(&self, session_id: &str) -> bool;

    /// Tear a session down: stop its actor and delete any persisted state.
    async fn terminate_session(&self, session_id: &str) -> Result<(), ServiceError>;
}
