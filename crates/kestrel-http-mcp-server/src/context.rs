//! Per-request context extracted from HTTP headers.

use http::HeaderMap;
use http::header::{ACCEPT, AUTHORIZATION};

use kestrel_mcp_protocol::ProtocolVersion;

/// What the transport needs to know about one HTTP request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Session id from the configured session header, if present
    pub session_id: Option<String>,
    /// Protocol version hint from `MCP-Protocol-Version`
    pub protocol_version: Option<ProtocolVersion>,
    /// Whether `Accept` includes `application/json` (or a wildcard)
    pub accepts_json: bool,
    /// Whether `Accept` includes `text/event-stream`
    pub accepts_sse: bool,
    /// `Last-Event-ID` for SSE resume
    pub last_event_id: Option<u64>,
    /// Bearer token from `Authorization`, if present
    pub bearer_token: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap, session_header: &str) -> Self {
        let session_id = headers
            .get(session_header)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        let protocol_version = headers
            .get("mcp-protocol-version")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse().ok());

        let accept = headers
            .get(ACCEPT)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let accepts_json = accept.contains("application/json") || accept.contains("*/*");
        let accepts_sse = accept.contains("text/event-stream");

        let last_event_id = headers
            .get("last-event-id")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse().ok());

        let bearer_token = headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_string);

        Self {
            session_id,
            protocol_version,
            accepts_json,
            accepts_sse,
            last_event_id,
            bearer_token,
        }
    }
}
