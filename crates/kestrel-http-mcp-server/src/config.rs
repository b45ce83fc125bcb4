//! HTTP server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the streamable HTTP endpoint.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub bind_address: SocketAddr,
    /// Endpoint path serving all three methods
    pub endpoint_path: String,
    /// Header carrying the opaque session id
    pub session_header: String,
    /// Maximum time to read and handle one POST body
    pub request_timeout: Duration,
    /// Interval between SSE keepalive comments
    pub sse_keepalive_interval: Duration,
    /// Per-session writer channel capacity; beyond it the transport sheds
    /// load with 503 instead of queueing unboundedly
    pub high_water_mark: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".parse().unwrap(),
            endpoint_path: "/mcp".to_string(),
            session_header: "mcp-session-id".to_string(),
            request_timeout: Duration::from_millis(30_000),
            sse_keepalive_interval: Duration::from_secs(15),
            high_water_mark: 1000,
        }
    }
}

impl ServerConfig {
    pub fn with_bind_address(mut self, address: SocketAddr) -> Self {
        self.bind_address = address;
        self
    }

    pub fn with_endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.endpoint_path = path.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.endpoint_path, "/mcp");
        assert_eq!(config.session_header, "mcp-session-id");
        assert_eq!(config.request_timeout, Duration::from_millis(30_000));
        assert_eq!(config.sse_keepalive_interval, Duration::from_secs(15));
        assert_eq!(config.high_water_mark, 1000);
    }
}
