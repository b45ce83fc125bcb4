//! Client configuration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use kestrel_mcp_protocol::{ClientCapabilities, Implementation, McpResult, ProtocolVersion};

/// Handler for server-initiated `sampling/createMessage` requests.
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    async fn create_message(&self, params: Value) -> McpResult<Value>;
}

/// Handler for server-initiated `roots/list` requests.
#[async_trait]
pub trait RootsHandler: Send + Sync {
    async fn list_roots(&self) -> McpResult<Value>;
}

/// Client engine configuration.
#[derive(Clone)]
pub struct ClientConfig {
    pub client_info: Implementation,
    pub capabilities: ClientCapabilities,
    /// Supported protocol revisions, newest first; initialize advertises
    /// the first and accepts any of them.
    pub protocol_versions: Vec<ProtocolVersion>,
    /// Default per-call deadline
    pub request_timeout: Duration,
    pub sampling_handler: Option<Arc<dyn SamplingHandler>>,
    pub roots_handler: Option<Arc<dyn RootsHandler>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_info: Implementation::new("kestrel-mcp-client", env!("CARGO_PKG_VERSION")),
            capabilities: ClientCapabilities::default(),
            protocol_versions: ProtocolVersion::SUPPORTED.to_vec(),
            request_timeout: Duration::from_millis(30_000),
            sampling_handler: None,
            roots_handler: None,
        }
    }
}

impl ClientConfig {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            client_info: Implementation::new(name, version),
            ..Default::default()
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Advertise the sampling capability and install its handler.
    pub fn with_sampling_handler(mut self, handler: Arc<dyn SamplingHandler>) -> Self {
        self.capabilities.sampling =
            Some(kestrel_mcp_protocol::SamplingCapabilities { enabled: Some(true) });
        self.sampling_handler = Some(handler);
        self
    }

    /// Advertise the roots capability and install its handler.
    pub fn with_roots_handler(mut self, handler: Arc<dyn RootsHandler>) -> Self {
        self.capabilities.roots =
            Some(kestrel_mcp_protocol::RootsCapabilities { list_changed: None });
        self.roots_handler = Some(handler);
        self
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_info", &self.client_info)
            .field("protocol_versions", &self.protocol_versions)
            .field("request_timeout", &self.request_timeout)
            .field("sampling_handler", &self.sampling_handler.is_some())
            .field("roots_handler", &self.roots_handler.is_some())
            .finish()
    }
}
