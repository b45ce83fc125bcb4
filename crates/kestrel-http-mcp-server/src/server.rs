//! Hyper accept loop for the MCP endpoint.

use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use kestrel_mcp_session_storage::SessionStorage;

use crate::config::ServerConfig;
use crate::handler::McpHttpHandler;
use crate::service::McpService;
use crate::stream_manager::{StreamConfig, StreamManager};

/// The HTTP front of an MCP server.
pub struct HttpMcpServer {
    config: Arc<ServerConfig>,
    handler: McpHttpHandler,
}

impl HttpMcpServer {
    /// Wire a service and storage into a servable endpoint.
    pub fn new(
        config: ServerConfig,
        service: Arc<dyn McpService>,
        storage: Arc<dyn SessionStorage>,
    ) -> Self {
        let config = Arc::new(config);
        let stream_manager = Arc::new(StreamManager::with_config(
            storage,
            StreamConfig {
                keepalive_interval: config.sse_keepalive_interval,
                channel_buffer_size: config.high_water_mark,
                ..StreamConfig::default()
            },
        ));
        let handler = McpHttpHandler::new(Arc::clone(&config), service, stream_manager);
        Self { config, handler }
    }

    /// Wrap an already-wired handler, e.g. one sharing its stream manager
    /// with the session layer.
    pub fn with_handler(config: Arc<ServerConfig>, handler: McpHttpHandler) -> Self {
        Self { config, handler }
    }

    /// The request handler, for embedding into an existing router.
    pub fn handler(&self) -> &McpHttpHandler {
        &self.handler
    }

    /// Accept connections until the task is cancelled.
    pub async fn run(&self) -> crate::Result<()> {
        let listener = TcpListener::bind(self.config.bind_address).await?;
        info!(
            address = %self.config.bind_address,
            path = %self.config.endpoint_path,
            "MCP HTTP server listening"
        );

        loop {
            let (stream, peer) = listener.accept().await?;
            debug!(%peer, "connection accepted");

            let handler = self.handler.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let handler = handler.clone();
                    async move { Ok::<_, std::convert::Infallible>(handler.handle(req).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    // Client disconnects mid-stream land here; not a fault.
                    debug!(%peer, error = %err, "connection closed");
                }
            });
        }
    }
}

impl std::fmt::Debug for HttpMcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMcpServer")
            .field("bind_address", &self.config.bind_address)
            .field("endpoint_path", &self.config.endpoint_path)
            .finish()
    }
}
