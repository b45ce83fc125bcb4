//! The assembled MCP server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use kestrel_http_mcp_server::{
    HttpMcpServer, McpHttpHandler, McpService, ServerConfig, ServiceError, StreamConfig,
    StreamManager,
};
use kestrel_mcp_json_rpc::JsonRpcFrame;
use kestrel_mcp_protocol::{McpError, McpResult, methods};
use kestrel_mcp_session_storage::SessionStorage;

use crate::dispatcher::Dispatcher;
use crate::notifications::FrameSink;
use crate::registry::SessionRegistry;
use crate::session::{SessionHandle, SessionSendError};

/// Server-level configuration beyond the HTTP transport's own.
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    pub http: ServerConfig,
    /// Idle session lifetime, seconds
    pub session_ttl: u64,
    /// Eviction sweep cadence
    pub sweep_interval: Duration,
    pub pagination_limit: usize,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            http: ServerConfig::default(),
            session_ttl: 1800,
            sweep_interval: Duration::from_secs(60),
            pagination_limit: 50,
        }
    }
}

/// Delivers session frames through the HTTP stream manager.
struct StreamSink {
    stream_manager: Arc<StreamManager>,
}

#[async_trait]
impl FrameSink for StreamSink {
    async fn send(&self, session_id: &str, frame: JsonRpcFrame) -> McpResult<()> {
        let value = serde_json::to_value(&frame)?;
        self.stream_manager
            .send_message(session_id, value)
            .await
            .map_err(|e| McpError::internal(e.to_string()))?;
        Ok(())
    }
}

/// A runnable MCP server: dispatcher, session registry, and transport.
pub struct McpServer {
    config: McpServerConfig,
    registry: Arc<SessionRegistry>,
    stream_manager: Arc<StreamManager>,
    storage: Arc<dyn SessionStorage>,
}

impl McpServer {
    pub(crate) fn assemble(
        config: McpServerConfig,
        dispatcher: Arc<Dispatcher>,
        storage: Arc<dyn SessionStorage>,
    ) -> Arc<Self> {
        let stream_manager = Arc::new(StreamManager::with_config(
            Arc::clone(&storage),
            StreamConfig {
                keepalive_interval: config.http.sse_keepalive_interval,
                channel_buffer_size: config.http.high_water_mark,
                ..StreamConfig::default()
            },
        ));
        let sink: Arc<dyn FrameSink> = Arc::new(StreamSink {
            stream_manager: Arc::clone(&stream_manager),
        });
        let registry = Arc::new(SessionRegistry::new(
            dispatcher,
            Arc::clone(&storage),
            sink,
            config.http.high_water_mark,
            config.session_ttl,
        ));

        Arc::new(Self {
            config,
            registry,
            stream_manager,
            storage,
        })
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn stream_manager(&self) -> &Arc<StreamManager> {
        &self.stream_manager
    }

    pub fn storage(&self) -> &Arc<dyn SessionStorage> {
        &self.storage
    }

    /// Resolve a live session handle, e.g. to issue sampling requests.
    pub async fn session(&self, session_id: &str) -> Option<SessionHandle> {
        self.registry.whereis(session_id).await
    }

    /// Ask the session's client to sample a message (`sampling/createMessage`).
    pub async fn create_message(
        &self,
        session_id: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> McpResult<serde_json::Value> {
        let handle = self
            .session(session_id)
            .await
            .ok_or_else(|| McpError::internal("unknown session"))?;
        handle
            .request_from_client(methods::SAMPLING_CREATE_MESSAGE, params, timeout)
            .await
    }

    /// Ask the session's client for its roots (`roots/list`).
    pub async fn list_roots(
        &self,
        session_id: &str,
        timeout: Duration,
    ) -> McpResult<serde_json::Value> {
        let handle = self
            .session(session_id)
            .await
            .ok_or_else(|| McpError::internal("unknown session"))?;
        handle
            .request_from_client(methods::ROOTS_LIST, serde_json::json!({}), timeout)
            .await
    }

    /// Restore persisted sessions, start the eviction sweeper, and serve
    /// HTTP until cancelled.
    pub async fn run(self: &Arc<Self>) -> kestrel_http_mcp_server::Result<()> {
        self.registry.restore_all().await;
        self.spawn_sweeper();

        let config = Arc::new(self.config.http.clone());
        let handler = McpHttpHandler::new(
            Arc::clone(&config),
            Arc::clone(self) as Arc<dyn McpService>,
            Arc::clone(&self.stream_manager),
        );
        let http = HttpMcpServer::with_handler(config, handler);
        http.run().await
    }

    /// Periodic TTL sweep; evicted sessions lose their SSE writers too.
    fn spawn_sweeper(self: &Arc<Self>) {
        let server = Arc::clone(self);
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let evicted = server.registry.evict_expired().await;
                for session_id in evicted {
                    server.stream_manager.unregister(&session_id).await;
                }
            }
        });
    }
}

#[async_trait]
impl McpService for McpServer {
    async fn resolve_session(
        &self,
        contains_initialize: bool,
        header_session_id: Option<&str>,
    ) -> Result<String, ServiceError> {
        match (contains_initialize, header_session_id) {
            (true, Some(id)) => {
                // Client-driven resume: adopt the presented id, restoring
                // from storage when a snapshot survives.
                if let Some(handle) = self.registry.whereis(id).await {
                    Ok(handle.session_id().to_string())
                } else {
                    debug!(session_id = id, "initialize with unknown id; recreating");
                    Ok(self
                        .registry
                        .create(Some(id))
                        .await
                        .session_id()
                        .to_string())
                }
            }
            (true, None) => Ok(self.registry.create(None).await.session_id().to_string()),
            (false, Some(id)) => self
                .registry
                .whereis(id)
                .await
                .map(|handle| handle.session_id().to_string())
                .ok_or_else(|| ServiceError::UnknownSession(id.to_string())),
            (false, None) => Err(ServiceError::Internal(
                "session header required".to_string(),
            )),
        }
    }

    async fn handle_frame(
        &self,
        session_id: &str,
        frame: JsonRpcFrame,
        bearer_token: Option<&str>,
    ) -> Result<Option<JsonRpcFrame>, ServiceError> {
        let handle = self
            .registry
            .whereis(session_id)
            .await
            .ok_or_else(|| ServiceError::UnknownSession(session_id.to_string()))?;

        handle
            .handle_frame(frame, bearer_token.map(str::to_string))
            .await
            .map_err(|err| match err {
                SessionSendError::Overloaded => ServiceError::Overloaded(session_id.to_string()),
                SessionSendError::Stopped => {
                    warn!(session_id, "session stopped mid-request");
                    ServiceError::Internal("session_restarted".to_string())
                }
            })
    }

    async fn session_exists(&self, session_id: &str) -> bool {
        self.registry.whereis(session_id).await.is_some()
    }

    async fn terminate_session(&self, session_id: &str) -> Result<(), ServiceError> {
        self.stream_manager.unregister(session_id).await;
        self.registry.terminate(session_id).await;
        info!(session_id, "session torn down via DELETE");
        Ok(())
    }
}
