//! Builder for [`McpServer`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use kestrel_mcp_protocol::{
    BuiltinValidator, CompletionsCapabilities, Implementation, LoggingCapabilities,
    PromptsCapabilities, ProtocolVersion, ResourcesCapabilities, SchemaValidator,
    ServerCapabilities, ToolsCapabilities,
};
use kestrel_mcp_session_storage::{InMemorySessionStorage, SessionStorage};

use crate::auth::AuthConfig;
use crate::completion::McpCompletion;
use crate::dispatcher::{Dispatcher, InitHook};
use crate::prompt::McpPrompt;
use crate::resource::McpResource;
use crate::server::{McpServer, McpServerConfig};
use crate::tool::McpTool;

/// Assembles an [`McpServer`] from components and configuration.
///
/// Capabilities are derived from what is registered; the explicit
/// `enable_*` methods cover servers that only add components per session
/// from the init hook.
pub struct McpServerBuilder {
    server_info: Implementation,
    instructions: Option<String>,
    config: McpServerConfig,
    protocol_versions: Vec<ProtocolVersion>,
    tools: HashMap<String, Arc<dyn McpTool>>,
    prompts: HashMap<String, Arc<dyn McpPrompt>>,
    resources: Vec<Arc<dyn McpResource>>,
    completion: Option<Arc<dyn McpCompletion>>,
    validator: Arc<dyn SchemaValidator>,
    auth: AuthConfig,
    storage: Option<Arc<dyn SessionStorage>>,
    init_hook: Option<Arc<InitHook>>,
    logging_enabled: bool,
    subscriptions_enabled: bool,
    force_tools: bool,
    force_prompts: bool,
    force_resources: bool,
}

impl McpServerBuilder {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            server_info: Implementation::new(name, version),
            instructions: None,
            config: McpServerConfig::default(),
            protocol_versions: ProtocolVersion::SUPPORTED.to_vec(),
            tools: HashMap::new(),
            prompts: HashMap::new(),
            resources: Vec::new(),
            completion: None,
            validator: Arc::new(BuiltinValidator),
            auth: AuthConfig::default(),
            storage: None,
            init_hook: None,
            logging_enabled: false,
            subscriptions_enabled: false,
            force_tools: false,
            force_prompts: false,
            force_resources: false,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.server_info = self.server_info.with_title(title);
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn bind(mut self, address: std::net::SocketAddr) -> Self {
        self.config.http.bind_address = address;
        self
    }

    pub fn endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.config.http.endpoint_path = path.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.http.request_timeout = timeout;
        self
    }

    pub fn session_ttl(mut self, seconds: u64) -> Self {
        self.config.session_ttl = seconds;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn pagination_limit(mut self, limit: usize) -> Self {
        self.config.pagination_limit = limit;
        self
    }

    pub fn high_water_mark(mut self, mark: usize) -> Self {
        self.config.http.high_water_mark = mark;
        self
    }

    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.http.sse_keepalive_interval = interval;
        self
    }

    pub fn protocol_versions(mut self, versions: Vec<ProtocolVersion>) -> Self {
        self.protocol_versions = versions;
        self
    }

    pub fn tool<T: McpTool + 'static>(mut self, tool: T) -> Self {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
        self
    }

    pub fn prompt<P: McpPrompt + 'static>(mut self, prompt: P) -> Self {
        self.prompts
            .insert(prompt.name().to_string(), Arc::new(prompt));
        self
    }

    pub fn resource<R: McpResource + 'static>(mut self, resource: R) -> Self {
        self.resources.push(Arc::new(resource));
        self
    }

    pub fn completion<C: McpCompletion + 'static>(mut self, completion: C) -> Self {
        self.completion = Some(Arc::new(completion));
        self
    }

    pub fn schema_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn authorization(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Hook run when a session turns READY; may seed session components.
    pub fn on_initialized<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&Implementation>, &mut crate::session::Frame) + Send + Sync + 'static,
    {
        self.init_hook = Some(Arc::new(hook));
        self
    }

    pub fn enable_logging(mut self) -> Self {
        self.logging_enabled = true;
        self
    }

    pub fn enable_subscriptions(mut self) -> Self {
        self.subscriptions_enabled = true;
        self
    }

    pub fn enable_tools(mut self) -> Self {
        self.force_tools = true;
        self
    }

    pub fn enable_prompts(mut self) -> Self {
        self.force_prompts = true;
        self
    }

    pub fn enable_resources(mut self) -> Self {
        self.force_resources = true;
        self
    }

    fn capabilities(&self) -> ServerCapabilities {
        let mut capabilities = ServerCapabilities::default();
        if self.force_tools || !self.tools.is_empty() {
            capabilities.tools = Some(ToolsCapabilities {
                list_changed: Some(true),
            });
        }
        if self.force_prompts || !self.prompts.is_empty() {
            capabilities.prompts = Some(PromptsCapabilities {
                list_changed: Some(true),
            });
        }
        if self.force_resources || !self.resources.is_empty() {
            capabilities.resources = Some(ResourcesCapabilities {
                subscribe: self.subscriptions_enabled.then_some(true),
                list_changed: Some(true),
            });
        }
        if self.completion.is_some() {
            capabilities.completions = Some(CompletionsCapabilities {
                enabled: Some(true),
            });
        }
        if self.logging_enabled {
            capabilities.logging = Some(LoggingCapabilities {
                enabled: Some(true),
            });
        }
        capabilities
    }

    pub fn build(self) -> Arc<McpServer> {
        let capabilities = self.capabilities();
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(InMemorySessionStorage::new()));

        let dispatcher = Arc::new(Dispatcher::new(
            self.server_info,
            self.instructions,
            capabilities,
            self.protocol_versions,
            self.tools,
            self.prompts,
            self.resources,
            self.completion,
            self.validator,
            self.auth,
            self.config.pagination_limit,
            self.init_hook,
        ));

        McpServer::assemble(self.config, dispatcher, storage)
    }
}
