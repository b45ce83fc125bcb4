//! Method routing for READY sessions.
//!
//! The dispatcher owns the merged component view (compile-time
//! registrations plus the session's runtime additions), pagination, schema
//! validation on the way in and out, and scope enforcement. Capability
//! gates run in the session actor before any of this executes.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use kestrel_mcp_json_rpc::JsonRpcRequest;
use kestrel_mcp_protocol::{
    CallToolRequest, CompleteRequest, CompleteResult, Cursor, GetPromptRequest, GetPromptResult,
    Implementation, ListPromptsResult, ListResourcesResult, ListToolsResult, McpError, McpResult,
    Prompt, ProtocolVersion, ReadResourceRequest, ReadResourceResult, Resource, SchemaValidator,
    ServerCapabilities, SetLevelRequest, Tool, methods, paginate,
};

use crate::auth::{AuthConfig, TokenValidator};
use crate::completion::McpCompletion;
use crate::prompt::McpPrompt;
use crate::resource::McpResource;
use crate::session::Frame;
use crate::tool::McpTool;
use crate::uri_template::UriTemplate;

/// Hook run when a session reaches READY; may seed per-session components.
pub type InitHook = dyn Fn(Option<&Implementation>, &mut Frame) + Send + Sync;

/// Static server description plus the compile-time component registries.
pub struct Dispatcher {
    server_info: Implementation,
    instructions: Option<String>,
    capabilities: ServerCapabilities,
    supported_versions: Vec<ProtocolVersion>,
    tools: HashMap<String, Arc<dyn McpTool>>,
    prompts: HashMap<String, Arc<dyn McpPrompt>>,
    resources: Vec<Arc<dyn McpResource>>,
    completion: Option<Arc<dyn McpCompletion>>,
    validator: Arc<dyn SchemaValidator>,
    auth: AuthConfig,
    pagination_limit: usize,
    init_hook: Option<Arc<InitHook>>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        server_info: Implementation,
        instructions: Option<String>,
        capabilities: ServerCapabilities,
        supported_versions: Vec<ProtocolVersion>,
        tools: HashMap<String, Arc<dyn McpTool>>,
        prompts: HashMap<String, Arc<dyn McpPrompt>>,
        resources: Vec<Arc<dyn McpResource>>,
        completion: Option<Arc<dyn McpCompletion>>,
        validator: Arc<dyn SchemaValidator>,
        auth: AuthConfig,
        pagination_limit: usize,
        init_hook: Option<Arc<InitHook>>,
    ) -> Self {
        Self {
            server_info,
            instructions,
            capabilities,
            supported_versions,
            tools,
            prompts,
            resources,
            completion,
            validator,
            auth,
            pagination_limit,
            init_hook,
        }
    }

    pub fn server_info(&self) -> &Implementation {
        &self.server_info
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    pub fn supported_versions(&self) -> &[ProtocolVersion] {
        &self.supported_versions
    }

    pub fn token_validator(&self) -> Option<&Arc<dyn TokenValidator>> {
        self.auth.validator.as_ref()
    }

    pub fn auth_challenge(&self) -> String {
        self.auth.challenge()
    }

    pub fn init_hook(&self) -> Option<&Arc<InitHook>> {
        self.init_hook.as_ref()
    }

    /// Route one READY-state request to its handler.
    pub async fn dispatch(&self, request: &JsonRpcRequest, frame: &mut Frame) -> McpResult<Value> {
        let params = request.params_value();
        debug!(
            session_id = %frame.session_id(),
            method = %request.method,
            request_id = %request.id,
            "dispatching"
        );

        match request.method.as_str() {
            methods::PING => Ok(serde_json::json!({})),
            methods::TOOLS_LIST => self.list_tools(&params, frame),
            methods::TOOLS_CALL => self.call_tool(params, frame).await,
            methods::PROMPTS_LIST => self.list_prompts(&params, frame),
            methods::PROMPTS_GET => self.get_prompt(params, frame).await,
            methods::RESOURCES_LIST => self.list_resources(&params, frame),
            methods::RESOURCES_READ => self.read_resource(params, frame).await,
            methods::RESOURCES_SUBSCRIBE => self.subscribe_resource(params, frame, true),
            methods::RESOURCES_UNSUBSCRIBE => self.subscribe_resource(params, frame, false),
            methods::COMPLETION_COMPLETE => self.complete(params, frame).await,
            methods::LOGGING_SET_LEVEL => self.set_level(params, frame),
            other => Err(McpError::method_not_found(other)),
        }
    }

    fn cursor_from(params: &Value) -> McpResult<Option<Cursor>> {
        match params.get("cursor").and_then(Value::as_str) {
            Some(text) => Ok(Some(Cursor::decode(text)?)),
            None => Ok(None),
        }
    }

    fn list_tools(&self, params: &Value, frame: &Frame) -> McpResult<Value> {
        let cursor = Self::cursor_from(params)?;

        // Merge compile-time and runtime registrations; runtime wins on a
        // name collision. Name order keeps cursors stable.
        let mut merged: HashMap<&str, &Arc<dyn McpTool>> =
            self.tools.iter().map(|(k, v)| (k.as_str(), v)).collect();
        for (name, tool) in frame.runtime_tools() {
            merged.insert(name.as_str(), tool);
        }
        let mut descriptors: Vec<Tool> =
            merged.values().map(|tool| tool.to_descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));

        let (page, next) = paginate(&descriptors, cursor.as_ref(), self.pagination_limit);
        let mut result = ListToolsResult::new(page);
        if let Some(next) = next {
            result = result.with_next_cursor(next.encode());
        }
        serde_json::to_value(result).map_err(McpError::from)
    }

    async fn call_tool(&self, params: Value, frame: &mut Frame) -> McpResult<Value> {
        let request: CallToolRequest = serde_json::from_value(params)
            .map_err(|e| McpError::invalid_params(format!("malformed tools/call params: {}", e)))?;

        let tool = frame
            .runtime_tools()
            .get(&request.name)
            .cloned()
            .or_else(|| self.tools.get(&request.name).cloned())
            .ok_or_else(|| McpError::method_not_found(format!("tool '{}'", request.name)))?;

        // Scope enforcement runs before input validation.
        let required = tool.required_scopes();
        if !required.is_empty() {
            let missing: Vec<&String> = required
                .iter()
                .filter(|scope| !frame.has_scope(scope))
                .collect();
            if !frame.authenticated() || !missing.is_empty() {
                return Err(McpError::unauthorized_with_challenge(
                    format!(
                        "tool '{}' requires scopes {:?}",
                        request.name, required
                    ),
                    &self.auth.challenge(),
                ));
            }
        }

        let args = request.arguments.unwrap_or(Value::Object(Default::default()));
        if let Err(errors) = self.validator.validate(tool.input_schema(), &args) {
            return Err(McpError::validation_failed(
                format!("arguments for tool '{}' failed validation", request.name),
                errors,
            ));
        }

        let result = tool.call(args, frame).await?;

        if let (Some(schema), Some(structured)) =
            (tool.output_schema(), result.structured_content.as_ref())
        {
            if let Err(errors) = self.validator.validate(schema, structured) {
                return Err(McpError::output_validation_failed(&request.name, errors));
            }
        }

        serde_json::to_value(result).map_err(McpError::from)
    }

    fn list_prompts(&self, params: &Value, frame: &Frame) -> McpResult<Value> {
        let cursor = Self::cursor_from(params)?;

        let mut merged: HashMap<&str, &Arc<dyn McpPrompt>> =
            self.prompts.iter().map(|(k, v)| (k.as_str(), v)).collect();
        for (name, prompt) in frame.runtime_prompts() {
            merged.insert(name.as_str(), prompt);
        }
        let mut descriptors: Vec<Prompt> =
            merged.values().map(|prompt| prompt.to_descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));

        let (page, next) = paginate(&descriptors, cursor.as_ref(), self.pagination_limit);
        let mut result = ListPromptsResult::new(page);
        if let Some(next) = next {
            result = result.with_next_cursor(next.encode());
        }
        serde_json::to_value(result).map_err(McpError::from)
    }

    async fn get_prompt(&self, params: Value, frame: &mut Frame) -> McpResult<Value> {
        let request: GetPromptRequest = serde_json::from_value(params)
            .map_err(|e| McpError::invalid_params(format!("malformed prompts/get params: {}", e)))?;

        let prompt = frame
            .runtime_prompts()
            .get(&request.name)
            .cloned()
            .or_else(|| self.prompts.get(&request.name).cloned())
            .ok_or_else(|| McpError::method_not_found(format!("prompt '{}'", request.name)))?;

        let args = request.arguments.unwrap_or_default();
        prompt.check_arguments(&args)?;

        let messages = prompt.render(args, frame).await?;
        let result = GetPromptResult {
            description: prompt.description().map(str::to_string),
            messages,
        };
        serde_json::to_value(result).map_err(McpError::from)
    }

    fn merged_resources(&self, frame: &Frame) -> Vec<Arc<dyn McpResource>> {
        let mut all = self.resources.clone();
        all.extend(frame.runtime_resources().iter().cloned());
        all
    }

    fn list_resources(&self, params: &Value, frame: &Frame) -> McpResult<Value> {
        let cursor = Self::cursor_from(params)?;

        let mut descriptors: Vec<Resource> = self
            .merged_resources(frame)
            .iter()
            .map(|resource| resource.to_descriptor())
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));

        let (page, next) = paginate(&descriptors, cursor.as_ref(), self.pagination_limit);
        let mut result = ListResourcesResult::new(page);
        if let Some(next) = next {
            result = result.with_next_cursor(next.encode());
        }
        serde_json::to_value(result).map_err(McpError::from)
    }

    async fn read_resource(&self, params: Value, frame: &mut Frame) -> McpResult<Value> {
        let request: ReadResourceRequest = serde_json::from_value(params).map_err(|e| {
            McpError::invalid_params(format!("malformed resources/read params: {}", e))
        })?;

        let (resource, extracted) = self
            .lookup_resource(&request.uri, frame)?
            .ok_or_else(|| McpError::resource_not_found(&request.uri))?;

        let contents = resource.read(&request.uri, extracted, frame).await?;
        serde_json::to_value(ReadResourceResult { contents }).map_err(McpError::from)
    }

    /// Exact URI match first, then templates in registration order.
    #[allow(clippy::type_complexity)]
    fn lookup_resource(
        &self,
        uri: &str,
        frame: &Frame,
    ) -> McpResult<Option<(Arc<dyn McpResource>, HashMap<String, String>)>> {
        let all = self.merged_resources(frame);

        for resource in &all {
            if resource.uri() == Some(uri) {
                return Ok(Some((Arc::clone(resource), HashMap::new())));
            }
        }
        for resource in &all {
            if let Some(pattern) = resource.uri_template() {
                let template = UriTemplate::new(pattern)?;
                if let Some(extracted) = template.matches(uri) {
                    return Ok(Some((Arc::clone(resource), extracted)));
                }
            }
        }
        Ok(None)
    }

    fn subscribe_resource(
        &self,
        params: Value,
        frame: &mut Frame,
        subscribe: bool,
    ) -> McpResult<Value> {
        let request: ReadResourceRequest = serde_json::from_value(params).map_err(|e| {
            McpError::invalid_params(format!("malformed subscription params: {}", e))
        })?;

        if subscribe {
            if self.lookup_resource(&request.uri, frame)?.is_none() {
                return Err(McpError::resource_not_found(&request.uri));
            }
            frame.subscribe(request.uri);
        } else {
            frame.unsubscribe(&request.uri);
        }
        Ok(serde_json::json!({}))
    }

    async fn complete(&self, params: Value, frame: &mut Frame) -> McpResult<Value> {
        let hook = self
            .completion
            .as_ref()
            .ok_or_else(|| McpError::method_not_found(methods::COMPLETION_COMPLETE))?;

        let request: CompleteRequest = serde_json::from_value(params).map_err(|e| {
            McpError::invalid_params(format!("malformed completion params: {}", e))
        })?;

        let values = hook.complete(request, frame).await?;
        serde_json::to_value(CompleteResult::new(values)).map_err(McpError::from)
    }

    fn set_level(&self, params: Value, frame: &mut Frame) -> McpResult<Value> {
        let request: SetLevelRequest = serde_json::from_value(params).map_err(|e| {
            McpError::invalid_params(format!("malformed logging/setLevel params: {}", e))
        })?;
        frame.set_log_level(request.level);
        debug!(
            session_id = %frame.session_id(),
            level = %request.level,
            "session log level changed"
        );
        Ok(serde_json::json!({}))
    }
}
