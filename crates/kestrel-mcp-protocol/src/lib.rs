//! # MCP Protocol Types
//!
//! Typed representation of the Model Context Protocol: the initialize
//! handshake, capability sets, tool/prompt/resource/completion/logging
//! payloads, progress and cancellation notifications, pagination cursors,
//! and the structured error taxonomy shared by both sides.

pub mod completion;
pub mod error;
pub mod initialize;
pub mod logging;
pub mod meta;
pub mod notifications;
pub mod prompts;
pub mod resources;
pub mod schema;
pub mod tools;
pub mod version;

pub use completion::{
    CompleteRequest, CompleteResult, CompletionArgument, CompletionReference, CompletionValues,
};
pub use error::{McpError, McpResult};
pub use initialize::{
    ClientCapabilities, CompletionsCapabilities, Implementation, InitializeRequest,
    InitializeResult, LoggingCapabilities, PromptsCapabilities, ResourcesCapabilities,
    RootsCapabilities, SamplingCapabilities, ServerCapabilities, ToolsCapabilities,
};
pub use logging::{LoggingLevel, LoggingMessageParams, SetLevelRequest};
pub use meta::{Cursor, paginate};
pub use notifications::{CancelledParams, ProgressParams, ProgressToken};
pub use prompts::{
    GetPromptRequest, GetPromptResult, ListPromptsResult, Prompt, PromptArgument, PromptMessage,
};
pub use resources::{
    ListResourcesResult, ReadResourceRequest, ReadResourceResult, Resource, ResourceContents,
    ResourceUpdatedParams, SubscribeRequest,
};
pub use schema::{BuiltinValidator, JsonSchema, SchemaValidator, ToolSchema, validate_against};
pub use tools::{CallToolRequest, CallToolResult, ListToolsResult, Tool, ToolContent};
pub use version::ProtocolVersion;

/// Methods defined by the protocol, used by both dispatch tables.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const PROMPTS_LIST: &str = "prompts/list";
    pub const PROMPTS_GET: &str = "prompts/get";
    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
    pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";
    pub const COMPLETION_COMPLETE: &str = "completion/complete";
    pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";
    pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
    pub const ROOTS_LIST: &str = "roots/list";

    pub const NOTIFICATION_INITIALIZED: &str = "notifications/initialized";
    pub const NOTIFICATION_PROGRESS: &str = "notifications/progress";
    pub const NOTIFICATION_CANCELLED: &str = "notifications/cancelled";
    pub const NOTIFICATION_MESSAGE: &str = "notifications/message";
    pub const NOTIFICATION_RESOURCES_UPDATED: &str = "notifications/resources/updated";
    pub const NOTIFICATION_TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
    pub const NOTIFICATION_PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
    pub const NOTIFICATION_RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
}
