//! The tool component trait.

use async_trait::async_trait;
use serde_json::Value;

use kestrel_mcp_protocol::{CallToolResult, McpResult, Tool, ToolSchema};

use crate::session::Frame;

/// A callable action the server exposes.
///
/// Implementations provide metadata and the handler body; the dispatcher
/// owns input/output schema validation and scope checks, so `call` receives
/// arguments that already passed the input schema.
#[async_trait]
pub trait McpTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    fn input_schema(&self) -> &ToolSchema;

    /// Declaring an output schema makes the dispatcher validate the
    /// handler's `structured_content` before it leaves the server.
    fn output_schema(&self) -> Option<&ToolSchema> {
        None
    }

    /// Scopes the caller's auth context must hold to invoke this tool.
    fn required_scopes(&self) -> &[String] {
        &[]
    }

    /// Execute with validated arguments and the session frame.
    async fn call(&self, args: Value, frame: &mut Frame) -> McpResult<CallToolResult>;

    /// The protocol descriptor for `tools/list`.
    fn to_descriptor(&self) -> Tool {
        let mut tool = Tool::new(self.name(), self.input_schema().clone());
        if let Some(description) = self.description() {
            tool = tool.with_description(description);
        }
        if let Some(schema) = self.output_schema() {
            tool = tool.with_output_schema(schema.clone());
        }
        tool
    }
}
