//! The prompt component trait.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use kestrel_mcp_protocol::{McpResult, Prompt, PromptArgument, PromptMessage};

use crate::session::Frame;

/// A parameterised message template the server exposes.
#[async_trait]
pub trait McpPrompt: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    fn arguments(&self) -> Vec<PromptArgument> {
        Vec::new()
    }

    /// Render the prompt with the supplied arguments.
    async fn render(
        &self,
        args: HashMap<String, Value>,
        frame: &mut Frame,
    ) -> McpResult<Vec<PromptMessage>>;

    fn to_descriptor(&self) -> Prompt {
        let mut prompt = Prompt::new(self.name());
        if let Some(description) = self.description() {
            prompt = prompt.with_description(description);
        }
        let arguments = self.arguments();
        if !arguments.is_empty() {
            prompt = prompt.with_arguments(arguments);
        }
        prompt
    }

    /// Reject calls missing a required argument before `render` runs.
    fn check_arguments(&self, args: &HashMap<String, Value>) -> McpResult<()> {
        for argument in self.arguments() {
            if argument.required.unwrap_or(false) && !args.contains_key(&argument.name) {
                return Err(kestrel_mcp_protocol::McpError::missing_param(&argument.name));
            }
        }
        Ok(())
    }
}
