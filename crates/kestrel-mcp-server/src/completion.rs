//! The completion hook.

use async_trait::async_trait;

use kestrel_mcp_protocol::{CompleteRequest, CompletionValues, McpResult};

use crate::session::Frame;

/// User hook backing `completion/complete`.
#[async_trait]
pub trait McpCompletion: Send + Sync {
    async fn complete(
        &self,
        request: CompleteRequest,
        frame: &mut Frame,
    ) -> McpResult<CompletionValues>;
}

/// Completion over a fixed candidate list, filtered by prefix.
pub struct StaticCompletion {
    values: Vec<String>,
}

impl StaticCompletion {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl McpCompletion for StaticCompletion {
    async fn complete(
        &self,
        request: CompleteRequest,
        _frame: &mut Frame,
    ) -> McpResult<CompletionValues> {
        let prefix = request.argument.value;
        let values: Vec<String> = self
            .values
            .iter()
            .filter(|candidate| candidate.starts_with(&prefix))
            .cloned()
            .collect();
        Ok(CompletionValues::new(values))
    }
}
