//! The resource component trait.

use std::collections::HashMap;

use async_trait::async_trait;

use kestrel_mcp_protocol::{McpResult, Resource, ResourceContents};

use crate::session::Frame;

/// URI-addressable data the server exposes.
///
/// A resource is either concrete (exact `uri`) or templated
/// (`uri_template` with `{variable}` segments); templated reads receive the
/// extracted variables.
#[async_trait]
pub trait McpResource: Send + Sync {
    fn name(&self) -> &str;

    fn uri(&self) -> Option<&str> {
        None
    }

    fn uri_template(&self) -> Option<&str> {
        None
    }

    fn description(&self) -> Option<&str> {
        None
    }

    fn mime_type(&self) -> Option<&str> {
        None
    }

    /// Read the resource at `uri`. For templated resources `params` holds
    /// the extracted variables; for concrete ones it is empty.
    async fn read(
        &self,
        uri: &str,
        params: HashMap<String, String>,
        frame: &mut Frame,
    ) -> McpResult<Vec<ResourceContents>>;

    fn to_descriptor(&self) -> Resource {
        let mut resource = match (self.uri(), self.uri_template()) {
            (Some(uri), _) => Resource::new(uri, self.name()),
            (None, Some(template)) => Resource::templated(template, self.name()),
            (None, None) => Resource::new("", self.name()),
        };
        if let Some(description) = self.description() {
            resource = resource.with_description(description);
        }
        if let Some(mime_type) = self.mime_type() {
            resource = resource.with_mime_type(mime_type);
        }
        resource
    }
}
