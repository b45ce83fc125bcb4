//! Initialize handshake types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::version::ProtocolVersion;

/// Describes the name and version of an MCP implementation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Implementation {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Implementation {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Client-side root listing capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootsCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Client-side sampling capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Capabilities a client may advertise
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
}

impl ClientCapabilities {
    pub fn supports_roots(&self) -> bool {
        self.roots.is_some()
    }

    pub fn supports_sampling(&self) -> bool {
        self.sampling.is_some()
    }
}

/// Server-side prompt capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Server-side tool capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Server-side resource capability, with the subscribe sub-capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Server-side logging capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Server-side completion capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionsCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Capabilities a server may advertise
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<CompletionsCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
}

impl ServerCapabilities {
    pub fn supports_tools(&self) -> bool {
        self.tools.is_some()
    }

    pub fn supports_prompts(&self) -> bool {
        self.prompts.is_some()
    }

    pub fn supports_resources(&self) -> bool {
        self.resources.is_some()
    }

    pub fn supports_resource_subscriptions(&self) -> bool {
        self.resources
            .as_ref()
            .and_then(|r| r.subscribe)
            .unwrap_or(false)
    }

    pub fn supports_logging(&self) -> bool {
        self.logging.is_some()
    }

    pub fn supports_completions(&self) -> bool {
        self.completions.is_some()
    }

    /// The capability gate for a request method, if it has one.
    ///
    /// `None` means the method is ungated (`ping`); `Some(false)` means the
    /// gate is closed and the method must fail with MethodNotFound before
    /// any handler runs.
    pub fn gate(&self, method: &str) -> Option<bool> {
        use crate::methods;
        match method {
            methods::PING | methods::INITIALIZE => None,
            methods::TOOLS_LIST | methods::TOOLS_CALL => Some(self.supports_tools()),
            methods::PROMPTS_LIST | methods::PROMPTS_GET => Some(self.supports_prompts()),
            methods::RESOURCES_LIST | methods::RESOURCES_READ => Some(self.supports_resources()),
            methods::RESOURCES_SUBSCRIBE | methods::RESOURCES_UNSUBSCRIBE => {
                Some(self.supports_resource_subscriptions())
            }
            methods::COMPLETION_COMPLETE => Some(self.supports_completions()),
            methods::LOGGING_SET_LEVEL => Some(self.supports_logging()),
            _ => Some(false),
        }
    }
}

/// Parameters of the `initialize` request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    pub client_info: Implementation,
}

impl InitializeRequest {
    pub fn new(
        protocol_version: ProtocolVersion,
        capabilities: ClientCapabilities,
        client_info: Implementation,
    ) -> Self {
        Self {
            protocol_version: protocol_version.as_str().to_string(),
            capabilities,
            client_info,
        }
    }
}

/// Result payload of `initialize`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: Implementation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl InitializeResult {
    pub fn new(
        protocol_version: ProtocolVersion,
        capabilities: ServerCapabilities,
        server_info: Implementation,
    ) -> Self {
        Self {
            protocol_version: protocol_version.as_str().to_string(),
            capabilities,
            server_info,
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_request_serialization() {
        let request = InitializeRequest::new(
            ProtocolVersion::V2025_06_18,
            ClientCapabilities::default(),
            Implementation::new("test-client", "1.0.0"),
        );

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"protocolVersion\":\"2025-06-18\""));
        assert!(json.contains("\"clientInfo\""));
    }

    #[test]
    fn test_capability_gates() {
        let caps = ServerCapabilities {
            tools: Some(ToolsCapabilities::default()),
            resources: Some(ResourcesCapabilities {
                subscribe: Some(true),
                list_changed: None,
            }),
            ..Default::default()
        };

        assert_eq!(caps.gate("ping"), None);
        assert_eq!(caps.gate("tools/call"), Some(true));
        assert_eq!(caps.gate("prompts/list"), Some(false));
        assert_eq!(caps.gate("resources/subscribe"), Some(true));
        assert_eq!(caps.gate("made/up"), Some(false));
    }

    #[test]
    fn test_subscribe_gate_requires_sub_capability() {
        let caps = ServerCapabilities {
            resources: Some(ResourcesCapabilities::default()),
            ..Default::default()
        };
        assert_eq!(caps.gate("resources/read"), Some(true));
        assert_eq!(caps.gate("resources/subscribe"), Some(false));
    }

    #[test]
    fn test_empty_capabilities_serialize_compact() {
        let json = serde_json::to_string(&ClientCapabilities::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
