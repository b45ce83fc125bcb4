//! Resource descriptors and the resources/* payloads.

use serde::{Deserialize, Serialize};

/// A resource descriptor as returned by `resources/list`.
///
/// Exactly one of `uri` (concrete) or `uri_template` (parameterised) should
/// be set; templated resources match reads by pattern and receive the
/// extracted variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri_template: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Resource {
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            uri_template: None,
            name: name.into(),
            description: None,
            mime_type: None,
        }
    }

    pub fn templated(template: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: None,
            uri_template: Some(template.into()),
            name: name.into(),
            description: None,
            mime_type: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// The contents of one read resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64 payload for binary resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

impl ResourceContents {
    pub fn text(uri: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: Some("text/plain".to_string()),
            text: Some(text.into()),
            blob: None,
        }
    }
}

/// Parameters of `resources/read`, `resources/subscribe`, and
/// `resources/unsubscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResourceRequest {
    pub uri: String,
}

pub type SubscribeRequest = ReadResourceRequest;

/// Result of `resources/read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContents>,
}

/// Result of `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResult {
    pub resources: Vec<Resource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl ListResourcesResult {
    pub fn new(resources: Vec<Resource>) -> Self {
        Self {
            resources,
            next_cursor: None,
        }
    }

    pub fn with_next_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.next_cursor = Some(cursor.into());
        self
    }
}

/// Params of `notifications/resources/updated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUpdatedParams {
    pub uri: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_serialization() {
        let resource = Resource::new("file:///readme.md", "readme")
            .with_mime_type("text/markdown");
        let value = serde_json::to_value(&resource).unwrap();

        assert_eq!(value["uri"], "file:///readme.md");
        assert_eq!(value["mimeType"], "text/markdown");
        assert!(value.get("uriTemplate").is_none());
    }

    #[test]
    fn test_templated_resource() {
        let resource = Resource::templated("file:///users/{id}.json", "user record");
        let value = serde_json::to_value(&resource).unwrap();
        assert_eq!(value["uriTemplate"], "file:///users/{id}.json");
        assert!(value.get("uri").is_none());
    }

    #[test]
    fn test_text_contents() {
        let contents = ResourceContents::text("file:///a.txt", "hello");
        assert_eq!(contents.text.as_deref(), Some("hello"));
        assert!(contents.blob.is_none());
    }
}
