use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::RequestParams;
use crate::types::JsonRpcVersion;

/// A JSON-RPC notification (request without an id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<RequestParams>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<RequestParams>) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            method: method.into(),
            params,
        }
    }

    /// Create a notification carrying a params object built from a JSON value.
    pub fn with_value_params(method: impl Into<String>, params: Value) -> Self {
        Self::new(method, RequestParams::try_from(params).ok())
    }

    /// Get a named parameter.
    pub fn get_param(&self, name: &str) -> Option<&Value> {
        self.params.as_ref()?.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{from_str, json, to_string};

    #[test]
    fn test_notification_has_no_id() {
        let notification = JsonRpcNotification::new("notifications/initialized", None);
        let json_str = to_string(&notification).unwrap();

        assert!(!json_str.contains("\"id\""));
        assert!(json_str.contains("\"jsonrpc\":\"2.0\""));
        assert!(json_str.contains("\"method\":\"notifications/initialized\""));
    }

    #[test]
    fn test_notification_params_access() {
        let notification = JsonRpcNotification::with_value_params(
            "notifications/progress",
            json!({"progressToken": "t1", "progress": 0.5, "total": 1.0}),
        );

        let parsed: JsonRpcNotification =
            from_str(&to_string(&notification).unwrap()).unwrap();
        assert_eq!(parsed.get_param("progressToken"), Some(&json!("t1")));
        assert_eq!(parsed.get_param("progress"), Some(&json!(0.5)));
    }
}
