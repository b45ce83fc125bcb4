use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{JsonRpcVersion, RequestId};

/// Result payload of a successful JSON-RPC response.
///
/// Wraps the raw value so that `null` results survive the round trip
/// distinctly from an absent `result` field, which the codec rejects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseResult(pub Value);

impl ResponseResult {
    pub fn new(value: Value) -> Self {
        ResponseResult(value)
    }

    pub fn empty_object() -> Self {
        ResponseResult(Value::Object(serde_json::Map::new()))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for ResponseResult {
    fn from(value: Value) -> Self {
        ResponseResult(value)
    }
}

/// A successful JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub id: RequestId,
    pub result: ResponseResult,
}

impl JsonRpcResponse {
    pub fn new(id: RequestId, result: impl Into<ResponseResult>) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id,
            result: result.into(),
        }
    }

    /// Response with an empty `{}` result, used for acks.
    pub fn empty(id: RequestId) -> Self {
        Self::new(id, ResponseResult::empty_object())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{from_str, json, to_string};

    #[test]
    fn test_response_round_trip() {
        let response = JsonRpcResponse::new(RequestId::Number(1), json!({"ok": true}));

        let json_str = to_string(&response).unwrap();
        let parsed: JsonRpcResponse = from_str(&json_str).unwrap();

        assert_eq!(parsed.id, RequestId::Number(1));
        assert_eq!(parsed.result.as_value(), &json!({"ok": true}));
    }

    #[test]
    fn test_empty_response() {
        let response = JsonRpcResponse::empty(RequestId::String("a".to_string()));
        let json_str = to_string(&response).unwrap();
        assert!(json_str.contains("\"result\":{}"));
    }

    #[test]
    fn test_null_result_survives() {
        let response = JsonRpcResponse::new(RequestId::Number(2), Value::Null);
        let json_str = to_string(&response).unwrap();
        assert!(json_str.contains("\"result\":null"));
    }
}
