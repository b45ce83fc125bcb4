use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{JsonRpcVersion, RequestId};

/// Parameters for a JSON-RPC request or notification.
///
/// MCP only ever sends named parameters, but positional arrays are legal
/// JSON-RPC and are preserved through the codec untouched.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RequestParams {
    Object(Map<String, Value>),
    Array(Vec<Value>),
}

impl RequestParams {
    /// Get a named parameter (object params only).
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            RequestParams::Object(map) => map.get(key),
            RequestParams::Array(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RequestParams::Object(map) => map.is_empty(),
            RequestParams::Array(vec) => vec.is_empty(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            RequestParams::Object(map) => Value::Object(map.clone()),
            RequestParams::Array(vec) => Value::Array(vec.clone()),
        }
    }
}

impl From<Map<String, Value>> for RequestParams {
    fn from(map: Map<String, Value>) -> Self {
        RequestParams::Object(map)
    }
}

impl TryFrom<Value> for RequestParams {
    type Error = Value;

    /// Accepts objects and arrays; anything else is handed back unchanged.
    fn try_from(value: Value) -> Result<Self, Value> {
        match value {
            Value::Object(map) => Ok(RequestParams::Object(map)),
            Value::Array(vec) => Ok(RequestParams::Array(vec)),
            other => Err(other),
        }
    }
}

/// A JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<RequestParams>,
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<RequestParams>) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id,
            method: method.into(),
            params,
        }
    }

    /// Create a request carrying a params object built from a JSON value.
    ///
    /// Non-object, non-array values are dropped; MCP methods always take
    /// named parameters.
    pub fn with_value_params(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self::new(id, method, RequestParams::try_from(params).ok())
    }

    /// Get a named parameter.
    pub fn get_param(&self, name: &str) -> Option<&Value> {
        self.params.as_ref()?.get(name)
    }

    /// Params as a JSON value, `null` when absent.
    pub fn params_value(&self) -> Value {
        self.params
            .as_ref()
            .map(RequestParams::to_value)
            .unwrap_or(Value::Null)
    }
}
