//! Structured error taxonomy.
//!
//! Two planes: protocol-plane kinds serialise to JSON-RPC error frames with
//! their wire codes; `Cancelled` and `Timeout` are local-only and must never
//! cross the wire.

use serde_json::{Value, json};
use thiserror::Error;

use kestrel_mcp_json_rpc::{JsonRpcError, JsonRpcErrorObject, RequestId};

/// Result alias used throughout the framework.
pub type McpResult<T> = Result<T, McpError>;

/// Error kinds with their JSON-RPC codes.
#[derive(Debug, Clone, Error)]
pub enum McpError {
    /// -32700: malformed JSON
    #[error("parse error: {message}")]
    ParseError { message: String },

    /// -32600: well-formed JSON that is not a valid message
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// -32601: unknown method or capability not advertised
    #[error("method not found: {method}")]
    MethodNotFound { method: String },

    /// -32602: schema validation failure
    #[error("invalid params: {message}")]
    InvalidParams {
        message: String,
        data: Option<Value>,
    },

    /// -32603: catch-all
    #[error("internal error: {message}")]
    InternalError { message: String },

    /// -32002: resource not found / read failure
    #[error("resource error: {message}")]
    ResourceError {
        message: String,
        data: Option<Value>,
    },

    /// -32000: handler-reported failure
    #[error("execution error: {message}")]
    ExecutionError {
        message: String,
        data: Option<Value>,
    },

    /// -32001: auth missing/invalid/scope denied
    #[error("unauthorized: {message}")]
    Unauthorized {
        message: String,
        data: Option<Value>,
    },

    /// Local-only: the caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// Local-only: the request deadline fired.
    #[error("request timed out")]
    Timeout,
}

impl McpError {
    pub fn parse_error(message: impl Into<String>) -> Self {
        McpError::ParseError {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        McpError::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn method_not_found(method: impl Into<String>) -> Self {
        McpError::MethodNotFound {
            method: method.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        McpError::InvalidParams {
            message: message.into(),
            data: None,
        }
    }

    /// Schema validation failure with the validator's error list in `data`.
    pub fn validation_failed(message: impl Into<String>, errors: Vec<String>) -> Self {
        McpError::InvalidParams {
            message: message.into(),
            data: Some(json!({ "errors": errors })),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        McpError::InternalError {
            message: message.into(),
        }
    }

    pub fn missing_param(name: &str) -> Self {
        McpError::invalid_params(format!("missing required parameter '{}'", name))
    }

    pub fn resource_not_found(uri: &str) -> Self {
        McpError::ResourceError {
            message: format!("resource '{}' not found", uri),
            data: Some(json!({ "uri": uri })),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        McpError::ExecutionError {
            message: message.into(),
            data: None,
        }
    }

    /// Tool output failed its declared output schema.
    pub fn output_validation_failed(tool_name: &str, errors: Vec<String>) -> Self {
        McpError::ExecutionError {
            message: format!("tool '{}' returned output violating its schema", tool_name),
            data: Some(json!({ "tool_name": tool_name, "errors": errors })),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        McpError::Unauthorized {
            message: message.into(),
            data: None,
        }
    }

    /// Auth failure carrying challenge metadata for `WWW-Authenticate`.
    pub fn unauthorized_with_challenge(message: impl Into<String>, challenge: &str) -> Self {
        let message = message.into();
        McpError::Unauthorized {
            data: Some(json!({ "message": message.clone(), "wwwAuthenticate": challenge })),
            message,
        }
    }

    /// Reconstruct a kind from a wire error frame's code.
    pub fn from_wire(code: i64, message: String, data: Option<Value>) -> Self {
        match code {
            -32700 => McpError::ParseError { message },
            -32600 => McpError::InvalidRequest { message },
            -32601 => McpError::MethodNotFound { method: message },
            -32602 => McpError::InvalidParams { message, data },
            -32002 => McpError::ResourceError { message, data },
            -32000 => McpError::ExecutionError { message, data },
            -32001 => McpError::Unauthorized { message, data },
            _ => McpError::InternalError { message },
        }
    }

    /// The JSON-RPC code for protocol-plane kinds; `None` for local-only.
    pub fn code(&self) -> Option<i64> {
        match self {
            McpError::ParseError { .. } => Some(-32700),
            McpError::InvalidRequest { .. } => Some(-32600),
            McpError::MethodNotFound { .. } => Some(-32601),
            McpError::InvalidParams { .. } => Some(-32602),
            McpError::InternalError { .. } => Some(-32603),
            McpError::ResourceError { .. } => Some(-32002),
            McpError::ExecutionError { .. } => Some(-32000),
            McpError::Unauthorized { .. } => Some(-32001),
            McpError::Cancelled | McpError::Timeout => None,
        }
    }

    pub fn is_local_only(&self) -> bool {
        self.code().is_none()
    }

    /// Serialise to a JSON-RPC error frame for the given request id.
    ///
    /// Local-only kinds degrade to `InternalError` if they ever reach this
    /// path; callers are expected to keep them off the wire.
    pub fn to_json_rpc(&self, id: Option<RequestId>) -> JsonRpcError {
        let (code, data) = match self {
            McpError::InvalidParams { data, .. }
            | McpError::ResourceError { data, .. }
            | McpError::ExecutionError { data, .. }
            | McpError::Unauthorized { data, .. } => {
                (self.code().unwrap_or(-32603), data.clone())
            }
            _ => (self.code().unwrap_or(-32603), None),
        };

        let object = JsonRpcErrorObject {
            code,
            message: self.to_string(),
            data,
        };
        JsonRpcError::new(id, object)
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::parse_error(err.to_string())
    }
}

impl From<kestrel_mcp_json_rpc::CodecError> for McpError {
    fn from(err: kestrel_mcp_json_rpc::CodecError) -> Self {
        match err {
            kestrel_mcp_json_rpc::CodecError::Parse(e) => McpError::parse_error(e.to_string()),
            kestrel_mcp_json_rpc::CodecError::InvalidFrame { reason, .. } => {
                McpError::invalid_request(reason)
            }
        }
    }
}
