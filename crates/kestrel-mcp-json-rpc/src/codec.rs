//! Frame classification and batch codec.
//!
//! Decoding is strict JSON but lenient on unknown fields. Classification:
//! `method` + `id` is a request, `method` alone a notification, `id` +
//! `result` a response, `id` + `error` an error frame. Anything else is an
//! invalid frame, reported with the best id that could be recovered.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::JsonRpcError;
use crate::notification::JsonRpcNotification;
use crate::request::JsonRpcRequest;
use crate::response::JsonRpcResponse;
use crate::types::RequestId;
use crate::JSONRPC_VERSION;

/// A classified JSON-RPC 2.0 frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcFrame {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
    Error(JsonRpcError),
}

impl JsonRpcFrame {
    pub fn is_request(&self) -> bool {
        matches!(self, JsonRpcFrame::Request(_))
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, JsonRpcFrame::Notification(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, JsonRpcFrame::Response(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, JsonRpcFrame::Error(_))
    }

    pub fn is_initialize(&self) -> bool {
        matches!(self, JsonRpcFrame::Request(r) if r.method == "initialize")
    }

    /// The frame's request id, when it carries one.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcFrame::Request(r) => Some(&r.id),
            JsonRpcFrame::Notification(_) => None,
            JsonRpcFrame::Response(r) => Some(&r.id),
            JsonRpcFrame::Error(e) => e.id.as_ref(),
        }
    }

    /// The method name for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            JsonRpcFrame::Request(r) => Some(&r.method),
            JsonRpcFrame::Notification(n) => Some(&n.method),
            _ => None,
        }
    }
}

impl From<JsonRpcRequest> for JsonRpcFrame {
    fn from(request: JsonRpcRequest) -> Self {
        JsonRpcFrame::Request(request)
    }
}

impl From<JsonRpcNotification> for JsonRpcFrame {
    fn from(notification: JsonRpcNotification) -> Self {
        JsonRpcFrame::Notification(notification)
    }
}

impl From<JsonRpcResponse> for JsonRpcFrame {
    fn from(response: JsonRpcResponse) -> Self {
        JsonRpcFrame::Response(response)
    }
}

impl From<JsonRpcError> for JsonRpcFrame {
    fn from(error: JsonRpcError) -> Self {
        JsonRpcFrame::Error(error)
    }
}

/// Codec failures.
///
/// `InvalidFrame` carries the best-known request id so transports can
/// answer with a correlated error frame.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid JSON-RPC frame: {reason}")]
    InvalidFrame {
        id: Option<RequestId>,
        reason: String,
    },
}

impl CodecError {
    fn invalid(id: Option<RequestId>, reason: impl Into<String>) -> Self {
        CodecError::InvalidFrame {
            id,
            reason: reason.into(),
        }
    }
}

/// Decode a payload holding a single message or a batch array.
///
/// A batch is returned in wire order. An empty batch array is itself an
/// invalid request per JSON-RPC 2.0.
pub fn decode(text: &str) -> Result<Vec<JsonRpcFrame>, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(CodecError::invalid(None, "empty batch"));
            }
            items.into_iter().map(decode_value).collect()
        }
        other => Ok(vec![decode_value(other)?]),
    }
}

/// Classify one decoded JSON value as a frame.
pub fn decode_value(value: Value) -> Result<JsonRpcFrame, CodecError> {
    let Value::Object(ref map) = value else {
        return Err(CodecError::invalid(None, "frame is not a JSON object"));
    };

    // Recover an id first so later failures can carry it. A null id is
    // tolerated here; only error frames may legitimately keep it.
    let raw_id = map.get("id");
    let id = match raw_id {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(RequestId::String(s.clone())),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Some(RequestId::Number(i)),
            None => return Err(CodecError::invalid(None, "non-integer numeric id")),
        },
        Some(_) => return Err(CodecError::invalid(None, "id must be a string or integer")),
    };

    match map.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        Some(other) => {
            return Err(CodecError::invalid(
                id,
                format!("unsupported jsonrpc version '{}'", other),
            ));
        }
        None => return Err(CodecError::invalid(id, "missing jsonrpc version")),
    }

    let has_method = map.contains_key("method");
    let has_result = map.contains_key("result");
    let has_error = map.contains_key("error");

    if has_method {
        if has_result || has_error {
            return Err(CodecError::invalid(id, "method frame with result/error"));
        }
        return if raw_id.is_some_and(|v| !v.is_null()) {
            let request: JsonRpcRequest = serde_json::from_value(value)?;
            Ok(JsonRpcFrame::Request(request))
        } else if raw_id.is_none() {
            let notification: JsonRpcNotification = serde_json::from_value(value)?;
            Ok(JsonRpcFrame::Notification(notification))
        } else {
            Err(CodecError::invalid(None, "request with null id"))
        };
    }

    match (has_result, has_error) {
        (true, true) => Err(CodecError::invalid(id, "both result and error present")),
        (true, false) => {
            if id.is_none() {
                return Err(CodecError::invalid(None, "response without id"));
            }
            let response: JsonRpcResponse = serde_json::from_value(value)?;
            Ok(JsonRpcFrame::Response(response))
        }
        (false, true) => {
            // Null id is allowed on errors where the request never parsed.
            let error: JsonRpcError = serde_json::from_value(value)?;
            Ok(JsonRpcFrame::Error(error))
        }
        (false, false) => Err(CodecError::invalid(id, "neither method, result nor error")),
    }
}

/// Encode one frame.
pub fn encode(frame: &JsonRpcFrame) -> Result<String, CodecError> {
    Ok(serde_json::to_string(frame)?)
}

/// Encode a batch as a JSON array.
pub fn encode_batch(frames: &[JsonRpcFrame]) -> Result<String, CodecError> {
    Ok(serde_json::to_string(frames)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_one(value: Value) -> Result<JsonRpcFrame, CodecError> {
        decode_value(value)
    }

    #[test]
    fn test_classification() {
        let request = decode_one(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).unwrap();
        assert!(request.is_request());
        assert_eq!(request.method(), Some("ping"));

        let notification =
            decode_one(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).unwrap();
        assert!(notification.is_notification());
        assert!(notification.id().is_none());

        let response = decode_one(json!({"jsonrpc": "2.0", "id": 1, "result": {}})).unwrap();
        assert!(response.is_response());

        let error = decode_one(json!({
            "jsonrpc": "2.0", "id": 1,
            "error": {"code": -32601, "message": "Method not found"}
        }))
        .unwrap();
        assert!(error.is_error());
    }

    #[test]
    fn test_is_initialize() {
        let frame = decode_one(json!({
            "jsonrpc": "2.0", "id": "init-1", "method": "initialize",
            "params": {"protocolVersion": "2025-06-18"}
        }))
        .unwrap();
        assert!(frame.is_initialize());

        let other = decode_one(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"})).unwrap();
        assert!(!other.is_initialize());
    }

    #[test]
    fn test_response_result_xor_error() {
        let both = decode_one(json!({
            "jsonrpc": "2.0", "id": 1, "result": {},
            "error": {"code": -32000, "message": "x"}
        }));
        assert!(matches!(both, Err(CodecError::InvalidFrame { .. })));

        let neither = decode_one(json!({"jsonrpc": "2.0", "id": 1}));
        assert!(matches!(neither, Err(CodecError::InvalidFrame { .. })));
    }

    #[test]
    fn test_invalid_id_types() {
        let boolean = decode_one(json!({"jsonrpc": "2.0", "id": true, "method": "ping"}));
        assert!(boolean.is_err());

        let float = decode_one(json!({"jsonrpc": "2.0", "id": 1.5, "method": "ping"}));
        assert!(float.is_err());
    }

    #[test]
    fn test_null_id_only_for_errors() {
        let request = decode_one(json!({"jsonrpc": "2.0", "id": null, "method": "ping"}));
        assert!(request.is_err());

        let error = decode_one(json!({
            "jsonrpc": "2.0", "id": null,
            "error": {"code": -32700, "message": "Parse error"}
        }))
        .unwrap();
        assert!(error.is_error());
        assert!(error.id().is_none());
    }

    #[test]
    fn test_missing_version_rejected() {
        let frame = decode_one(json!({"id": 1, "method": "ping"}));
        assert!(frame.is_err());
    }

    #[test]
    fn test_unknown_fields_tolerated() {
        let frame = decode_one(json!({
            "jsonrpc": "2.0", "id": 1, "method": "ping", "x-trace": "abc"
        }));
        assert!(frame.is_ok());
    }

    #[test]
    fn test_batch_decode_preserves_order() {
        let text = json!([
            {"jsonrpc": "2.0", "id": 1, "method": "ping"},
            {"jsonrpc": "2.0", "method": "notifications/initialized"},
            {"jsonrpc": "2.0", "id": 2, "method": "tools/list"}
        ])
        .to_string();

        let frames = decode(&text).unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames[0].is_request());
        assert!(frames[1].is_notification());
        assert_eq!(frames[2].method(), Some("tools/list"));
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(decode("[]").is_err());
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(decode("{nope"), Err(CodecError::Parse(_))));
    }

    #[test]
    fn test_encode_decode_identity() {
        let frame: JsonRpcFrame =
            JsonRpcRequest::with_value_params(RequestId::Number(7), "tools/call", json!({"name": "echo"}))
                .into();
        let encoded = encode(&frame).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(encode(&decoded[0]).unwrap(), encoded);
    }

    #[test]
    fn test_invalid_frame_recovers_id() {
        let result = decode_one(json!({"jsonrpc": "2.0", "id": 9}));
        match result {
            Err(CodecError::InvalidFrame { id, .. }) => {
                assert_eq!(id, Some(RequestId::Number(9)));
            }
            other => panic!("expected invalid frame, got {:?}", other),
        }
    }
}
