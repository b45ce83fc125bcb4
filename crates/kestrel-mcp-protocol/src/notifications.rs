//! Progress and cancellation notification payloads.

use serde::{Deserialize, Serialize};

use kestrel_mcp_json_rpc::RequestId;

/// An opaque token authorising progress notifications for one request.
///
/// Absence of a token on a request means the callee must not emit progress
/// for that call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    String(String),
    Number(i64),
}

impl From<&str> for ProgressToken {
    fn from(s: &str) -> Self {
        ProgressToken::String(s.to_string())
    }
}

impl From<String> for ProgressToken {
    fn from(s: String) -> Self {
        ProgressToken::String(s)
    }
}

/// Params of `notifications/progress`.
///
/// `progress` lies in `[0, total)` when a total is known; callbacks fire in
/// arrival order with no redelivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    pub progress_token: ProgressToken,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Params of `notifications/cancelled`.
///
/// Sent by the requester when a call is abandoned; `reason` is `"timeout"`
/// when the deadline fired and `"cancelled"` for user cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledParams {
    pub request_id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CancelledParams {
    pub fn new(request_id: RequestId, reason: impl Into<String>) -> Self {
        Self {
            request_id,
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_progress_params_round_trip() {
        let params: ProgressParams = serde_json::from_value(json!({
            "progressToken": "t1",
            "progress": 0.5,
            "total": 1.0
        }))
        .unwrap();

        assert_eq!(params.progress_token, ProgressToken::from("t1"));
        assert_eq!(params.progress, 0.5);
        assert_eq!(params.total, Some(1.0));
    }

    #[test]
    fn test_numeric_progress_token() {
        let params: ProgressParams = serde_json::from_value(json!({
            "progressToken": 7,
            "progress": 1.0
        }))
        .unwrap();
        assert_eq!(params.progress_token, ProgressToken::Number(7));
    }

    #[test]
    fn test_cancelled_params_serialization() {
        let params = CancelledParams::new(RequestId::Number(3), "timeout");
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["requestId"], 3);
        assert_eq!(value["reason"], "timeout");
    }
}
