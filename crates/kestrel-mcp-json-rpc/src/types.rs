use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

/// JSON-RPC protocol version marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JsonRpcVersion {
    #[serde(rename = "2.0")]
    V2_0,
}

impl Default for JsonRpcVersion {
    fn default() -> Self {
        JsonRpcVersion::V2_0
    }
}

/// A JSON-RPC request identifier: opaque string or integer.
///
/// Ids are unique within a single side of the connection and never reused
/// while a pending-table entry for them exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

/// Monotonic request-id source for one side of a connection.
///
/// Ids start at 1 so that 0 never appears on the wire and can be used as a
/// sentinel in logs.
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    counter: AtomicI64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicI64::new(0),
        }
    }

    /// Produce the next unique request id.
    pub fn next_id(&self) -> RequestId {
        RequestId::Number(self.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Produce the next progress token, derived from the same sequence.
    pub fn next_progress_token(&self) -> String {
        format!("pt-{}", self.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_serialization() {
        let num: RequestId = serde_json::from_str("42").unwrap();
        assert_eq!(num, RequestId::Number(42));

        let text: RequestId = serde_json::from_str("\"req-1\"").unwrap();
        assert_eq!(text, RequestId::String("req-1".to_string()));

        assert_eq!(serde_json::to_string(&RequestId::Number(7)).unwrap(), "7");
    }

    #[test]
    fn test_invalid_request_id() {
        assert!(serde_json::from_str::<RequestId>("true").is_err());
        assert!(serde_json::from_str::<RequestId>("{}").is_err());
    }

    #[test]
    fn test_id_generator_is_monotonic() {
        let generator = RequestIdGenerator::new();
        let first = generator.next_id();
        let second = generator.next_id();
        assert_eq!(first, RequestId::Number(1));
        assert_eq!(second, RequestId::Number(2));
    }

    #[test]
    fn test_version_round_trip() {
        let json = serde_json::to_string(&JsonRpcVersion::V2_0).unwrap();
        assert_eq!(json, "\"2.0\"");
        assert!(serde_json::from_str::<JsonRpcVersion>("\"1.0\"").is_err());
    }
}
