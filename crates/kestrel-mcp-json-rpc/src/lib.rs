//! # JSON-RPC 2.0 Message Codec
//!
//! Transport-agnostic JSON-RPC 2.0 framing for the Kestrel MCP framework.
//! This crate owns the wire representation only: typed frames, strict
//! classification of decoded values (single messages and batches), and
//! request-id generation. Protocol semantics live upstream.

pub mod codec;
pub mod error;
pub mod notification;
pub mod request;
pub mod response;
pub mod types;

pub use codec::{CodecError, JsonRpcFrame, decode, decode_value, encode, encode_batch};
pub use error::{JsonRpcError, JsonRpcErrorCode, JsonRpcErrorObject};
pub use notification::JsonRpcNotification;
pub use request::{JsonRpcRequest, RequestParams};
pub use response::{JsonRpcResponse, ResponseResult};
pub use types::{JsonRpcVersion, RequestId, RequestIdGenerator};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // Server error range: -32099 to -32000
    pub const SERVER_ERROR_START: i64 = -32099;
    pub const SERVER_ERROR_END: i64 = -32000;
}
