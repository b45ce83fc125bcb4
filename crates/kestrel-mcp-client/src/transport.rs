//! The transport contract.
//!
//! A transport owns its socket or pipes exclusively; the engine interacts
//! with it by value: frames out through [`Transport::send`], frames in
//! through the event channel returned by [`Transport::start`]. Inbound
//! ordering is preserved.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use kestrel_mcp_json_rpc::JsonRpcFrame;

use crate::error::TransportError;

pub mod http;
pub mod sse;
pub mod stdio;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

/// Inbound delivery from the transport to the engine.
#[derive(Debug)]
pub enum TransportEvent {
    Frame(JsonRpcFrame),
    /// The transport hit an unrecoverable condition and is done.
    Closed,
}

/// Contract implemented by stdio and streamable HTTP.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect and return the inbound event channel. Called once.
    async fn start(&self) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;

    /// Ship one frame. Must complete or fail within `timeout`.
    async fn send(&self, frame: &JsonRpcFrame, timeout: Duration) -> Result<(), TransportError>;

    /// Ship several frames as one wire batch (a JSON array).
    async fn send_batch(
        &self,
        frames: &[JsonRpcFrame],
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Graceful flush and close. Idempotent.
    async fn shutdown(&self) -> Result<(), TransportError>;
}
