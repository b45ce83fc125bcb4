//! # Kestrel MCP Client
//!
//! MCP client with a transport-independent protocol engine: a pending
//! table with per-call deadlines and cancellation, progress-token callback
//! routing, capability gating, batch calls, and handlers for
//! server-initiated sampling and roots requests. Ships a streamable HTTP
//! transport and a stdio child-process transport.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kestrel_mcp_client::{ClientConfig, HttpTransport, McpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(HttpTransport::new("http://127.0.0.1:8080/mcp")?);
//!     let client = McpClient::new(transport, ClientConfig::new("demo", "0.1.0"));
//!     client.connect().await?;
//!
//!     let tools = client.list_tools(None).await?;
//!     println!("{} tools", tools.tools.len());
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod transport;

pub use client::{CallOptions, CancelHandle, LogCallback, McpClient, ProgressCallback};
pub use config::{ClientConfig, RootsHandler, SamplingHandler};
pub use error::{ClientError, ClientResult, TransportError};
pub use transport::{HttpTransport, StdioTransport, Transport, TransportEvent};
pub use transport::sse::{SseEventBlock, SseParser};
