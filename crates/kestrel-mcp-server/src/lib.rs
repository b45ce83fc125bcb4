//! # Kestrel MCP Server
//!
//! High-level framework for building Model Context Protocol servers:
//! register tools, prompts, and resources on a builder, and every client
//! session becomes an independent actor with its own serialised mailbox,
//! negotiated protocol version, capability set, and user state frame.
//!
//! ```rust,no_run
//! use kestrel_mcp_server::McpServerBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = McpServerBuilder::new("example-server", "0.1.0")
//!         .bind("127.0.0.1:8080".parse()?)
//!         .build();
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod builder;
pub mod completion;
pub mod dispatcher;
pub mod notifications;
pub mod prompt;
pub mod registry;
pub mod resource;
pub mod server;
pub mod session;
pub mod tool;
pub mod uri_template;

pub use auth::{AuthConfig, AuthContext, AuthError, TokenValidator};
pub use builder::McpServerBuilder;
pub use completion::{McpCompletion, StaticCompletion};
pub use dispatcher::Dispatcher;
pub use notifications::{ChannelSink, ComponentKind, FrameSink, NullSink};
pub use prompt::McpPrompt;
pub use registry::SessionRegistry;
pub use resource::McpResource;
pub use server::{McpServer, McpServerConfig};
pub use session::{CancelFlag, Frame, SessionHandle, SessionSendError, SessionState};
pub use tool::McpTool;
pub use uri_template::UriTemplate;

// Re-export the protocol surface handlers interact with.
pub use kestrel_mcp_protocol::{
    CallToolResult, McpError, McpResult, PromptMessage, ResourceContents, ToolContent, ToolSchema,
};
