//! # Session Storage
//!
//! The persistence port for Kestrel MCP servers: a capability interface for
//! saving, loading, listing, and expiring session snapshots, plus the
//! per-session SSE event log used for stream replay. Adapters beyond the
//! in-memory reference implementation live outside the core.

pub mod traits;

#[cfg(feature = "in-memory")]
pub mod in_memory;

pub use traits::{
    LoadOutcome, SessionSnapshot, SessionStorage, SessionStorageError, SseEvent,
};

#[cfg(feature = "in-memory")]
pub use in_memory::InMemorySessionStorage;

/// Type alias for a boxed storage trait object.
pub type BoxedSessionStorage = dyn SessionStorage;
