//! Pagination cursors.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::McpError;

/// An opaque pagination cursor.
///
/// On the wire a cursor is an arbitrary string; this implementation encodes
/// the absolute offset into a stable, name-ordered listing so that a walk
/// from a given start makes forward progress and never yields duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub offset: usize,
}

impl Cursor {
    pub fn start() -> Self {
        Cursor { offset: 0 }
    }

    /// Encode for the wire.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("o:{}", self.offset))
    }

    /// Decode a client-supplied cursor. A cursor we did not mint is an
    /// invalid-params condition, not a server fault.
    pub fn decode(text: &str) -> Result<Self, McpError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(text)
            .map_err(|_| McpError::invalid_params("malformed cursor"))?;
        let decoded =
            String::from_utf8(bytes).map_err(|_| McpError::invalid_params("malformed cursor"))?;
        let offset = decoded
            .strip_prefix("o:")
            .and_then(|rest| rest.parse::<usize>().ok())
            .ok_or_else(|| McpError::invalid_params("malformed cursor"))?;
        Ok(Cursor { offset })
    }
}

/// Slice one page out of a stable, ordered listing.
///
/// Returns the page and, when more items remain, the cursor for the next
/// call.
pub fn paginate<T: Clone>(items: &[T], cursor: Option<&Cursor>, limit: usize) -> (Vec<T>, Option<Cursor>) {
    let offset = cursor.map(|c| c.offset).unwrap_or(0);
    if offset >= items.len() {
        return (Vec::new(), None);
    }

    let end = (offset + limit).min(items.len());
    let page = items[offset..end].to_vec();
    let next = (end < items.len()).then_some(Cursor { offset: end });
    (page, next)
}
