//! Protocol version negotiation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A dated MCP protocol revision.
///
/// Both sides advertise a list; the initialize handshake pins exactly one
/// per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    #[serde(rename = "2024-11-05")]
    V2024_11_05,
    #[serde(rename = "2025-03-26")]
    V2025_03_26,
    #[serde(rename = "2025-06-18")]
    V2025_06_18,
}

impl ProtocolVersion {
    /// The newest revision this crate implements.
    pub const LATEST: ProtocolVersion = ProtocolVersion::V2025_06_18;

    /// All supported revisions, newest first. This is the default
    /// advertisement for both sides.
    pub const SUPPORTED: [ProtocolVersion; 3] = [
        ProtocolVersion::V2025_06_18,
        ProtocolVersion::V2025_03_26,
        ProtocolVersion::V2024_11_05,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V2024_11_05 => "2024-11-05",
            ProtocolVersion::V2025_03_26 => "2025-03-26",
            ProtocolVersion::V2025_06_18 => "2025-06-18",
        }
    }

    /// Returns whether this revision supports the streamable HTTP transport.
    pub fn supports_streamable_http(&self) -> bool {
        matches!(
            self,
            ProtocolVersion::V2025_03_26 | ProtocolVersion::V2025_06_18
        )
    }

    /// Pick the best common revision between a requested version and a
    /// supported list, preferring the exact request.
    pub fn negotiate(requested: &str, supported: &[ProtocolVersion]) -> Option<ProtocolVersion> {
        let requested = requested.parse::<ProtocolVersion>().ok()?;
        supported.iter().copied().find(|v| *v == requested)
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::LATEST
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVersion {
    type Err = UnknownVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2024-11-05" => Ok(ProtocolVersion::V2024_11_05),
            "2025-03-26" => Ok(ProtocolVersion::V2025_03_26),
            "2025-06-18" => Ok(ProtocolVersion::V2025_06_18),
            _ => Err(UnknownVersion(s.to_string())),
        }
    }
}

/// Error for unrecognised version strings.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown protocol version '{0}'")]
pub struct UnknownVersion(pub String);
