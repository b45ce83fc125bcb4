//! logging/setLevel and notifications/message payloads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// RFC 5424 severity levels, least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LoggingLevel {
    /// Whether a message at `level` passes a session whose floor is `self`.
    pub fn allows(&self, level: LoggingLevel) -> bool {
        level >= *self
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoggingLevel::Debug => "debug",
            LoggingLevel::Info => "info",
            LoggingLevel::Notice => "notice",
            LoggingLevel::Warning => "warning",
            LoggingLevel::Error => "error",
            LoggingLevel::Critical => "critical",
            LoggingLevel::Alert => "alert",
            LoggingLevel::Emergency => "emergency",
        }
    }
}

impl Default for LoggingLevel {
    fn default() -> Self {
        LoggingLevel::Info
    }
}

impl fmt::Display for LoggingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoggingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(LoggingLevel::Debug),
            "info" => Ok(LoggingLevel::Info),
            "notice" => Ok(LoggingLevel::Notice),
            "warning" => Ok(LoggingLevel::Warning),
            "error" => Ok(LoggingLevel::Error),
            "critical" => Ok(LoggingLevel::Critical),
            "alert" => Ok(LoggingLevel::Alert),
            "emergency" => Ok(LoggingLevel::Emergency),
            other => Err(format!("unknown logging level '{}'", other)),
        }
    }
}

/// Parameters of `logging/setLevel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLevelRequest {
    pub level: LoggingLevel,
}

/// Params of `notifications/message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingMessageParams {
    pub level: LoggingLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LoggingLevel::Debug < LoggingLevel::Error);
        assert!(LoggingLevel::Warning.allows(LoggingLevel::Error));
        assert!(!LoggingLevel::Warning.allows(LoggingLevel::Info));
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("warning".parse::<LoggingLevel>().unwrap(), LoggingLevel::Warning);
        assert!("verbose".parse::<LoggingLevel>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&LoggingLevel::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
    }
}
