//! Authorization port.
//!
//! The framework consumes tokens, it never issues them: a pluggable
//! [`TokenValidator`] turns a bearer token into an [`AuthContext`], and the
//! dispatcher enforces tool scope requirements against it.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

/// The validated identity attached to a session.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub subject: String,
    pub audience: Option<String>,
    pub scopes: Vec<String>,
    /// Expiry as Unix seconds
    pub expiry: Option<u64>,
    pub claims: HashMap<String, Value>,
}

impl AuthContext {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Validation failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token")]
    Invalid,
    #[error("expired token")]
    Expired,
}

/// The token validation capability.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<AuthContext, AuthError>;
}

/// Authorization configuration for a server.
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub validator: Option<std::sync::Arc<dyn TokenValidator>>,
    /// Realm advertised in `WWW-Authenticate` challenges
    pub realm: Option<String>,
    pub scopes_supported: Vec<String>,
    pub audience: Option<String>,
}

impl AuthConfig {
    /// The challenge string sent back with Unauthorized errors.
    pub fn challenge(&self) -> String {
        match &self.realm {
            Some(realm) => format!("Bearer realm=\"{}\"", realm),
            None => "Bearer".to_string(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("validator", &self.validator.is_some())
            .field("realm", &self.realm)
            .field("scopes_supported", &self.scopes_supported)
            .field("audience", &self.audience)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_check() {
        let context = AuthContext::new("user-1").with_scopes(["read", "write"]);
        assert!(context.has_scope("read"));
        assert!(!context.has_scope("admin"));
    }

    #[test]
    fn test_challenge_format() {
        let config = AuthConfig {
            realm: Some("mcp".to_string()),
            ..Default::default()
        };
        assert_eq!(config.challenge(), "Bearer realm=\"mcp\"");
        assert_eq!(AuthConfig::default().challenge(), "Bearer");
    }
}
