//! URI templates for parameterised resources.
//!
//! Patterns like `file:///users/{user_id}.json` compile to a regex that
//! matches concrete URIs and extracts the variable values handed to the
//! resource handler.

use std::collections::HashMap;

use regex::Regex;

use kestrel_mcp_protocol::{McpError, McpResult};

/// A compiled URI template.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    pattern: String,
    regex: Regex,
    variables: Vec<String>,
}

impl UriTemplate {
    pub fn new(pattern: &str) -> McpResult<Self> {
        let mut variables = Vec::new();
        let mut regex_source = String::from("^");
        let mut rest = pattern;

        while let Some(open) = rest.find('{') {
            let (literal, after_open) = rest.split_at(open);
            regex_source.push_str(&regex::escape(literal));

            let close = after_open.find('}').ok_or_else(|| {
                McpError::invalid_params(format!("unclosed variable in template '{}'", pattern))
            })?;
            let name = &after_open[1..close];
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(McpError::invalid_params(format!(
                    "invalid variable name '{}' in template '{}'",
                    name, pattern
                )));
            }
            if variables.iter().any(|v| v == name) {
                return Err(McpError::invalid_params(format!(
                    "duplicate variable '{}' in template '{}'",
                    name, pattern
                )));
            }
            variables.push(name.to_string());
            regex_source.push_str(&format!("(?P<{}>[^/]+)", name));
            rest = &after_open[close + 1..];
        }
        regex_source.push_str(&regex::escape(rest));
        regex_source.push('$');

        let regex = Regex::new(&regex_source)
            .map_err(|e| McpError::internal(format!("template compilation failed: {}", e)))?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            variables,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Match a concrete URI, extracting the variable values.
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(uri)?;
        Some(
            self.variables
                .iter()
                .filter_map(|name| {
                    captures
                        .name(name)
                        .map(|m| (name.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_template_match() {
        let template = UriTemplate::new("file:///users/{user_id}.json").unwrap();
        let params = template.matches("file:///users/alice.json").unwrap();
        assert_eq!(params.get("user_id").unwrap(), "alice");
    }

    #[test]
    fn test_multiple_variables() {
        let template = UriTemplate::new("db://{table}/{row_id}").unwrap();
        let params = template.matches("db://users/42").unwrap();
        assert_eq!(params.get("table").unwrap(), "users");
        assert_eq!(params.get("row_id").unwrap(), "42");
    }

    #[test]
    fn test_non_matching_uri() {
        let template = UriTemplate::new("file:///users/{user_id}.json").unwrap();
        assert!(template.matches("file:///groups/alice.json").is_none());
        assert!(template.matches("file:///users/alice.txt").is_none());
    }

    #[test]
    fn test_variable_does_not_cross_segments() {
        let template = UriTemplate::new("file:///{name}.txt").unwrap();
        assert!(template.matches("file:///a/b.txt").is_none());
    }

    #[test]
    fn test_invalid_templates_rejected() {
        assert!(UriTemplate::new("file:///{unclosed").is_err());
        assert!(UriTemplate::new("file:///{}").is_err());
        assert!(UriTemplate::new("file:///{a}/{a}").is_err());
        assert!(UriTemplate::new("file:///{bad-name}").is_err());
    }

    #[test]
    fn test_literal_template_is_exact() {
        let template = UriTemplate::new("memo://status").unwrap();
        assert!(template.matches("memo://status").is_some());
        assert!(template.matches("memo://status/extra").is_none());
        assert!(template.variables().is_empty());
    }
}
