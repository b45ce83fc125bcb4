//! JSON Schema subset and the validation capability.
//!
//! Tool inputs and outputs are described with a small, explicit schema
//! vocabulary. Validation is exposed behind [`SchemaValidator`] so an
//! external engine can be substituted; [`validate_against`] is the built-in
//! reference implementation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON Schema definition (the subset MCP components use).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JsonSchema {
    String {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
        enum_values: Option<Vec<String>>,
    },
    Number {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
    },
    Integer {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        minimum: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        maximum: Option<i64>,
    },
    Boolean {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Array {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        items: Option<Box<JsonSchema>>,
    },
    Object {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        properties: Option<HashMap<String, JsonSchema>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        required: Option<Vec<String>>,
    },
}

impl JsonSchema {
    pub fn string() -> Self {
        Self::String {
            description: None,
            enum_values: None,
        }
    }

    pub fn string_with_description(description: impl Into<String>) -> Self {
        Self::String {
            description: Some(description.into()),
            enum_values: None,
        }
    }

    pub fn string_enum(values: Vec<String>) -> Self {
        Self::String {
            description: None,
            enum_values: Some(values),
        }
    }

    pub fn number() -> Self {
        Self::Number {
            description: None,
            minimum: None,
            maximum: None,
        }
    }

    pub fn integer() -> Self {
        Self::Integer {
            description: None,
            minimum: None,
            maximum: None,
        }
    }

    pub fn boolean() -> Self {
        Self::Boolean { description: None }
    }

    pub fn array(items: JsonSchema) -> Self {
        Self::Array {
            description: None,
            items: Some(Box::new(items)),
        }
    }

    pub fn object(properties: HashMap<String, JsonSchema>) -> Self {
        Self::Object {
            description: None,
            properties: Some(properties),
            required: None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            JsonSchema::String { .. } => "string",
            JsonSchema::Number { .. } => "number",
            JsonSchema::Integer { .. } => "integer",
            JsonSchema::Boolean { .. } => "boolean",
            JsonSchema::Array { .. } => "array",
            JsonSchema::Object { .. } => "object",
        }
    }
}

/// Top-level schema for tool input or output: always an object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, JsonSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl ToolSchema {
    pub fn object() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: None,
            required: None,
        }
    }

    pub fn with_properties(mut self, properties: HashMap<String, JsonSchema>) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn with_required(mut self, required: Vec<String>) -> Self {
        self.required = Some(required);
        self
    }
}

/// Pluggable validation capability.
///
/// Returns `Ok(())` when the value conforms, else the list of violations.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, schema: &ToolSchema, value: &Value) -> Result<(), Vec<String>>;
}

/// Built-in validator covering the schema subset above.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinValidator;

impl SchemaValidator for BuiltinValidator {
    fn validate(&self, schema: &ToolSchema, value: &Value) -> Result<(), Vec<String>> {
        validate_against(schema, value)
    }
}

/// Validate `value` against a tool schema.
pub fn validate_against(schema: &ToolSchema, value: &Value) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    let Value::Object(map) = value else {
        return Err(vec![format!("expected object, got {}", json_type(value))]);
    };

    if let Some(required) = &schema.required {
        for name in required {
            if !map.contains_key(name) {
                errors.push(format!("missing required property '{}'", name));
            }
        }
    }

    if let Some(properties) = &schema.properties {
        for (name, property_schema) in properties {
            if let Some(property) = map.get(name) {
                check_value(name, property_schema, property, &mut errors);
            }
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn check_value(path: &str, schema: &JsonSchema, value: &Value, errors: &mut Vec<String>) {
    match (schema, value) {
        (JsonSchema::String { enum_values, .. }, Value::String(s)) => {
            if let Some(allowed) = enum_values {
                if !allowed.contains(s) {
                    errors.push(format!("'{}' is not an allowed value for '{}'", s, path));
                }
            }
        }
        (JsonSchema::Number { minimum, maximum, .. }, Value::Number(n)) => {
            if let Some(v) = n.as_f64() {
                if minimum.is_some_and(|min| v < min) || maximum.is_some_and(|max| v > max) {
                    errors.push(format!("'{}' is out of range", path));
                }
            }
        }
        (JsonSchema::Integer { minimum, maximum, .. }, Value::Number(n)) => match n.as_i64() {
            Some(v) => {
                if minimum.is_some_and(|min| v < min) || maximum.is_some_and(|max| v > max) {
                    errors.push(format!("'{}' is out of range", path));
                }
            }
            None => errors.push(format!("'{}' must be an integer", path)),
        },
        (JsonSchema::Boolean { .. }, Value::Bool(_)) => {}
        (JsonSchema::Array { items, .. }, Value::Array(elements)) => {
            if let Some(item_schema) = items {
                for (index, element) in elements.iter().enumerate() {
                    check_value(&format!("{}[{}]", path, index), item_schema, element, errors);
                }
            }
        }
        (JsonSchema::Object { properties, required, .. }, Value::Object(map)) => {
            if let Some(required) = required {
                for name in required {
                    if !map.contains_key(name) {
                        errors.push(format!("missing required property '{}.{}'", path, name));
                    }
                }
            }
            if let Some(properties) = properties {
                for (name, property_schema) in properties {
                    if let Some(property) = map.get(name) {
                        check_value(
                            &format!("{}.{}", path, name),
                            property_schema,
                            property,
                            errors,
                        );
                    }
                }
            }
        }
        (expected, actual) => {
            errors.push(format!(
                "'{}' has wrong type: expected {}, got {}",
                path,
                expected.type_name(),
                json_type(actual)
            ));
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_schema() -> ToolSchema {
        ToolSchema::object()
            .with_properties(HashMap::from([
                ("text".to_string(), JsonSchema::string()),
                ("count".to_string(), JsonSchema::integer()),
            ]))
            .with_required(vec!["text".to_string()])
    }

    #[test]
    fn test_valid_input_passes() {
        assert!(validate_against(&echo_schema(), &json!({"text": "hi", "count": 2})).is_ok());
        assert!(validate_against(&echo_schema(), &json!({"text": "hi"})).is_ok());
    }

    #[test]
    fn test_missing_required_fails() {
        let errors = validate_against(&echo_schema(), &json!({"count": 2})).unwrap_err();
        assert!(errors[0].contains("'text'"));
    }

    #[test]
    fn test_type_mismatch_fails() {
        let errors = validate_against(&echo_schema(), &json!({"text": 42})).unwrap_err();
        assert!(errors[0].contains("expected string"));
    }

    #[test]
    fn test_non_object_input_fails() {
        assert!(validate_against(&echo_schema(), &json!("nope")).is_err());
    }

    #[test]
    fn test_enum_and_range_checks() {
        let schema = ToolSchema::object().with_properties(HashMap::from([
            (
                "level".to_string(),
                JsonSchema::string_enum(vec!["info".to_string(), "debug".to_string()]),
            ),
            (
                "ratio".to_string(),
                JsonSchema::Number {
                    description: None,
                    minimum: Some(0.0),
                    maximum: Some(1.0),
                },
            ),
        ]));

        assert!(validate_against(&schema, &json!({"level": "info", "ratio": 0.5})).is_ok());
        assert!(validate_against(&schema, &json!({"level": "trace"})).is_err());
        assert!(validate_against(&schema, &json!({"ratio": 1.5})).is_err());
    }

    #[test]
    fn test_nested_object_validation() {
        let schema = ToolSchema::object().with_properties(HashMap::from([(
            "user".to_string(),
            JsonSchema::Object {
                description: None,
                properties: Some(HashMap::from([("id".to_string(), JsonSchema::string())])),
                required: Some(vec!["id".to_string()]),
            },
        )]));

        assert!(validate_against(&schema, &json!({"user": {"id": "u1"}})).is_ok());
        let errors = validate_against(&schema, &json!({"user": {}})).unwrap_err();
        assert!(errors[0].contains("user.id"));
    }

    #[test]
    fn test_schema_serialization() {
        let json = serde_json::to_value(echo_schema()).unwrap();
        assert_eq!(json["type"], "object");
        assert_eq!(json["properties"]["text"]["type"], "string");
        assert_eq!(json["required"][0], "text");
    }
}
