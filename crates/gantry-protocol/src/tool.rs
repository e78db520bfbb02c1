//! Tool types: definitions, input schemas, execution classes, and results.

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse latency/resource classification used to select timeout policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Interactive tools — seconds-order deadline.
    #[default]
    Fast,
    /// Heavy tools (indexing, model calls, long scans) — minutes-order deadline.
    Compute,
}

/// Primitive types accepted in a tool input schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl PropertyType {
    /// Whether `value` matches this declared type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            PropertyType::String => value.is_string(),
            PropertyType::Integer => value.is_i64() || value.is_u64(),
            PropertyType::Number => value.is_number(),
            PropertyType::Boolean => value.is_boolean(),
            PropertyType::Array => value.is_array(),
            PropertyType::Object => value.is_object(),
        }
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PropertyType::String => "string",
            PropertyType::Integer => "integer",
            PropertyType::Number => "number",
            PropertyType::Boolean => "boolean",
            PropertyType::Array => "array",
            PropertyType::Object => "object",
        };
        write!(f, "{name}")
    }
}

/// Schema for one named tool parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub prop_type: PropertyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PropertySchema {
    pub fn new(prop_type: PropertyType) -> Self {
        Self {
            prop_type,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// JSON-Schema-like description of a tool's parameters.
///
/// Property order is preserved so listings are stable across calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: IndexMap<String, PropertySchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self {
            schema_type: "object".to_owned(),
            properties: IndexMap::new(),
            required: Vec::new(),
        }
    }
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    pub fn required_property(
        mut self,
        name: impl Into<String>,
        schema: PropertySchema,
    ) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), schema);
        self.required.push(name);
        self
    }
}

/// A registered tool's immutable description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: InputSchema,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Overrides the execution-mode default deadline when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_override: Option<Duration>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: InputSchema::default(),
            category: "general".to_owned(),
            execution_mode: ExecutionMode::Fast,
            timeout_override: None,
        }
    }

    pub fn schema(mut self, input_schema: InputSchema) -> Self {
        self.input_schema = input_schema;
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn timeout_override(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }
}

/// Outcome of one tool execution. `data` and `error` are never both set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn property_type_matches_values() {
        assert!(PropertyType::String.matches(&json!("hi")));
        assert!(PropertyType::Integer.matches(&json!(3)));
        assert!(!PropertyType::Integer.matches(&json!(3.5)));
        assert!(PropertyType::Number.matches(&json!(3.5)));
        assert!(PropertyType::Number.matches(&json!(3)));
        assert!(PropertyType::Boolean.matches(&json!(true)));
        assert!(PropertyType::Array.matches(&json!([1, 2])));
        assert!(PropertyType::Object.matches(&json!({"a": 1})));
        assert!(!PropertyType::Object.matches(&json!([])));
    }

    #[test]
    fn definition_serializes_mcp_field_names() {
        let def = ToolDefinition::new("echo", "Echo back the input").schema(
            InputSchema::new()
                .required_property("text", PropertySchema::new(PropertyType::String)),
        );
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["inputSchema"]["type"], "object");
        assert_eq!(json["inputSchema"]["properties"]["text"]["type"], "string");
        assert_eq!(json["inputSchema"]["required"][0], "text");
    }

    #[test]
    fn schema_preserves_property_order() {
        let schema = InputSchema::new()
            .property("zulu", PropertySchema::new(PropertyType::String))
            .property("alpha", PropertySchema::new(PropertyType::Integer));
        let keys: Vec<_> = schema.properties.keys().cloned().collect();
        assert_eq!(keys, vec!["zulu", "alpha"]);
    }

    #[test]
    fn tool_result_never_sets_both_payloads() {
        let ok = ToolResult::ok(json!({"n": 1}));
        assert!(ok.success && ok.error.is_none());

        let failed = ToolResult::failure("boom");
        assert!(!failed.success && failed.data.is_none());
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }

    #[test]
    fn execution_mode_serde() {
        assert_eq!(
            serde_json::to_string(&ExecutionMode::Compute).unwrap(),
            "\"compute\""
        );
        let back: ExecutionMode = serde_json::from_str("\"fast\"").unwrap();
        assert_eq!(back, ExecutionMode::Fast);
    }
}
