//! Builtin demo tools, handy for smoke tests and exercising timeout policy.

use std::time::Duration;

use async_trait::async_trait;
use gantry_protocol::{
    ExecutionMode, InputSchema, PropertySchema, PropertyType, ToolDefinition, ToolResult,
};
use serde_json::{Value, json};

use crate::{Tool, ToolParams};

/// Echoes its `text` argument back.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("echo", "Echo back the provided text")
            .category("demo")
            .schema(
                InputSchema::new().required_property(
                    "text",
                    PropertySchema::new(PropertyType::String)
                        .with_description("Text to echo back"),
                ),
            )
    }

    async fn execute(&self, params: ToolParams) -> ToolResult {
        match params.get("text") {
            Some(Value::String(text)) => ToolResult::ok(json!({ "text": text })),
            _ => ToolResult::failure("missing required: text"),
        }
    }
}

/// Sleeps for `duration_ms` then reports how long it slept. Classified as
/// compute so it exercises the long-deadline path.
pub struct DelayTool;

#[async_trait]
impl Tool for DelayTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("delay", "Sleep for a number of milliseconds")
            .category("demo")
            .execution_mode(ExecutionMode::Compute)
            .schema(
                InputSchema::new().required_property(
                    "duration_ms",
                    PropertySchema::new(PropertyType::Integer)
                        .with_description("How long to sleep, in milliseconds"),
                ),
            )
    }

    async fn execute(&self, params: ToolParams) -> ToolResult {
        let Some(duration_ms) = params.get("duration_ms").and_then(Value::as_u64) else {
            return ToolResult::failure("duration_ms must be a non-negative integer");
        };
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        ToolResult::ok(json!({ "slept_ms": duration_ms }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolRegistry;
    use serde_json::Map;

    fn params(value: Value) -> ToolParams {
        value.as_object().cloned().unwrap_or_else(Map::new)
    }

    #[tokio::test]
    async fn echo_returns_its_text() {
        let registry = ToolRegistry::with_builtin_tools();
        let result = registry
            .execute("echo", params(json!({ "text": "hi" })))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.data.unwrap()["text"], "hi");
    }

    #[tokio::test]
    async fn echo_without_text_is_invalid_params() {
        let registry = ToolRegistry::with_builtin_tools();
        let err = registry.execute("echo", ToolParams::new()).await.unwrap_err();
        assert!(err.to_string().contains("text"));
    }

    #[tokio::test]
    async fn delay_sleeps_and_reports() {
        let registry = ToolRegistry::with_builtin_tools();
        let result = registry
            .execute("delay", params(json!({ "duration_ms": 5 })))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap()["slept_ms"], 5);
    }

    #[tokio::test]
    async fn delay_accepts_string_encoded_integers() {
        let registry = ToolRegistry::with_builtin_tools();
        let result = registry
            .execute("delay", params(json!({ "duration_ms": "5" })))
            .await
            .unwrap();
        assert!(result.success);
    }
}
