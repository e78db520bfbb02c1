//! Tool capability registry and dispatch.
//!
//! The registry is the single source of truth for invocable capabilities and
//! gives every tool a uniform contract: parameter coercion, schema
//! validation, a deadline derived from the tool's execution class, and
//! failure normalization. `execute` never propagates an unhandled fault to
//! its caller — a tool panic becomes a failed [`ToolResult`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gantry_protocol::{
    DispatchError, ExecutionMode, PropertyType, ToolDefinition, ToolResult,
};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

pub mod builtin;

/// String-keyed arguments passed to a tool invocation.
pub type ToolParams = Map<String, Value>;

/// A named, schema-described unit of invocable functionality.
///
/// Concrete tools are supplied by higher-level domains; the registry treats
/// them as opaque beyond this surface. Any serialization a specific tool
/// needs internally is that tool's own responsibility.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn execute(&self, params: ToolParams) -> ToolResult;
}

/// Effective deadlines per execution class.
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    pub fast: Duration,
    pub compute: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            fast: Duration::from_secs(30),
            compute: Duration::from_secs(20 * 60),
        }
    }
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    definition: ToolDefinition,
}

/// Catalog of registered capabilities.
///
/// The definition table is read far more often than written (writes happen
/// at startup registration), so reads take a short `RwLock` guard and no
/// lock is ever held across an await point. Concurrent `execute` calls are
/// fully independent.
pub struct ToolRegistry {
    tools: RwLock<IndexMap<String, RegisteredTool>>,
    timeouts: TimeoutPolicy,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(TimeoutPolicy::default())
    }
}

impl ToolRegistry {
    pub fn new(timeouts: TimeoutPolicy) -> Self {
        Self {
            tools: RwLock::new(IndexMap::new()),
            timeouts,
        }
    }

    /// Registry preloaded with the builtin demo tools.
    pub fn with_builtin_tools() -> Self {
        let registry = Self::default();
        registry.register(Arc::new(builtin::EchoTool));
        registry.register(Arc::new(builtin::DelayTool));
        registry
    }

    /// Register a tool. Idempotent: re-registering a name overwrites the
    /// previous definition and logs a warning; registration never fails.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let definition = tool.definition();
        let name = definition.name.clone();
        let mut tools = self.tools.write();
        if tools.contains_key(&name) {
            warn!(tool = %name, "re-registering tool, previous definition overwritten");
        }
        tools.insert(name.clone(), RegisteredTool { tool, definition });
        debug!(tool = %name, "tool registered");
    }

    /// Remove a tool. Returns true when a definition was actually removed.
    pub fn unregister(&self, name: &str) -> bool {
        // shift_remove keeps registration order stable for the survivors.
        let removed = self.tools.write().shift_remove(name).is_some();
        if removed {
            debug!(tool = %name, "tool unregistered");
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Definitions grouped by category (categories in first-registration
    /// order), then by registration order within each category.
    /// Deterministic given no concurrent mutation.
    pub fn list(&self) -> Vec<ToolDefinition> {
        let tools = self.tools.read();
        let mut categories: Vec<&str> = Vec::new();
        for entry in tools.values() {
            if !categories.contains(&entry.definition.category.as_str()) {
                categories.push(&entry.definition.category);
            }
        }

        let mut out = Vec::with_capacity(tools.len());
        for category in categories {
            for entry in tools.values() {
                if entry.definition.category == category {
                    out.push(entry.definition.clone());
                }
            }
        }
        out
    }

    /// Execute a named tool under its effective deadline.
    ///
    /// Business failures come back as `Ok` with a failed [`ToolResult`];
    /// the `Err` branch is reserved for dispatch-level failures (unknown
    /// tool, schema violation, deadline expiry). On expiry the underlying
    /// operation is abandoned, not interrupted — its disposition is
    /// unresolved and tools needing stronger guarantees must cooperate
    /// with cancellation themselves.
    #[instrument(skip(self, params), fields(tool = %name))]
    pub async fn execute(
        &self,
        name: &str,
        mut params: ToolParams,
    ) -> Result<ToolResult, DispatchError> {
        let (tool, definition) = {
            let tools = self.tools.read();
            let Some(entry) = tools.get(name) else {
                return Err(DispatchError::ToolNotFound(name.to_owned()));
            };
            (entry.tool.clone(), entry.definition.clone())
        };

        coerce_params(&definition, &mut params);
        validate_params(&definition, &params)?;

        let timeout = definition.timeout_override.unwrap_or(match definition.execution_mode {
            ExecutionMode::Fast => self.timeouts.fast,
            ExecutionMode::Compute => self.timeouts.compute,
        });

        // Run the tool on its own task so a panic is isolated here instead
        // of unwinding into the dispatcher.
        let handle = tokio::spawn(async move { tool.execute(params).await });

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => {
                debug!(success = result.success, "tool execution finished");
                Ok(result)
            }
            Ok(Err(join_error)) => {
                warn!(error = %join_error, "tool execution fault");
                Ok(ToolResult::failure(format!(
                    "tool '{name}' execution fault: {join_error}"
                )))
            }
            Err(_) => {
                // Dropping the JoinHandle detaches the task: the work is
                // abandoned, not killed.
                warn!(?timeout, "tool execution timed out");
                Err(DispatchError::Timeout { timeout })
            }
        }
    }
}

/// Best-effort coercion of string-encoded primitives toward the declared
/// schema type. A value that fails to convert is left untouched and will be
/// surfaced by validation instead.
fn coerce_params(definition: &ToolDefinition, params: &mut ToolParams) {
    for (field, schema) in &definition.input_schema.properties {
        let Some(value) = params.get(field) else {
            continue;
        };
        let Some(text) = value.as_str() else {
            continue;
        };
        let coerced = match schema.prop_type {
            PropertyType::Integer => text.parse::<i64>().ok().map(Value::from),
            PropertyType::Number => text.parse::<f64>().ok().map(Value::from),
            PropertyType::Boolean => text.parse::<bool>().ok().map(Value::from),
            _ => None,
        };
        if let Some(coerced) = coerced {
            params.insert(field.clone(), coerced);
        }
    }
}

/// Schema validation: every required field present, every present field
/// matching its declared type. The first violation short-circuits with the
/// offending field named.
fn validate_params(
    definition: &ToolDefinition,
    params: &ToolParams,
) -> Result<(), DispatchError> {
    let schema = &definition.input_schema;

    for field in &schema.required {
        if !params.contains_key(field) {
            return Err(DispatchError::InvalidParams {
                field: field.clone(),
                reason: "missing required field".to_owned(),
            });
        }
    }

    for (field, property) in &schema.properties {
        let Some(value) = params.get(field) else {
            continue;
        };
        if !property.prop_type.matches(value) {
            return Err(DispatchError::InvalidParams {
                field: field.clone(),
                reason: format!("expected {}", property.prop_type),
            });
        }
    }

    Ok(())
}
