//! Protocol request routing: inbound envelopes in, outbound envelopes out.
//!
//! The dispatcher is stateless per call — it holds only `Arc` references to
//! the tool registry and catalogs. Every fault in the routing chain is
//! converted into a well-formed error envelope; `handle` returns `None`
//! exactly when the request was a notification.

use std::sync::Arc;

use gantry_protocol::{
    JSONRPC_VERSION, Request, Response, RpcError, ToolResult, codes,
};
use gantry_tools::{ToolParams, ToolRegistry};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

pub mod catalog;

pub use catalog::{PromptCatalog, PromptEntry, PromptMessage, ResourceCatalog, ResourceEntry};

/// Version negotiated during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Routes protocol envelopes to the registry and catalogs.
#[derive(Clone)]
pub struct ProtocolDispatcher {
    registry: Arc<ToolRegistry>,
    resources: Arc<ResourceCatalog>,
    prompts: Arc<PromptCatalog>,
    server_name: String,
}

impl ProtocolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            resources: Arc::new(ResourceCatalog::default()),
            prompts: Arc::new(PromptCatalog::default()),
            server_name: "gantry".to_owned(),
        }
    }

    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        self.registry.clone()
    }

    pub fn resources(&self) -> Arc<ResourceCatalog> {
        self.resources.clone()
    }

    pub fn prompts(&self) -> Arc<PromptCatalog> {
        self.prompts.clone()
    }

    /// Handle one raw envelope value. Returns `None` for notifications.
    ///
    /// A value that does not deserialize into a request envelope yields an
    /// invalid-request response echoing whatever `id` could be salvaged.
    pub async fn handle_value(&self, raw: Value) -> Option<Response> {
        let salvaged_id = raw.get("id").cloned().unwrap_or(Value::Null);
        let request: Request = match serde_json::from_value(raw) {
            Ok(request) => request,
            Err(error) => {
                debug!(%error, "malformed request envelope");
                return Some(Response::invalid_request(
                    salvaged_id,
                    format!("malformed request envelope: {error}"),
                ));
            }
        };
        if request.jsonrpc != JSONRPC_VERSION {
            // Notification shapes stay silent even when rejected.
            if request.is_notification() {
                debug!(version = %request.jsonrpc, "notification with unsupported protocol version dropped");
                return None;
            }
            return Some(Response::invalid_request(
                salvaged_id,
                format!("unsupported protocol version: {}", request.jsonrpc),
            ));
        }
        self.handle(request).await
    }

    /// Handle a parsed request. Returns `None` for notifications — they are
    /// processed for side effects only and never produce a response frame.
    #[instrument(skip(self, request), fields(method = %request.method))]
    pub async fn handle(&self, request: Request) -> Option<Response> {
        let id = request.id.clone().unwrap_or(Value::Null);
        let is_notification = request.is_notification();

        let outcome = self.route(&request).await;

        if is_notification {
            if let Err(error) = outcome {
                debug!(code = error.code, message = %error.message, "notification failed, no response emitted");
            }
            return None;
        }

        Some(match outcome {
            Ok(result) => Response::success(id, result),
            Err(error) => {
                warn!(method = %request.method, code = error.code, message = %error.message, "request failed");
                Response::error(id, error)
            }
        })
    }

    /// Process an array of envelopes independently, preserving array order
    /// for the non-notification responses. An empty batch is itself an
    /// invalid request.
    pub async fn handle_batch(&self, batch: Vec<Value>) -> Vec<Response> {
        if batch.is_empty() {
            return vec![Response::invalid_request(Value::Null, "empty batch")];
        }
        let mut responses = Vec::with_capacity(batch.len());
        for member in batch {
            if let Some(response) = self.handle_value(member).await {
                responses.push(response);
            }
        }
        responses
    }

    /// Transport convenience: one line of text in, at most one line out.
    /// Used by the stdio transport; `None` means no frame is due (pure
    /// notification traffic).
    pub async fn handle_text(&self, line: &str) -> Option<String> {
        let raw: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(error) => {
                return Some(encode(&Response::parse_error(format!(
                    "invalid json: {error}"
                ))));
            }
        };

        match raw {
            Value::Array(batch) => {
                let responses = self.handle_batch(batch).await;
                if responses.is_empty() {
                    None
                } else {
                    Some(encode(&responses))
                }
            }
            single => self.handle_value(single).await.map(|r| encode(&r)),
        }
    }

    /// Fixed method table. Unknown methods become a method-not-found error
    /// envelope, never a fault thrown at the transport.
    async fn route(&self, request: &Request) -> Result<Value, RpcError> {
        match request.method.as_str() {
            "initialize" => Ok(self.initialize_result()),
            "notifications/initialized" => Ok(json!({})),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.registry.list() })),
            "tools/call" => self.call_tool(request.params.as_ref()).await,
            "resources/list" => Ok(json!({ "resources": self.resources.list() })),
            "resources/read" => self.read_resource(request.params.as_ref()),
            "prompts/list" => Ok(json!({ "prompts": self.prompts.list() })),
            "prompts/get" => self.get_prompt(request.params.as_ref()),
            other => Err(RpcError::new(
                codes::METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            )),
        }
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "resources": {},
                "prompts": {},
            },
            "serverInfo": {
                "name": self.server_name,
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    async fn call_tool(&self, params: Option<&Value>) -> Result<Value, RpcError> {
        let params = params.unwrap_or(&Value::Null);
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RpcError::new(codes::INVALID_PARAMS, "tools/call requires params.name")
            })?;
        let arguments: ToolParams = match params.get("arguments") {
            None | Some(Value::Null) => ToolParams::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(RpcError::new(
                    codes::INVALID_PARAMS,
                    "params.arguments must be an object",
                ));
            }
        };

        // A tool-reported business failure stays a *successful* envelope
        // with the payload flagged as an error state, so a calling agent
        // can retry with different arguments instead of abandoning the
        // call. Dispatch-level failures use the top-level error object.
        match self.registry.execute(name, arguments).await {
            Ok(result) => Ok(tool_result_payload(result)),
            Err(dispatch_error) => Err(dispatch_error.to_rpc_error()),
        }
    }

    fn read_resource(&self, params: Option<&Value>) -> Result<Value, RpcError> {
        let uri = params
            .and_then(|p| p.get("uri"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RpcError::new(codes::INVALID_PARAMS, "resources/read requires params.uri")
            })?;
        let entry = self.resources.read(uri).ok_or_else(|| {
            RpcError::new(
                codes::RESOURCE_NOT_FOUND,
                format!("resource not found: {uri}"),
            )
        })?;
        Ok(json!({
            "contents": [{
                "uri": entry.uri,
                "mimeType": entry.mime_type,
                "text": entry.text,
            }],
        }))
    }

    fn get_prompt(&self, params: Option<&Value>) -> Result<Value, RpcError> {
        let name = params
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RpcError::new(codes::INVALID_PARAMS, "prompts/get requires params.name")
            })?;
        let entry = self.prompts.get(name).ok_or_else(|| {
            RpcError::new(
                codes::RESOURCE_NOT_FOUND,
                format!("prompt not found: {name}"),
            )
        })?;
        Ok(json!({
            "description": entry.description,
            "messages": entry.messages,
        }))
    }
}

/// Wrap a tool outcome into the method-level payload. Business failures are
/// payload-level (`isError: true`), never a protocol error.
fn tool_result_payload(result: ToolResult) -> Value {
    if result.success {
        let data = result.data.unwrap_or(Value::Null);
        let text = serde_json::to_string(&data).unwrap_or_else(|_| data.to_string());
        json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": data,
            "isError": false,
        })
    } else {
        let message = result.error.unwrap_or_else(|| "tool failed".to_owned());
        json!({
            "content": [{ "type": "text", "text": message }],
            "isError": true,
        })
    }
}

fn encode<T: serde::Serialize>(frame: &T) -> String {
    serde_json::to_string(frame).unwrap_or_else(|error| {
        warn!(%error, "response serialization failed");
        format!(
            r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{},"message":"response serialization failed"}}}}"#,
            codes::INTERNAL_ERROR
        )
    })
}
