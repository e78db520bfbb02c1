//! JSON-RPC 2.0 envelopes: requests, responses, and the error-code bands.
//!
//! A request without an `id` is a *notification*: it is processed for side
//! effects only and no response frame may ever be emitted for it. Responses
//! carry exactly one of `result` or `error`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Error codes, split into the standard JSON-RPC band and the
/// application-reserved band.
pub mod codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The envelope is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal server error.
    pub const INTERNAL_ERROR: i64 = -32603;

    // Application-reserved band.
    pub const TOOL_NOT_FOUND: i64 = -32000;
    pub const TOOL_EXECUTION_ERROR: i64 = -32001;
    pub const RESOURCE_NOT_FOUND: i64 = -32002;
    pub const UNAUTHORIZED: i64 = -32003;
    pub const RATE_LIMITED: i64 = -32004;
    pub const VALIDATION_ERROR: i64 = -32005;
    pub const TIMEOUT: i64 = -32006;
    pub const SERVICE_UNAVAILABLE: i64 = -32007;
}

/// An inbound request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    /// Absent id marks a notification — no response expected or sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(method: impl Into<String>, id: Value, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            id: Some(id),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            id: None,
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A protocol-level error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// An outbound response envelope: exactly one of `result` / `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    /// Echoes the request id, or null when the request was unparseable.
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::error(Value::Null, RpcError::new(codes::PARSE_ERROR, message))
    }

    pub fn invalid_request(id: Value, message: impl Into<String>) -> Self {
        Self::error(id, RpcError::new(codes::INVALID_REQUEST, message))
    }

    pub fn method_not_found(id: Value, method: &str) -> Self {
        Self::error(
            id,
            RpcError::new(
                codes::METHOD_NOT_FOUND,
                format!("method not found: {method}"),
            ),
        )
    }

    pub fn internal_error(id: Value, message: impl Into<String>) -> Self {
        Self::error(id, RpcError::new(codes::INTERNAL_ERROR, message))
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
