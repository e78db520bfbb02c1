//! Error taxonomy for dispatch and task-manager operations.
//!
//! Expected failures are explicit sum types returned through `Result`; no
//! layer throws across a dispatch boundary for an expected condition.

use std::time::Duration;

use thiserror::Error;

use crate::envelope::{RpcError, codes};

/// Failures the Tool Registry & Dispatcher can report from `execute`.
///
/// Tool-internal business failures are *not* represented here: those come
/// back as a failed `ToolResult` so callers can tell "retry with different
/// arguments" apart from "abandon this call".
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    #[error("invalid params: field '{field}': {reason}")]
    InvalidParams { field: String, reason: String },
    #[error("tool execution timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

impl DispatchError {
    /// Map to the wire error object using the application-reserved band
    /// where one applies.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            DispatchError::ToolNotFound(_) => {
                RpcError::new(codes::TOOL_NOT_FOUND, self.to_string())
            }
            DispatchError::InvalidParams { .. } => {
                RpcError::new(codes::INVALID_PARAMS, self.to_string())
            }
            DispatchError::Timeout { .. } => RpcError::new(codes::TIMEOUT, self.to_string()),
        }
    }
}

/// Failures the Task Progress Manager reports synchronously.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("task not found: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_map_to_reserved_band() {
        let not_found = DispatchError::ToolNotFound("missing_tool".to_owned());
        assert_eq!(not_found.to_rpc_error().code, codes::TOOL_NOT_FOUND);

        let invalid = DispatchError::InvalidParams {
            field: "text".to_owned(),
            reason: "missing required field".to_owned(),
        };
        let rpc = invalid.to_rpc_error();
        assert_eq!(rpc.code, codes::INVALID_PARAMS);
        assert!(rpc.message.contains("text"));

        let timeout = DispatchError::Timeout {
            timeout: Duration::from_secs(30),
        };
        assert_eq!(timeout.to_rpc_error().code, codes::TIMEOUT);
    }
}
