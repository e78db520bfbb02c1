//! # gantry-protocol — Canonical Gantry Protocol
//!
//! This crate defines the shared types every Gantry crate depends on: the
//! JSON-RPC envelope, tool and task data models, and the dispatch error
//! taxonomy.
//!
//! It is intentionally dependency-light (no runtime deps like tokio or axum)
//! so it can be used as a pure contract crate.
//!
//! ## Module Overview
//!
//! - [`ids`] — Typed ID wrappers (TaskId)
//! - [`envelope`] — JSON-RPC 2.0 request/response envelopes + error codes
//! - [`tool`] — ToolDefinition, InputSchema, ExecutionMode, ToolResult
//! - [`task`] — TaskProgress, TaskStatus, TaskUpdate
//! - [`error`] — DispatchError, TaskError

pub mod envelope;
pub mod error;
pub mod ids;
pub mod task;
pub mod tool;

// Re-export the most commonly used types at the crate root.
pub use envelope::{JSONRPC_VERSION, Request, Response, RpcError, codes};
pub use error::{DispatchError, TaskError};
pub use ids::TaskId;
pub use task::{TaskProgress, TaskStatus, TaskUpdate};
pub use tool::{
    ExecutionMode, InputSchema, PropertySchema, PropertyType, ToolDefinition, ToolResult,
};
