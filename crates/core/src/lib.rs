//! Core identifiers and error building blocks for the workflow execution
//! core, shared by the workflow, execution, sandbox, transport, dispatcher,
//! engine, and orchestrator crates.
//!
//! ## Key components
//!
//! - **Identifiers**: `ExecutionId`, `WorkflowId`, `NodeId`, `TenantId`
//! - **`CoreError`**: the small set of failures that belong to no single
//!   component
//!
//! ```rust
//! use flowcore_core::{ExecutionId, WorkflowId, NodeId};
//!
//! let execution_id = ExecutionId::v4();
//! let workflow_id = WorkflowId::v4();
//! let node_id = NodeId::v4();
//! ```

pub mod error;
pub mod id;

pub use error::CoreError;
pub use id::*;

/// Result type used throughout the core crates that don't define their own.
pub type Result<T> = std::result::Result<T, CoreError>;
