//! Execution error types (§7: error taxonomy for C2-owned failures).

use flowcore_core::{ExecutionId, NodeId};
use thiserror::Error;

use crate::node_status::NodeStatus;
use crate::status::ExecutionStatus;

/// Errors raised by the execution state store and its record types.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutionError {
    /// `create` was called with an id that already exists.
    #[error("execution already exists: {0}")]
    AlreadyExists(ExecutionId),

    /// A compare-and-set transition's current status was not in the
    /// expected `from` set.
    #[error("invalid transition from {from} to {to}")]
    InvalidExecutionTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    /// A node-level compare-and-set transition was invalid.
    #[error("invalid node transition from {from} to {to}")]
    InvalidNodeTransition { from: NodeStatus, to: NodeStatus },

    /// A referenced node does not exist in the execution state.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// A referenced execution does not exist in the state store.
    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    /// The execution plan failed validation.
    #[error("plan validation: {0}")]
    PlanValidation(#[from] flowcore_workflow::WorkflowError),

    /// Two edges wrote to the same `(dependent, target-input-slot)`.
    #[error("duplicate input binding on slot `{slot}` for node {node}")]
    DuplicateInputBinding { node: NodeId, slot: String },

    /// An idempotency key has already been used for a different result.
    #[error("duplicate idempotency key: {0}")]
    DuplicateIdempotencyKey(String),

    /// A serialization or deserialization error.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The execution was cancelled.
    #[error("execution cancelled")]
    Cancelled,
}
