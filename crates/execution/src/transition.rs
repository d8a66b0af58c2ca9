//! State machine transition validation for execution and node statuses
//! (§4.6's two state diagrams, expressed as `matches!` predicates the way
//! the rest of this workspace validates transitions).

use crate::error::ExecutionError;
use crate::node_status::NodeStatus;
use crate::status::ExecutionStatus;

/// Returns `true` if the execution-level transition from `from` to `to` is
/// valid per §4.6's diagram.
#[must_use]
pub fn can_transition_execution(from: ExecutionStatus, to: ExecutionStatus) -> bool {
    matches!(
        (from, to),
        (ExecutionStatus::Pending, ExecutionStatus::Running)
            | (ExecutionStatus::Pending, ExecutionStatus::Failed) // plan-failed
            | (ExecutionStatus::Running, ExecutionStatus::Completed)
            | (ExecutionStatus::Running, ExecutionStatus::Failed)
            | (ExecutionStatus::Running, ExecutionStatus::Cancelled)
    )
}

/// Validate an execution-level transition, returning an error if invalid.
pub fn validate_execution_transition(
    from: ExecutionStatus,
    to: ExecutionStatus,
) -> Result<(), ExecutionError> {
    if can_transition_execution(from, to) {
        Ok(())
    } else {
        Err(ExecutionError::InvalidExecutionTransition { from, to })
    }
}

/// Returns `true` if the node-level transition from `from` to `to` is valid
/// per §4.6's per-`NodeExecution` diagram. Retry is `Running -> Ready`, not
/// a distinct state.
#[must_use]
pub fn can_transition_node(from: NodeStatus, to: NodeStatus) -> bool {
    matches!(
        (from, to),
        (NodeStatus::Pending, NodeStatus::Ready)
            | (NodeStatus::Pending, NodeStatus::Skipped)
            | (NodeStatus::Ready, NodeStatus::Running)
            | (NodeStatus::Ready, NodeStatus::Skipped)
            | (NodeStatus::Running, NodeStatus::Completed)
            | (NodeStatus::Running, NodeStatus::Failed)
            | (NodeStatus::Running, NodeStatus::Ready) // retry
            | (NodeStatus::Running, NodeStatus::Skipped) // cancellation race
    )
}

/// Validate a node-level transition, returning an error if invalid.
pub fn validate_node_transition(from: NodeStatus, to: NodeStatus) -> Result<(), ExecutionError> {
    if can_transition_node(from, to) {
        Ok(())
    } else {
        Err(ExecutionError::InvalidNodeTransition { from, to })
    }
}
