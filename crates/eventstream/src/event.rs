//! Progress events (§4.8).

use flowcore_core::{ExecutionId, NodeId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProgressEvent {
    ExecutionStarted {
        execution_id: ExecutionId,
    },
    NodeStarted {
        execution_id: ExecutionId,
        node_id: NodeId,
    },
    /// Carries a content hash of the node's output rather than the output
    /// itself — subscribers resync the actual value via `getStatus` (§4.8).
    NodeCompleted {
        execution_id: ExecutionId,
        node_id: NodeId,
        output_hash: String,
    },
    NodeFailed {
        execution_id: ExecutionId,
        node_id: NodeId,
        error_kind: String,
    },
    NodeSkipped {
        execution_id: ExecutionId,
        node_id: NodeId,
    },
    ExecutionCompleted {
        execution_id: ExecutionId,
        status: String,
    },
    /// Published by the orchestrator's `cancel` (§4.7); engines observe the
    /// actual intent via the state store's `cancel_requested` flag, not this
    /// event — it exists purely for subscriber visibility.
    CancellationRequested {
        execution_id: ExecutionId,
    },
}

impl ProgressEvent {
    #[must_use]
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            Self::ExecutionStarted { execution_id }
            | Self::NodeStarted { execution_id, .. }
            | Self::NodeCompleted { execution_id, .. }
            | Self::NodeFailed { execution_id, .. }
            | Self::NodeSkipped { execution_id, .. }
            | Self::ExecutionCompleted { execution_id, .. }
            | Self::CancellationRequested { execution_id } => *execution_id,
        }
    }
}

/// A stable content fingerprint of a node's output, used instead of
/// shipping the full value over the best-effort progress stream.
#[must_use]
pub fn output_hash(output: &serde_json::Value) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    output.to_string().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
