//! Wire message shapes (§6): JSON/UTF-8 over the transport's two queues.

use flowcore_core::{ExecutionId, NodeId, TenantId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Published to the `execute-workflow` queue by the orchestrator; consumed
/// once per delivery by an engine instance (§4.7, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteWorkflow {
    pub execution_id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub workflow: WorkflowPayload,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub metadata: Value,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub user_id: Option<String>,
    pub correlation_id: String,
}

/// The workflow definition embedded in [`ExecuteWorkflow`] — a thin wire
/// shape, not `flowcore_workflow::WorkflowDefinition` itself, so the
/// transport crate has no compile-time dependency on the workflow crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowPayload {
    pub id: WorkflowId,
    pub nodes: Value,
    pub edges: Value,
}

/// Published to the `execute-node` queue by the dispatcher; consumed by a
/// Node Runner (§4.5, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteNode {
    pub execution_id: ExecutionId,
    pub node_id: NodeId,
    pub attempt: u32,
    pub node: NodePayload,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub metadata: Value,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePayload {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    pub data: Value,
}

/// The reply to one [`ExecuteNode`], delivered on the requester's
/// reply-to queue keyed by `correlation_id` (§4.4 request-reply).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteNodeReply {
    pub execution_id: ExecutionId,
    pub node_id: NodeId,
    pub attempt: u32,
    pub status: ReplyStatus,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyStatus {
    Completed,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_node_roundtrips_through_json() {
        let msg = ExecuteNode {
            execution_id: ExecutionId::v4(),
            node_id: NodeId::v4(),
            attempt: 0,
            node: NodePayload { id: NodeId::v4(), node_type: "http".into(), data: serde_json::json!({}) },
            input: serde_json::json!({"a": 1}),
            metadata: serde_json::json!({}),
            correlation_id: "corr-1".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ExecuteNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back.correlation_id, "corr-1");
        assert_eq!(back.attempt, 0);
    }
}
