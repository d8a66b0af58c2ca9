//! The `Execution` and `NodeExecution` durable records (§3, §6).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use flowcore_core::{ExecutionId, NodeId, TenantId, WorkflowId};
use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;
use crate::node_status::NodeStatus;
use crate::status::ExecutionStatus;
use crate::transition::{validate_execution_transition, validate_node_transition};

/// Live counters tracked on the `Execution` record (§3, invariant 3:
/// monotonic, `completed + failed + skipped <= total`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub running: u32,
}

/// One run of a workflow on a specific input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub tenant_id: TenantId,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub input: serde_json::Value,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub progress: Progress,
    pub correlation_id: String,
    #[serde(default)]
    pub cancel_requested: bool,
}

impl Execution {
    #[must_use]
    pub fn new(
        id: ExecutionId,
        workflow_id: WorkflowId,
        tenant_id: TenantId,
        input: serde_json::Value,
        correlation_id: String,
    ) -> Self {
        Self {
            id,
            workflow_id,
            tenant_id,
            status: ExecutionStatus::Pending,
            started_at: None,
            finished_at: None,
            input,
            result: None,
            error: None,
            progress: Progress::default(),
            correlation_id,
            cancel_requested: false,
        }
    }

    /// Apply a validated status transition plus the housekeeping the
    /// teacher associates with entering `Running`/a terminal state.
    pub fn transition(&mut self, to: ExecutionStatus) -> Result<(), ExecutionError> {
        validate_execution_transition(self.status, to)?;
        self.status = to;
        if to == ExecutionStatus::Running && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if to.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }
}

/// One attempt (or set of attempts) of a node within one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    pub execution_id: ExecutionId,
    pub node_id: NodeId,
    pub status: NodeStatus,
    pub attempt: u32,
    #[serde(default)]
    pub input: serde_json::Value,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dependencies: Vec<NodeId>,
    pub dependents: Vec<NodeId>,
}

impl NodeExecution {
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        node_id: NodeId,
        dependencies: Vec<NodeId>,
        dependents: Vec<NodeId>,
    ) -> Self {
        Self {
            execution_id,
            node_id,
            status: NodeStatus::Pending,
            attempt: 0,
            input: serde_json::Value::Null,
            output: None,
            error: None,
            started_at: None,
            finished_at: None,
            dependencies,
            dependents,
        }
    }

    /// Apply a validated status transition. `Running -> Ready` (retry) bumps
    /// `attempt`; invariant: `attempt` is non-decreasing (§3).
    pub fn transition(&mut self, to: NodeStatus) -> Result<(), ExecutionError> {
        validate_node_transition(self.status, to)?;
        if self.status == NodeStatus::Running && to == NodeStatus::Ready {
            self.attempt += 1;
        }
        self.status = to;
        if to == NodeStatus::Running && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if to.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Mark the node `Completed`; requires `output` set and `error` unset
    /// (§3 invariant).
    pub fn complete(&mut self, output: serde_json::Value) -> Result<(), ExecutionError> {
        self.transition(NodeStatus::Completed)?;
        self.output = Some(output);
        self.error = None;
        Ok(())
    }

    /// Mark the node `Failed`; requires `error` set.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), ExecutionError> {
        self.transition(NodeStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }
}

/// In-memory result fingerprint: each node's latest output, keyed by node
/// id, used to assemble downstream input. Reconstructable from
/// `NodeExecution` records after a crash — this type itself is never
/// persisted directly.
#[derive(Debug, Clone, Default)]
pub struct ResultFingerprint {
    outputs: HashMap<NodeId, serde_json::Value>,
}

impl ResultFingerprint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, node_id: NodeId, output: serde_json::Value) {
        self.outputs.insert(node_id, output);
    }

    #[must_use]
    pub fn get(&self, node_id: NodeId) -> Option<&serde_json::Value> {
        self.outputs.get(&node_id)
    }

    /// Rebuild a fingerprint from persisted `NodeExecution` records —
    /// the crash-recovery path (§4.6.4).
    #[must_use]
    pub fn from_node_executions<'a>(records: impl IntoIterator<Item = &'a NodeExecution>) -> Self {
        let mut fp = Self::new();
        for record in records {
            if record.status == NodeStatus::Completed {
                if let Some(output) = &record.output {
                    fp.record(record.node_id, output.clone());
                }
            }
        }
        fp
    }
}
