//! The orchestrator core (§4.7): `submit`/`getStatus`/`cancel`. Owns the
//! authoritative `Execution` record and the handoff onto the
//! `execute-workflow` queue; never touches node-level scheduling (that's
//! `flowcore-engine`).

use std::sync::Arc;

use flowcore_core::{ExecutionId, TenantId};
use flowcore_eventstream::{EventStream, ProgressEvent};
use flowcore_execution::{Execution, ExecutionStatus, NodeExecution, StateStore};
use flowcore_transport::queue::Queue;
use flowcore_transport::messages::{ExecuteWorkflow, WorkflowPayload};
use flowcore_workflow::{plan, WorkflowDefinition};
use serde_json::Value;
use tracing::{info, instrument};

use crate::error::OrchestratorError;

/// A consistent read of one execution and its node history, returned by
/// [`Orchestrator::get_status`].
#[derive(Debug, Clone)]
pub struct ExecutionView {
    pub execution: Execution,
    pub nodes: Vec<NodeExecution>,
}

pub struct Orchestrator<S: StateStore, Q: Queue> {
    state_store: Arc<S>,
    workflow_queue: Arc<Q>,
    events: Arc<EventStream>,
}

impl<S: StateStore, Q: Queue> Orchestrator<S, Q> {
    #[must_use]
    pub fn new(state_store: Arc<S>, workflow_queue: Arc<Q>, events: Arc<EventStream>) -> Self {
        Self { state_store, workflow_queue, events }
    }

    /// Validate `workflow` via the DAG Analyzer, create the `Execution` in
    /// `Pending`, and publish `ExecuteWorkflow`. Validation failures are
    /// returned synchronously and no `Execution` record is created (§8
    /// scenario 5).
    #[instrument(skip(self, workflow, input, metadata))]
    pub async fn submit(
        &self,
        workflow: &WorkflowDefinition,
        input: Value,
        tenant_id: TenantId,
        metadata: Value,
        correlation_id: String,
    ) -> Result<ExecutionId, OrchestratorError> {
        plan(workflow)?;

        let execution_id = ExecutionId::v4();
        let execution = Execution::new(execution_id, workflow.id, tenant_id, input.clone(), correlation_id.clone());
        self.state_store.create(execution)?;

        let message = ExecuteWorkflow {
            execution_id,
            workflow_id: workflow.id,
            workflow: WorkflowPayload {
                id: workflow.id,
                nodes: serde_json::to_value(&workflow.nodes).unwrap_or(Value::Null),
                edges: serde_json::to_value(&workflow.edges).unwrap_or(Value::Null),
            },
            input,
            metadata,
            tenant_id,
            user_id: None,
            correlation_id,
        };
        let payload = serde_json::to_value(&message).map_err(flowcore_execution::ExecutionError::from)?;
        self.workflow_queue.publish(payload).await?;

        info!(%execution_id, "workflow submitted");
        Ok(execution_id)
    }

    /// A consistent snapshot of the execution and all its node records.
    pub fn get_status(&self, execution_id: ExecutionId) -> Result<ExecutionView, OrchestratorError> {
        let snapshot = self.state_store.snapshot(execution_id)?;
        Ok(ExecutionView { execution: snapshot.execution, nodes: snapshot.nodes })
    }

    /// Write the cancellation intent and publish a best-effort progress
    /// event; the owning engine observes `cancel_requested` at the top of
    /// its drain loop (§4.6.3, §4.7). Idempotent — cancelling an
    /// already-terminal or already-cancelling execution is a no-op.
    pub fn cancel(&self, execution_id: ExecutionId) -> Result<(), OrchestratorError> {
        self.state_store.patch_execution(execution_id, |execution| {
            execution.cancel_requested = true;
        })?;
        self.events.publish(ProgressEvent::CancellationRequested { execution_id });
        Ok(())
    }
}

/// Returns `true` if `status` is a state from which `cancel` can still have
/// an effect — exposed for callers deciding whether to bother calling it.
#[must_use]
pub fn is_cancellable(status: ExecutionStatus) -> bool {
    !status.is_terminal()
}
