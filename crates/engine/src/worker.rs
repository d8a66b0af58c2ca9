//! The engine-instance side of the `execute-workflow` queue (§4.6 step 1,
//! §6): consume one `ExecuteWorkflow` job, claim it with the `Pending ->
//! Running` CAS, reconstruct the workflow definition from the wire
//! payload, and hand it to [`Scheduler::run`]. Acks on any outcome that
//! reached a terminal execution status (including `Scheduler::run`
//! returning an error after writing `Failed`) and nacks only when the
//! claim itself could not be established, so a message that names an
//! execution this instance lost the race for gets redelivered to whoever
//! did win it.

use std::sync::Arc;
use std::time::Duration;

use flowcore_core::ExecutionId;
use flowcore_dispatcher::NodeTransport;
use flowcore_execution::{ExecutionError, ExecutionStatus, StateStore};
use flowcore_transport::{ExecuteWorkflow, Queue};
use flowcore_workflow::{Edge, NodeDefinition, WorkflowDefinition};
use tracing::{error, info, warn};

use crate::recovery::InMemoryWorkflowCache;
use crate::scheduler::Scheduler;

/// Drives the `execute-workflow` queue for one engine instance.
pub struct Worker<S: StateStore, T: NodeTransport, Q: Queue> {
    scheduler: Arc<Scheduler<S, T>>,
    state_store: Arc<S>,
    workflow_queue: Arc<Q>,
    workflow_cache: Option<Arc<InMemoryWorkflowCache>>,
}

impl<S: StateStore + 'static, T: NodeTransport + 'static, Q: Queue> Worker<S, T, Q> {
    #[must_use]
    pub fn new(scheduler: Arc<Scheduler<S, T>>, state_store: Arc<S>, workflow_queue: Arc<Q>) -> Self {
        Self { scheduler, state_store, workflow_queue, workflow_cache: None }
    }

    /// Remember every job's workflow definition in `cache` as it's consumed,
    /// so [`crate::recovery::recover_running`] can resolve it again on
    /// restart. Without this, recovery has no source for the workflow
    /// definitions of executions this instance left `Running`.
    #[must_use]
    pub fn with_workflow_cache(mut self, cache: Arc<InMemoryWorkflowCache>) -> Self {
        self.workflow_cache = Some(cache);
        self
    }

    /// Consume and run jobs until the queue reports no message within
    /// `poll_timeout`, then return. Callers that want a long-running
    /// service loop this in their own `loop {}` (apps/engine does).
    pub async fn run_until_idle(&self, poll_timeout: Duration) -> usize {
        let mut handled = 0;
        while self.run_one(poll_timeout).await {
            handled += 1;
        }
        handled
    }

    /// Consume exactly one message, if any is available within
    /// `poll_timeout`. Returns `true` if a job was handled (regardless of
    /// whether the execution itself completed, failed, or was skipped for
    /// having lost the claim race).
    pub async fn run_one(&self, poll_timeout: Duration) -> bool {
        let Some((message_id, payload)) = self.workflow_queue.consume(poll_timeout).await.unwrap_or_else(|err| {
            error!(%err, "execute-workflow queue consume failed");
            None
        }) else {
            return false;
        };

        let job: ExecuteWorkflow = match serde_json::from_value(payload) {
            Ok(job) => job,
            Err(err) => {
                error!(%err, "malformed ExecuteWorkflow payload, acking to avoid a poison-message loop");
                let _ = self.workflow_queue.ack(&message_id).await;
                return true;
            }
        };

        match self.handle(job).await {
            HandleOutcome::Ack => {
                let _ = self.workflow_queue.ack(&message_id).await;
            }
            HandleOutcome::Nack => {
                let _ = self.workflow_queue.nack(&message_id).await;
            }
        }
        true
    }

    async fn handle(&self, job: ExecuteWorkflow) -> HandleOutcome {
        let execution_id = job.execution_id;
        let claimed = self.state_store.transition(
            execution_id,
            &[ExecutionStatus::Pending],
            ExecutionStatus::Running,
            |_| {},
        );
        if let Err(err) = claimed {
            // `from == Running` means some other claimant currently owns this
            // execution (a real race, not a stale redelivery) — nack so the
            // message gets redelivered instead of silently dropped. Any other
            // `from` is a terminal status: the execution already finished by
            // the time this delivery was processed, so the job is a no-op.
            return match &err {
                ExecutionError::InvalidExecutionTransition { from, .. } if *from == ExecutionStatus::Running => {
                    warn!(%execution_id, %err, "lost the claim race, requeuing for redelivery");
                    HandleOutcome::Nack
                }
                _ => {
                    warn!(%execution_id, %err, "execution already terminal, skipping");
                    HandleOutcome::Ack
                }
            };
        }

        let workflow = match workflow_from_payload(&job) {
            Ok(workflow) => workflow,
            Err(err) => {
                error!(%execution_id, %err, "could not decode workflow payload after claiming");
                let _ = self.state_store.transition(
                    execution_id,
                    &[ExecutionStatus::Running],
                    ExecutionStatus::Failed,
                    |execution| execution.error = Some(err),
                );
                return HandleOutcome::Ack;
            }
        };

        if let Some(cache) = &self.workflow_cache {
            cache.insert(execution_id, workflow.clone());
        }

        if let Err(err) = self.scheduler.run(execution_id, &workflow).await {
            error!(%execution_id, %err, "scheduler run ended in error");
        } else {
            info!(%execution_id, "scheduler run finished");
        }
        HandleOutcome::Ack
    }
}

/// Whether [`Worker::handle`]'s caller should ack (the job reached a
/// terminal outcome, or never will) or nack (redeliver: another claimant
/// currently owns the execution).
enum HandleOutcome {
    Ack,
    Nack,
}

fn workflow_from_payload(job: &ExecuteWorkflow) -> Result<WorkflowDefinition, String> {
    let nodes: Vec<NodeDefinition> = serde_json::from_value(job.workflow.nodes.clone())
        .map_err(|err| format!("nodes: {err}"))?;
    let edges: Vec<Edge> = serde_json::from_value(job.workflow.edges.clone())
        .map_err(|err| format!("edges: {err}"))?;
    Ok(WorkflowDefinition::new(job.workflow_id, nodes, edges))
}
