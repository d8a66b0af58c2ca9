//! Engine-startup crash recovery (§4.6.4).
//!
//! An engine instance that crashes mid-drain leaves executions `Running`
//! with a mix of `Completed`/`Running`/`Pending` node records and nothing
//! watching them. On restart, any instance may claim those executions back
//! (ownership is per-execution, not per-instance — the message bus's
//! redelivery is what brings them back into view, not a heartbeat) and
//! resume [`Scheduler::run`], which folds the persisted node records back
//! into its ready/running sets before dispatching anything new.

use std::sync::Arc;

use dashmap::DashMap;
use flowcore_core::ExecutionId;
use flowcore_dispatcher::NodeTransport;
use flowcore_execution::StateStore;
use flowcore_workflow::WorkflowDefinition;
use tracing::{info, warn};

use crate::scheduler::Scheduler;

/// Looks up the workflow definition for a recovered execution. Separate
/// from [`StateStore`] because workflow definitions are immutable and
/// typically live in a different store (§4.2 vs. the workflow catalog).
pub trait WorkflowLookup: Send + Sync {
    fn get(&self, execution_id: ExecutionId) -> Option<WorkflowDefinition>;
}

/// A [`WorkflowLookup`] backed by an in-process map, keyed as each
/// `ExecuteWorkflow` job is consumed off the queue (see
/// `flowcore_engine::Worker`). Good enough for a single engine instance that
/// never loses this map; a multi-instance deployment backs `WorkflowLookup`
/// with the same durable workflow catalog every instance shares.
#[derive(Default)]
pub struct InMemoryWorkflowCache {
    workflows: DashMap<ExecutionId, WorkflowDefinition>,
}

impl InMemoryWorkflowCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, execution_id: ExecutionId, workflow: WorkflowDefinition) {
        self.workflows.insert(execution_id, workflow);
    }
}

impl WorkflowLookup for InMemoryWorkflowCache {
    fn get(&self, execution_id: ExecutionId) -> Option<WorkflowDefinition> {
        self.workflows.get(&execution_id).map(|entry| entry.clone())
    }
}

/// Resume every execution this instance finds `Running` at startup.
/// One execution's recovery failing doesn't stop the others — each is
/// logged and skipped so a single corrupt record can't wedge the whole
/// fleet of executions an instance is responsible for.
pub async fn recover_running<S, T, W>(
    scheduler: &Scheduler<S, T>,
    state_store: &Arc<S>,
    workflows: &W,
) -> Vec<ExecutionId>
where
    S: StateStore + 'static,
    T: NodeTransport + 'static,
    W: WorkflowLookup,
{
    let running = state_store.list_running();
    if running.is_empty() {
        return Vec::new();
    }
    info!(count = running.len(), "resuming executions found running at startup");

    let mut resumed = Vec::with_capacity(running.len());
    for execution_id in running {
        let Some(workflow) = workflows.get(execution_id) else {
            warn!(%execution_id, "no workflow definition found for a running execution, skipping recovery");
            continue;
        };
        match scheduler.run(execution_id, &workflow).await {
            Ok(()) => resumed.push(execution_id),
            Err(err) => warn!(%execution_id, %err, "recovery run failed"),
        }
    }
    resumed
}
