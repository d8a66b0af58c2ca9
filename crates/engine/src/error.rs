use flowcore_execution::ExecutionError;
use flowcore_workflow::WorkflowError;
use thiserror::Error;

/// Engine-level errors (§7). A [`Self::StateStore`] error means the local
/// retry budget for talking to the state store was exhausted — the
/// engine task terminates rather than continuing with stale state.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow failed validation before scheduling: {0}")]
    PlanFailed(#[from] WorkflowError),

    #[error("state store error: {0}")]
    StateStore(#[from] ExecutionError),

    #[error("execution {0} exceeded its deadline")]
    DeadlineExceeded(flowcore_core::ExecutionId),
}
