//! Orchestrator-facing errors (§4.7, §7). Plan validation failures are
//! returned synchronously to the submitter and never produce an
//! `Execution` record (§8 scenario 5).

use flowcore_core::ExecutionId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The workflow failed DAG Analyzer validation at submit time.
    #[error("workflow rejected: {0}")]
    InvalidWorkflow(#[from] flowcore_workflow::WorkflowError),

    #[error("state store: {0}")]
    StateStore(#[from] flowcore_execution::ExecutionError),

    #[error("transport: {0}")]
    Transport(#[from] flowcore_transport::TransportError),

    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),
}
