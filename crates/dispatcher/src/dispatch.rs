//! `dispatch(execution_id, node_id, node, input) -> NodeExecutionResponse`
//! (§4.5): sends one node invocation, retries retryable failures with
//! exponential backoff up to `max_attempts`, and de-duplicates redelivered
//! responses via `(execution_id, node_id, attempt)` (§4.5, §7).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flowcore_core::{ExecutionId, NodeId};
use flowcore_execution::{IdempotencyKey, IdempotencyManager};
use flowcore_sandbox::{Grant, NodeError};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::DispatcherConfig;

/// What the dispatcher sends over the wire for one invocation.
#[derive(Debug, Clone)]
pub struct NodeInvocation {
    pub execution_id: ExecutionId,
    pub node_id: NodeId,
    pub attempt: u32,
    pub node_type: String,
    pub parameters: Value,
    pub input: Value,
    pub grant: Grant,
}

/// The final outcome of calling [`Dispatcher::dispatch`] — after retries
/// are exhausted or a terminal result is reached.
#[derive(Debug, Clone)]
pub enum NodeExecutionResponse {
    Completed { output: Value, attempt: u32 },
    Failed { error: NodeError, attempt: u32 },
}

/// Abstracts over how one [`NodeInvocation`] actually reaches a Node
/// Runner and comes back — a direct in-process call to
/// `flowcore_sandbox::SandboxRunner` for tests/single-process deployments,
/// or a real send-over-`execute-node`-queue/await-reply implementation in
/// production. The dispatcher's retry/backoff/idempotency logic is the
/// same either way (§4.5's timeout-vs-transport-slack split lives in the
/// production implementation of this trait, not here).
#[async_trait]
pub trait NodeTransport: Send + Sync {
    async fn invoke(&self, request: NodeInvocation) -> Result<Value, NodeError>;
}

/// Drives the retry loop described in §4.5.
pub struct Dispatcher<T: NodeTransport> {
    transport: Arc<T>,
    config: DispatcherConfig,
    idempotency: Mutex<IdempotencyManager>,
}

impl<T: NodeTransport> Dispatcher<T> {
    #[must_use]
    pub fn new(transport: Arc<T>, config: DispatcherConfig) -> Self {
        Self { transport, config, idempotency: Mutex::new(IdempotencyManager::new()) }
    }

    /// Dispatch one node, retrying retryable failures with exponential
    /// backoff (base × 2^(attempt-1), capped) until `max_attempts` is
    /// reached or a non-retryable/successful result is produced.
    pub async fn dispatch(
        &self,
        execution_id: ExecutionId,
        node_id: NodeId,
        node_type: String,
        parameters: Value,
        input: Value,
        grant: Grant,
    ) -> NodeExecutionResponse {
        let mut attempt = 1;
        loop {
            let key = IdempotencyKey::generate(execution_id, node_id, attempt);
            if !self.idempotency.lock().check_and_mark(&key) {
                warn!(%key, "duplicate delivery observed, replaying without redispatch");
            }

            let request = NodeInvocation {
                execution_id,
                node_id,
                attempt,
                node_type: node_type.clone(),
                parameters: parameters.clone(),
                input: input.clone(),
                grant: grant.clone(),
            };

            match self.transport.invoke(request).await {
                Ok(output) => return NodeExecutionResponse::Completed { output, attempt },
                Err(error) => {
                    let exhausted = attempt >= self.config.max_attempts;
                    if !error.is_retryable() || exhausted {
                        return NodeExecutionResponse::Failed { error, attempt };
                    }
                    let backoff = self.config.backoff_for(attempt);
                    debug!(attempt, ?backoff, %error, "retrying node after backoff");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// A [`NodeTransport`] for tests: resolves however many times the caller
/// configures before succeeding or failing terminally.
#[cfg(test)]
pub(crate) struct ScriptedTransport {
    pub responses: Mutex<Vec<Result<Value, NodeError>>>,
    pub calls: Mutex<Vec<u32>>,
}

#[cfg(test)]
#[async_trait]
impl NodeTransport for ScriptedTransport {
    async fn invoke(&self, request: NodeInvocation) -> Result<Value, NodeError> {
        self.calls.lock().push(request.attempt);
        let mut responses = self.responses.lock();
        if responses.is_empty() {
            panic!("ScriptedTransport ran out of scripted responses");
        }
        responses.remove(0)
    }
}
