//! The in-process Node Runner sandbox (§4.3): given a request, looks up the
//! handler by node type, runs it under a deadline, and enforces the output
//! size cap. Panics are caught and reported as retryable `RuntimeError`;
//! deadline elapse is reported as non-retryable `ResourceExceeded` (the
//! node's work is assumed still in flight and unrecoverable, not a
//! transient scheduling hiccup).

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::capability::Grant;
use crate::config::SandboxConfig;
use crate::error::NodeError;
use crate::registry::{NodeHandler, NodeRegistry};

/// One invocation request handed to the sandbox by the dispatcher/runner
/// binary (§4.3, wire shape mirrors §6's `ExecuteNode`). `grant` is the
/// capability set this invocation is allowed to use; `Grant::none()` denies
/// network and filesystem access outright (§4.3's "denies unexplicitly-
/// granted access").
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub node_type: String,
    pub parameters: Value,
    pub input: Value,
    pub timeout_override: Option<Duration>,
    pub grant: Grant,
}

/// The outcome of one invocation.
#[derive(Debug, Clone)]
pub enum InvocationOutcome {
    Completed { output: Value },
    Failed { error: NodeError },
}

/// Runs node invocations against a [`NodeRegistry`] under a
/// [`SandboxConfig`]. Stateless across invocations — no cache or handle is
/// retained between calls, so there is nothing for one execution or tenant
/// to leak into another (§4.3).
#[derive(Clone)]
pub struct SandboxRunner {
    registry: NodeRegistry,
    config: SandboxConfig,
}

impl SandboxRunner {
    #[must_use]
    pub fn new(registry: NodeRegistry, config: SandboxConfig) -> Self {
        Self { registry, config }
    }

    #[instrument(skip(self, request), fields(node_type = %request.node_type))]
    pub async fn run(&self, request: InvocationRequest) -> InvocationOutcome {
        let Some(handler) = self.registry.get(&request.node_type) else {
            return InvocationOutcome::Failed {
                error: NodeError::UnknownNodeType { node_type: request.node_type.clone() },
            };
        };

        if handler.requires_network() && !request.grant.allows_network() {
            return InvocationOutcome::Failed {
                error: NodeError::SandboxViolation {
                    message: format!("node type {} requires network access not granted", request.node_type),
                },
            };
        }
        if handler.requires_filesystem() && !request.grant.allows_filesystem() {
            return InvocationOutcome::Failed {
                error: NodeError::SandboxViolation {
                    message: format!("node type {} requires filesystem access not granted", request.node_type),
                },
            };
        }

        let deadline = self.config.timeout_for(request.timeout_override);
        let invoke = AssertUnwindSafe(handler.invoke(&request.parameters, &request.input)).catch_unwind();

        let result = match tokio::time::timeout(deadline, invoke).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(panic)) => {
                let message = panic_message(&panic);
                warn!(%message, "node handler panicked");
                Err(NodeError::RuntimeError { message })
            }
            // Not a retryable `Timeout`: the node's work is assumed still in
            // flight and unrecoverable, so this is resource exhaustion, not
            // transient scheduling slack (§4.3, §7).
            Err(_elapsed) => Err(NodeError::ResourceExceeded {
                message: format!("node execution exceeded its {}ms deadline", deadline.as_millis()),
            }),
        };

        match result {
            Ok(output) => self.enforce_output_cap(output),
            Err(error) => InvocationOutcome::Failed { error },
        }
    }

    fn enforce_output_cap(&self, output: Value) -> InvocationOutcome {
        let actual_bytes = serde_json::to_vec(&output).map(|bytes| bytes.len()).unwrap_or(usize::MAX);
        if actual_bytes > self.config.max_output_bytes {
            return InvocationOutcome::Failed {
                error: NodeError::OutputTooLarge { actual_bytes, limit_bytes: self.config.max_output_bytes },
            };
        }
        InvocationOutcome::Completed { output }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "node handler panicked with a non-string payload".to_string()
    }
}
