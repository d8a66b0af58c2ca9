//! An in-process [`NodeTransport`] over [`SandboxRunner`] — the
//! single-binary wiring used by `apps/engine` when node execution happens
//! in the same process rather than over a real `execute-node` queue (§4.3,
//! §4.5). A deployment that splits the Node Runner into its own service
//! swaps this for a transport that publishes `ExecuteNode` and awaits the
//! correlated `ExecuteNodeReply` instead.

use async_trait::async_trait;
use flowcore_sandbox::{InvocationOutcome, InvocationRequest, NodeError, SandboxRunner};
use serde_json::Value;

use crate::dispatch::{NodeInvocation, NodeTransport};

pub struct SandboxTransport {
    runner: SandboxRunner,
}

impl SandboxTransport {
    #[must_use]
    pub fn new(runner: SandboxRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl NodeTransport for SandboxTransport {
    async fn invoke(&self, request: NodeInvocation) -> Result<Value, NodeError> {
        let outcome = self
            .runner
            .run(InvocationRequest {
                node_type: request.node_type,
                parameters: request.parameters,
                input: request.input,
                timeout_override: None,
                grant: request.grant,
            })
            .await;

        match outcome {
            InvocationOutcome::Completed { output } => Ok(output),
            InvocationOutcome::Failed { error } => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcore_core::{ExecutionId, NodeId};
    use flowcore_sandbox::{FnHandler, NodeRegistry, SandboxConfig};
    use std::sync::Arc;

    #[tokio::test]
    async fn delegates_to_the_registered_handler() {
        let mut registry = NodeRegistry::new();
        registry.register("echo", Arc::new(FnHandler(|_p, input| async move { Ok(input) })));
        let transport = SandboxTransport::new(SandboxRunner::new(registry, SandboxConfig::default()));

        let output = transport
            .invoke(NodeInvocation {
                execution_id: ExecutionId::v4(),
                node_id: NodeId::v4(),
                attempt: 1,
                node_type: "echo".into(),
                parameters: serde_json::json!({}),
                input: serde_json::json!({"x": 1}),
                grant: flowcore_sandbox::Grant::none(),
            })
            .await
            .unwrap();
        assert_eq!(output, serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn unknown_node_type_surfaces_as_node_error() {
        let transport = SandboxTransport::new(SandboxRunner::new(NodeRegistry::new(), SandboxConfig::default()));
        let err = transport
            .invoke(NodeInvocation {
                execution_id: ExecutionId::v4(),
                node_id: NodeId::v4(),
                attempt: 1,
                node_type: "missing".into(),
                parameters: serde_json::json!({}),
                input: serde_json::json!({}),
                grant: flowcore_sandbox::Grant::none(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::UnknownNodeType { .. }));
    }
}
