//! Process-local node-type registry: handlers are looked up by an opaque
//! type string, miss -> [`NodeError::UnknownNodeType`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::NodeError;

/// One node type's executable behavior. Implementors are pure functions of
/// `(parameters, input)` to `output` — the sandbox is responsible for
/// applying the deadline, memory ceiling, and output cap around the call
/// (§4.3); handlers do not see those mechanisms.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn invoke(&self, parameters: &Value, input: &Value) -> Result<Value, NodeError>;

    /// Whether this node type needs outbound network access. Checked by the
    /// runner against the invocation's [`crate::Grant`] before `invoke` is
    /// called (§4.3) — defaults to `false` so existing handlers stay
    /// sandboxed unless they opt in.
    fn requires_network(&self) -> bool {
        false
    }

    /// Whether this node type needs filesystem access. Same gating as
    /// [`Self::requires_network`].
    fn requires_filesystem(&self) -> bool {
        false
    }
}

/// A `NodeHandler` built directly from an async closure, for tests and for
/// small built-in node types that don't warrant their own type.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> NodeHandler for FnHandler<F>
where
    F: Fn(Value, Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, NodeError>> + Send,
{
    async fn invoke(&self, parameters: &Value, input: &Value) -> Result<Value, NodeError> {
        (self.0)(parameters.clone(), input.clone()).await
    }
}

/// Maps node-type strings to their [`NodeHandler`].
#[derive(Default, Clone)]
pub struct NodeRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl NodeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, node_type: impl Into<String>, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(node_type.into(), handler);
    }

    #[must_use]
    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.get(node_type).cloned()
    }

    #[must_use]
    pub fn contains(&self, node_type: &str) -> bool {
        self.handlers.contains_key(node_type)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn unregister(&mut self, node_type: &str) -> Option<Arc<dyn NodeHandler>> {
        self.handlers.remove(node_type)
    }

    pub fn list(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
