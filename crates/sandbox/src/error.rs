//! The Node Runner sandbox's error taxonomy (§7), as returned from one node
//! invocation: each variant carries a retryable/fatal classification and a
//! message, narrowed to the variant set §7 actually names for
//! sandbox-originated failures.

use thiserror::Error;

/// Why a node invocation did not complete successfully.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
    /// The node ran past its deadline (§4.3). Retryable — the deadline may
    /// have been transient contention, not a property of the input.
    #[error("node execution timed out after {elapsed_ms}ms (deadline {deadline_ms}ms)")]
    Timeout { elapsed_ms: u64, deadline_ms: u64 },

    /// The handler panicked or returned an unexpected internal error.
    /// Retryable per §7.
    #[error("node runtime error: {message}")]
    RuntimeError { message: String },

    /// The node exceeded its memory ceiling, or the deadline elapsed in a
    /// way attributable to resource exhaustion rather than transient load.
    /// Not retryable — the input or node type itself is the problem.
    #[error("node exceeded resource limit: {message}")]
    ResourceExceeded { message: String },

    /// No handler registered for this node type. Not retryable.
    #[error("unknown node type: {node_type}")]
    UnknownNodeType { node_type: String },

    /// The handler's output exceeded the configured size cap. Not
    /// retryable.
    #[error("node output of {actual_bytes} bytes exceeds cap of {limit_bytes} bytes")]
    OutputTooLarge { actual_bytes: usize, limit_bytes: usize },

    /// The handler attempted an action outside its granted [`crate::Capability`]
    /// set (e.g. network access when none was granted). Not retryable.
    #[error("sandbox violation: {message}")]
    SandboxViolation { message: String },
}

impl NodeError {
    /// Whether the dispatcher should retry this failure (§4.5, §7).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::RuntimeError { .. })
    }

    /// A short machine-readable tag for progress events and error taxonomy
    /// reporting (§4.8's `NodeFailed(error-kind)`).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "Timeout",
            Self::RuntimeError { .. } => "RuntimeError",
            Self::ResourceExceeded { .. } => "ResourceExceeded",
            Self::UnknownNodeType { .. } => "UnknownNodeType",
            Self::OutputTooLarge { .. } => "OutputTooLarge",
            Self::SandboxViolation { .. } => "SandboxViolation",
        }
    }
}
