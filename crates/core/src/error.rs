//! Common error building blocks shared by every crate in the workspace.
//!
//! Each crate owns its own `thiserror`-derived enum scoped to its concern
//! (`WorkflowError`, `ExecutionError`, `NodeError`, ...); `CoreError` only
//! covers failures that belong to no single component — malformed ids on
//! the wire, clock/time errors, and the generic "this should be
//! unreachable" case.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    #[error("invalid id `{value}`: {source}")]
    InvalidId {
        value: String,
        #[source]
        source: crate::id::UuidParseError,
    },

    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}
