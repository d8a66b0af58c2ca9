//! NodeExecution status (§3: six states; retry is expressed as
//! `Running -> Ready`, not a distinct `Retrying` state).

use serde::{Deserialize, Serialize};

/// The status of one node within a running execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Dependencies not all satisfied yet.
    Pending,
    /// Dependencies met and conditions hold; queued for dispatch.
    Ready,
    /// Dispatched to a runner; awaiting reply.
    Running,
    /// Returned a result; `output` set.
    Completed,
    /// Exhausted retries, or failed non-retryably.
    Failed,
    /// An upstream dependency failed, or an incoming condition evaluated
    /// false.
    Skipped,
}

impl NodeStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}
