//! Sandbox resource limits (§4.3, §6's `runner.*` config keys).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-invocation resource limits, defaulted per §6 and overridable per
/// node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Wall-clock deadline for one invocation. Default 30s, configurable up
    /// to 180s per node type (§4.3).
    pub default_timeout: Duration,
    /// Hard ceiling on `default_timeout` overrides.
    pub max_timeout: Duration,
    /// Memory ceiling per invocation.
    pub memory_limit_mb: u64,
    /// Output serialized size cap; oversize is `OutputTooLarge`, not
    /// retryable.
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            max_timeout: Duration::from_secs(180),
            memory_limit_mb: 128,
            max_output_bytes: 1024 * 1024,
        }
    }
}

impl SandboxConfig {
    /// The effective deadline for `node_type`, clamped to `max_timeout`.
    #[must_use]
    pub fn timeout_for(&self, override_timeout: Option<Duration>) -> Duration {
        override_timeout.unwrap_or(self.default_timeout).min(self.max_timeout)
    }
}
