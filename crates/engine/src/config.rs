//! `engine.*` configuration (§6, §5).

use std::time::Duration;

use flowcore_workflow::FailPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bounded parallelism within one execution's drain loop. Valid range
    /// [1, 500] (§6); out-of-range values are clamped by [`Self::clamped`].
    pub max_concurrency_per_execution: usize,
    /// How many executions this engine instance will own concurrently.
    pub max_executions_per_instance: usize,
    /// Execution-wide wall-clock deadline; elapsed -> `Failed{DeadlineExceeded}` (§5).
    pub execution_deadline: Duration,
    /// Engine-wide default for `execution.failPolicy` (§6): the strategy
    /// applied on a node's first fatal error. Workflows have no per-workflow
    /// override field yet, so this is the only knob that currently reaches
    /// the scheduler.
    pub fail_policy: FailPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency_per_execution: 10,
            max_executions_per_instance: 100,
            execution_deadline: Duration::from_secs(3600),
            fail_policy: FailPolicy::FailFast,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.max_concurrency_per_execution = self.max_concurrency_per_execution.clamp(1, 500);
        self
    }
}
