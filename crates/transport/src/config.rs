//! Transport configuration: TTL and prefetch per queue (§6).

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub prefetch_workflow: usize,
    pub prefetch_node: usize,
    pub ttl_workflow: Duration,
    pub ttl_node: Duration,
    /// Redeliveries before a message is moved to the dead-letter queue.
    pub max_redeliveries: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            prefetch_workflow: 10,
            prefetch_node: 20,
            ttl_workflow: Duration::from_secs(24 * 3600),
            ttl_node: Duration::from_secs(30 * 60),
            max_redeliveries: 5,
        }
    }
}
