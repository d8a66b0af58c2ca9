#![forbid(unsafe_code)]

//! The message bus (C4): durable, acked, DLQ-backed queues for
//! `execute-workflow` and `execute-node` dispatch, plus the wire message
//! shapes exchanged over them (§4.4, §6).

pub mod config;
pub mod error;
pub mod messages;
pub mod queue;

pub use config::TransportConfig;
pub use error::TransportError;
pub use messages::{ExecuteNode, ExecuteNodeReply, ExecuteWorkflow, NodePayload, ReplyStatus, WorkflowPayload};
pub use queue::{InMemoryQueue, Queue};
