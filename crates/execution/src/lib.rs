#![forbid(unsafe_code)]

//! Execution/`NodeExecution` records, the state store contract, idempotency,
//! and status transitions (C2, part of C1).
//!
//! This crate models durable execution-time state — it does NOT contain the
//! scheduler (that's `flowcore-engine`). It defines:
//!
//! - [`ExecutionStatus`] / [`NodeStatus`] — the two state machines (§3, §4.6)
//! - [`Execution`] and [`NodeExecution`] — the durable records
//! - [`ResultFingerprint`] — in-memory per-execution output cache
//! - [`StateStore`] and [`InMemoryStateStore`] — the §4.2 contract
//! - [`IdempotencyKey`] and [`IdempotencyManager`] — effectively-once delivery

pub mod error;
pub mod idempotency;
pub mod model;
pub mod node_status;
pub mod state_store;
pub mod status;
pub mod transition;

pub use error::ExecutionError;
pub use idempotency::{IdempotencyKey, IdempotencyManager};
pub use model::{Execution, NodeExecution, Progress, ResultFingerprint};
pub use node_status::NodeStatus;
pub use state_store::{InMemoryStateStore, Snapshot, StateStore};
pub use status::ExecutionStatus;
