#![forbid(unsafe_code)]

//! The Engine (C6): claims executions off the `execute-workflow` queue,
//! plans them with the DAG Analyzer, and drains the node graph with
//! bounded parallelism (§4.6) — the core of the core.

pub mod config;
pub mod error;
pub mod input;
pub mod recovery;
pub mod scheduler;
pub mod worker;

pub use config::EngineConfig;
pub use error::EngineError;
pub use recovery::{recover_running, InMemoryWorkflowCache, WorkflowLookup};
pub use scheduler::Scheduler;
pub use worker::Worker;
