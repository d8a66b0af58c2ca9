#![forbid(unsafe_code)]

//! The Orchestrator (C7): the external-facing `submit`/`getStatus`/`cancel`
//! surface. Owns the authoritative `Execution` record and the handoff onto
//! the `execute-workflow` queue; node-level scheduling lives entirely in
//! `flowcore-engine`.

pub mod error;
pub mod orchestrator;

pub use error::OrchestratorError;
pub use orchestrator::{is_cancellable, ExecutionView, Orchestrator};
