#![forbid(unsafe_code)]

//! The Node Runner sandbox (C3): node-type registry, capability grants,
//! resource limits, and the in-process runner that enforces them around
//! one node invocation (§4.3).

pub mod capability;
pub mod config;
pub mod error;
pub mod registry;
pub mod runner;

pub use capability::{Capability, Grant, IsolationLevel};
pub use config::SandboxConfig;
pub use error::NodeError;
pub use registry::{FnHandler, NodeHandler, NodeRegistry};
pub use runner::{InvocationOutcome, InvocationRequest, SandboxRunner};
