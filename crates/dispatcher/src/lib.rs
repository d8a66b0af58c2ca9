#![forbid(unsafe_code)]

//! The Node Dispatcher (C5): turns one scheduler decision into a node
//! invocation, retried with exponential backoff and de-duplicated via
//! idempotency keys (§4.5).

pub mod config;
pub mod dispatch;
pub mod error;
pub mod transport;

pub use config::DispatcherConfig;
pub use dispatch::{Dispatcher, NodeExecutionResponse, NodeInvocation, NodeTransport};
pub use error::DispatchError;
pub use transport::SandboxTransport;
