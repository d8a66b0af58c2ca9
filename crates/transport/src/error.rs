//! Transport-level errors (§7's `TransportError`).

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("queue is full or closed")]
    Full,
    #[error("message {0} not found in-flight (double ack, or redelivered past DLQ threshold)")]
    NotInFlight(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}
