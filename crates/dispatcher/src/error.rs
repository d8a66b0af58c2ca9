use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("duplicate idempotency key for execution {execution_id}/node {node_id} attempt {attempt}")]
    DuplicateDelivery { execution_id: String, node_id: String, attempt: u32 },
}
