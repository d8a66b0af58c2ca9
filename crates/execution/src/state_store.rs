//! The Execution State Store contract (§4.2) and an in-memory implementation
//! used by tests and by the `transport`/`engine` crates' in-process mode.
//!
//! Readers never block writers; writers serialize per `execution_id` via a
//! `DashMap` shard lock, preferring sharded concurrent maps over a single
//! global `RwLock`.

use dashmap::DashMap;
use flowcore_core::{ExecutionId, NodeId, TenantId};

use crate::error::ExecutionError;
use crate::model::{Execution, NodeExecution};
use crate::node_status::NodeStatus;
use crate::status::ExecutionStatus;

/// A consistent read of one execution and all its node records.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub execution: Execution,
    pub nodes: Vec<NodeExecution>,
}

/// The state store contract (§4.2). All operations are tenant-scoped: a
/// caller may only transition or read executions owned by the tenant it
/// authenticated as — enforced by every method taking the execution's
/// `tenant_id` implicitly via the stored record, not re-checked here
/// (callers above this crate own authn/authz).
pub trait StateStore: Send + Sync {
    /// Insert a brand-new execution. Fails with
    /// [`ExecutionError::AlreadyExists`] if `id` collides.
    fn create(&self, execution: Execution) -> Result<(), ExecutionError>;

    /// Compare-and-set the execution's status: succeeds only if the current
    /// status is in `from`. `patch` is applied atomically with the
    /// transition.
    fn transition(
        &self,
        execution_id: ExecutionId,
        from: &[ExecutionStatus],
        to: ExecutionStatus,
        patch: impl FnOnce(&mut Execution),
    ) -> Result<(), ExecutionError>;

    /// Apply `patch` to the execution record without a status transition —
    /// used for in-place fields like `progress` and `cancel_requested`
    /// that change while the execution stays `Running` (§4.6's progress
    /// counters are updated every drain-loop step, not just on terminal
    /// transitions).
    fn patch_execution(
        &self,
        execution_id: ExecutionId,
        patch: impl FnOnce(&mut Execution),
    ) -> Result<(), ExecutionError>;

    /// Insert or update one `NodeExecution` attempt row.
    fn upsert_node(&self, node: NodeExecution) -> Result<(), ExecutionError>;

    /// A single consistent read of an execution plus all its node records
    /// (latest attempt per node).
    fn snapshot(&self, execution_id: ExecutionId) -> Result<Snapshot, ExecutionError>;

    /// Executions currently `Running`, for engine-startup crash recovery
    /// (§4.6.4).
    fn list_running(&self) -> Vec<ExecutionId>;
}

/// In-memory [`StateStore`]. Not durable across process restart — used for
/// tests and for the in-process demo wiring; a production deployment swaps
/// this for a real database behind the same trait.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    executions: DashMap<ExecutionId, Execution>,
    nodes: DashMap<(ExecutionId, NodeId), Vec<NodeExecution>>,
}

impl InMemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All node records for `execution_id`, tenant-scoping already applied
    /// by the caller holding a valid `tenant_id` for that execution.
    #[must_use]
    pub fn nodes_for(&self, execution_id: ExecutionId) -> Vec<NodeExecution> {
        self.nodes
            .iter()
            .filter(|entry| entry.key().0 == execution_id)
            .filter_map(|entry| entry.value().last().cloned())
            .collect()
    }

    /// All attempt rows (not just the latest) for one node — the crash
    /// recovery path needs the full history to decide whether a `Running`
    /// attempt's deadline elapsed.
    #[must_use]
    pub fn node_history(&self, execution_id: ExecutionId, node_id: NodeId) -> Vec<NodeExecution> {
        self.nodes
            .get(&(execution_id, node_id))
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn tenant_of(&self, execution_id: ExecutionId) -> Option<TenantId> {
        self.executions.get(&execution_id).map(|e| e.tenant_id)
    }
}

impl StateStore for InMemoryStateStore {
    fn create(&self, execution: Execution) -> Result<(), ExecutionError> {
        match self.executions.entry(execution.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(ExecutionError::AlreadyExists(execution.id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(execution);
                Ok(())
            }
        }
    }

    fn transition(
        &self,
        execution_id: ExecutionId,
        from: &[ExecutionStatus],
        to: ExecutionStatus,
        patch: impl FnOnce(&mut Execution),
    ) -> Result<(), ExecutionError> {
        let mut entry = self
            .executions
            .get_mut(&execution_id)
            .ok_or(ExecutionError::ExecutionNotFound(execution_id))?;

        if !from.contains(&entry.status) {
            return Err(ExecutionError::InvalidExecutionTransition {
                from: entry.status,
                to,
            });
        }

        entry.transition(to)?;
        patch(&mut entry);
        Ok(())
    }

    fn patch_execution(
        &self,
        execution_id: ExecutionId,
        patch: impl FnOnce(&mut Execution),
    ) -> Result<(), ExecutionError> {
        let mut entry = self
            .executions
            .get_mut(&execution_id)
            .ok_or(ExecutionError::ExecutionNotFound(execution_id))?;
        patch(&mut entry);
        Ok(())
    }

    fn upsert_node(&self, node: NodeExecution) -> Result<(), ExecutionError> {
        let key = (node.execution_id, node.node_id);
        let mut history = self.nodes.entry(key).or_default();
        match history.last_mut() {
            Some(last) if last.attempt == node.attempt => *last = node,
            _ => history.push(node),
        }
        Ok(())
    }

    fn snapshot(&self, execution_id: ExecutionId) -> Result<Snapshot, ExecutionError> {
        let execution = self
            .executions
            .get(&execution_id)
            .ok_or(ExecutionError::ExecutionNotFound(execution_id))?
            .clone();
        Ok(Snapshot {
            execution,
            nodes: self.nodes_for(execution_id),
        })
    }

    fn list_running(&self) -> Vec<ExecutionId> {
        self.executions
            .iter()
            .filter(|entry| entry.value().status == ExecutionStatus::Running)
            .map(|entry| *entry.key())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcore_core::WorkflowId;

    fn execution() -> Execution {
        Execution::new(
            ExecutionId::v4(),
            WorkflowId::v4(),
            TenantId::v4(),
            serde_json::json!({}),
            "corr".into(),
        )
    }

    #[test]
    fn create_then_duplicate_fails() {
        let store = InMemoryStateStore::new();
        let exec = execution();
        store.create(exec.clone()).unwrap();
        let err = store.create(exec).unwrap_err();
        assert!(matches!(err, ExecutionError::AlreadyExists(_)));
    }

    #[test]
    fn transition_cas_succeeds_within_from_set() {
        let store = InMemoryStateStore::new();
        let exec = execution();
        let id = exec.id;
        store.create(exec).unwrap();

        store
            .transition(id, &[ExecutionStatus::Pending], ExecutionStatus::Running, |_| {})
            .unwrap();

        let snap = store.snapshot(id).unwrap();
        assert_eq!(snap.execution.status, ExecutionStatus::Running);
    }

    #[test]
    fn transition_cas_fails_outside_from_set() {
        let store = InMemoryStateStore::new();
        let exec = execution();
        let id = exec.id;
        store.create(exec).unwrap();

        let err = store
            .transition(id, &[ExecutionStatus::Running], ExecutionStatus::Completed, |_| {})
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidExecutionTransition { .. }));
    }

    #[test]
    fn duplicate_claim_is_invalid_transition() {
        // Invariant 5: two engines racing to claim the same execution —
        // the second observes an invalid CAS and no-ops.
        let store = InMemoryStateStore::new();
        let exec = execution();
        let id = exec.id;
        store.create(exec).unwrap();

        store
            .transition(id, &[ExecutionStatus::Pending], ExecutionStatus::Running, |_| {})
            .unwrap();
        let err = store
            .transition(id, &[ExecutionStatus::Pending], ExecutionStatus::Running, |_| {})
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidExecutionTransition { .. }));
    }

    #[test]
    fn upsert_node_then_retry_appends_new_attempt_row() {
        let store = InMemoryStateStore::new();
        let exec_id = ExecutionId::v4();
        let node_id = NodeId::v4();

        let mut n = NodeExecution::new(exec_id, node_id, vec![], vec![]);
        n.transition(NodeStatus::Ready).unwrap();
        n.transition(NodeStatus::Running).unwrap();
        store.upsert_node(n.clone()).unwrap();

        n.fail("transient").unwrap();
        store.upsert_node(n.clone()).unwrap();
        assert_eq!(store.node_history(exec_id, node_id).len(), 1);

        n.transition(NodeStatus::Ready).unwrap(); // retry, attempt -> 1
        store.upsert_node(n.clone()).unwrap();
        assert_eq!(store.node_history(exec_id, node_id).len(), 2);
    }

    #[test]
    fn list_running_only_returns_running_executions() {
        let store = InMemoryStateStore::new();
        let a = execution();
        let a_id = a.id;
        store.create(a).unwrap();
        store
            .transition(a_id, &[ExecutionStatus::Pending], ExecutionStatus::Running, |_| {})
            .unwrap();

        let b = execution();
        store.create(b).unwrap();

        assert_eq!(store.list_running(), vec![a_id]);
    }

    #[test]
    fn patch_execution_updates_in_place_without_status_change() {
        let store = InMemoryStateStore::new();
        let exec = execution();
        let id = exec.id;
        store.create(exec).unwrap();

        store.patch_execution(id, |e| e.progress.running = 3).unwrap();
        let snap = store.snapshot(id).unwrap();
        assert_eq!(snap.execution.progress.running, 3);
        assert_eq!(snap.execution.status, ExecutionStatus::Pending);
    }

    #[test]
    fn snapshot_unknown_execution_errors() {
        let store = InMemoryStateStore::new();
        let err = store.snapshot(ExecutionId::v4()).unwrap_err();
        assert!(matches!(err, ExecutionError::ExecutionNotFound(_)));
    }
}
