//! Scenario tests for the drain loop, exercising [`Scheduler`] end-to-end
//! against an in-memory state store and a scripted [`NodeTransport`].

use std::collections::HashMap;
use std::sync::Arc;

use flowcore_core::{ExecutionId, NodeId, TenantId, WorkflowId};
use flowcore_dispatcher::{Dispatcher, DispatcherConfig, NodeInvocation, NodeTransport};
use flowcore_engine::{EngineConfig, Scheduler};
use flowcore_eventstream::EventStream;
use flowcore_execution::{Execution, ExecutionStatus, InMemoryStateStore, NodeStatus, StateStore};
use flowcore_sandbox::NodeError;
use flowcore_workflow::{Edge, NodeDefinition, WorkflowDefinition};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// One node's canned sequence of outcomes, consumed in order as the
/// dispatcher (re)tries it.
#[derive(Clone)]
enum Step {
    Ok(Value),
    Err(NodeError),
}

/// A [`NodeTransport`] whose behavior per node is scripted in advance, so
/// tests can assert on retry counts and fail-fast ordering without a real
/// sandbox.
struct ScriptedTransport {
    scripts: Mutex<HashMap<NodeId, Vec<Step>>>,
    calls: Mutex<Vec<NodeId>>,
}

impl ScriptedTransport {
    fn new(scripts: HashMap<NodeId, Vec<Step>>) -> Self {
        Self { scripts: Mutex::new(scripts), calls: Mutex::new(Vec::new()) }
    }

    fn call_count(&self, node_id: NodeId) -> usize {
        self.calls.lock().iter().filter(|&&id| id == node_id).count()
    }
}

#[async_trait::async_trait]
impl NodeTransport for ScriptedTransport {
    async fn invoke(&self, request: NodeInvocation) -> Result<Value, NodeError> {
        self.calls.lock().push(request.node_id);
        let mut scripts = self.scripts.lock();
        let steps = scripts.entry(request.node_id).or_insert_with(|| vec![Step::Ok(json!({}))]);
        let step = if steps.len() > 1 { steps.remove(0) } else { steps[0].clone() };
        match step {
            Step::Ok(value) => Ok(value),
            Step::Err(error) => Err(error),
        }
    }
}

fn harness(
    scripts: HashMap<NodeId, Vec<Step>>,
) -> (Scheduler<InMemoryStateStore, ScriptedTransport>, Arc<InMemoryStateStore>, Arc<ScriptedTransport>) {
    harness_with_config(scripts, EngineConfig::default())
}

fn harness_with_config(
    scripts: HashMap<NodeId, Vec<Step>>,
    config: EngineConfig,
) -> (Scheduler<InMemoryStateStore, ScriptedTransport>, Arc<InMemoryStateStore>, Arc<ScriptedTransport>) {
    let store = Arc::new(InMemoryStateStore::new());
    let transport = Arc::new(ScriptedTransport::new(scripts));
    let dispatcher = Arc::new(Dispatcher::new(transport.clone(), DispatcherConfig::default()));
    let events = Arc::new(EventStream::default());
    let scheduler = Scheduler::new(store.clone(), dispatcher, events, config);
    (scheduler, store, transport)
}

fn pending_execution(workflow_id: WorkflowId, input: Value) -> (ExecutionId, Execution) {
    let id = ExecutionId::v4();
    (id, Execution::new(id, workflow_id, TenantId::v4(), input, "corr-1".into()))
}

fn claim(store: &InMemoryStateStore, execution_id: ExecutionId) {
    store
        .transition(execution_id, &[ExecutionStatus::Pending], ExecutionStatus::Running, |_| {})
        .unwrap();
}

#[tokio::test]
async fn linear_three_node_success_completes_in_dependency_order() {
    let a = NodeId::v4();
    let b = NodeId::v4();
    let c = NodeId::v4();
    let workflow = WorkflowDefinition::new(
        WorkflowId::v4(),
        vec![NodeDefinition::new(a, "noop"), NodeDefinition::new(b, "noop"), NodeDefinition::new(c, "noop")],
        vec![Edge::new(a, b), Edge::new(b, c)],
    );

    let mut scripts = HashMap::new();
    scripts.insert(a, vec![Step::Ok(json!({"value": 1}))]);
    scripts.insert(b, vec![Step::Ok(json!({"value": 2}))]);
    scripts.insert(c, vec![Step::Ok(json!({"value": 3}))]);

    let (scheduler, store, _transport) = harness(scripts);
    let (exec_id, execution) = pending_execution(workflow.id, json!({}));
    store.create(execution).unwrap();
    claim(&store, exec_id);

    scheduler.run(exec_id, &workflow).await.unwrap();

    let snap = store.snapshot(exec_id).unwrap();
    assert_eq!(snap.execution.status, ExecutionStatus::Completed);
    assert_eq!(snap.execution.progress.completed, 3);
    assert_eq!(snap.execution.progress.failed, 0);
    assert_eq!(snap.execution.progress.skipped, 0);
    assert!(snap.nodes.iter().all(|n| n.status == NodeStatus::Completed));
}

#[tokio::test]
async fn diamond_runs_both_middle_nodes_and_completes() {
    let a = NodeId::v4();
    let b = NodeId::v4();
    let c = NodeId::v4();
    let d = NodeId::v4();
    let workflow = WorkflowDefinition::new(
        WorkflowId::v4(),
        vec![
            NodeDefinition::new(a, "noop"),
            NodeDefinition::new(b, "noop"),
            NodeDefinition::new(c, "noop"),
            NodeDefinition::new(d, "noop"),
        ],
        vec![Edge::new(a, b), Edge::new(a, c), Edge::new(b, d), Edge::new(c, d)],
    );

    let mut scripts = HashMap::new();
    scripts.insert(a, vec![Step::Ok(json!({}))]);
    scripts.insert(b, vec![Step::Ok(json!({}))]);
    scripts.insert(c, vec![Step::Ok(json!({}))]);
    scripts.insert(d, vec![Step::Ok(json!({}))]);

    let config = EngineConfig { max_concurrency_per_execution: 2, ..EngineConfig::default() };
    let (scheduler, store, transport) = harness_with_config(scripts, config);

    let (exec_id, execution) = pending_execution(workflow.id, json!({}));
    store.create(execution).unwrap();
    claim(&store, exec_id);

    scheduler.run(exec_id, &workflow).await.unwrap();

    let snap = store.snapshot(exec_id).unwrap();
    assert_eq!(snap.execution.status, ExecutionStatus::Completed);
    assert_eq!(snap.execution.progress.completed, 4);
    assert_eq!(transport.call_count(b), 1);
    assert_eq!(transport.call_count(c), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_retries_then_succeeds() {
    let a = NodeId::v4();
    let workflow =
        WorkflowDefinition::new(WorkflowId::v4(), vec![NodeDefinition::new(a, "noop")], vec![]);

    let mut scripts = HashMap::new();
    scripts.insert(
        a,
        vec![
            Step::Err(NodeError::RuntimeError { message: "transient".into() }),
            Step::Ok(json!({"recovered": true})),
        ],
    );

    let (scheduler, store, transport) = harness(scripts);
    let (exec_id, execution) = pending_execution(workflow.id, json!({}));
    store.create(execution).unwrap();
    claim(&store, exec_id);

    scheduler.run(exec_id, &workflow).await.unwrap();

    let snap = store.snapshot(exec_id).unwrap();
    assert_eq!(snap.execution.status, ExecutionStatus::Completed);
    assert_eq!(transport.call_count(a), 2);
    let node = snap.nodes.iter().find(|n| n.node_id == a).unwrap();
    assert_eq!(node.status, NodeStatus::Completed);
    assert_eq!(node.attempt, 2);
}

#[tokio::test]
async fn fail_fast_skips_undispatched_downstream_of_a_failed_sibling() {
    // a -> b, a -> c, c -> d. b fails non-retryably while c (and therefore
    // d) never gets a chance to run: fail-fast clears the ready-set as soon
    // as b's terminal failure is observed. `maxConcurrency=1` plus `b < c`
    // (by node id) makes the drain loop deterministically dispatch b before
    // c, since both become ready in the same round once a completes and the
    // ready-set is drained in ascending id order.
    let a = NodeId::v4();
    let (b, c) = {
        let x = NodeId::v4();
        let y = NodeId::v4();
        if x < y { (x, y) } else { (y, x) }
    };
    let d = NodeId::v4();
    let workflow = WorkflowDefinition::new(
        WorkflowId::v4(),
        vec![
            NodeDefinition::new(a, "noop"),
            NodeDefinition::new(b, "noop"),
            NodeDefinition::new(c, "noop"),
            NodeDefinition::new(d, "noop"),
        ],
        vec![Edge::new(a, b), Edge::new(a, c), Edge::new(c, d)],
    );

    let mut scripts = HashMap::new();
    scripts.insert(a, vec![Step::Ok(json!({}))]);
    scripts.insert(b, vec![Step::Err(NodeError::SandboxViolation { message: "no network grant".into() })]);
    scripts.insert(c, vec![Step::Ok(json!({}))]);

    // maxConcurrency=1 makes the ordering of b vs c deterministic: a
    // completes, then only one of {b, c} dispatches before the loop reacts.
    let config = EngineConfig { max_concurrency_per_execution: 1, ..EngineConfig::default() };
    let (scheduler, store, transport) = harness_with_config(scripts, config);

    let (exec_id, execution) = pending_execution(workflow.id, json!({}));
    store.create(execution).unwrap();
    claim(&store, exec_id);

    scheduler.run(exec_id, &workflow).await.unwrap();

    let snap = store.snapshot(exec_id).unwrap();
    assert_eq!(snap.execution.status, ExecutionStatus::Failed);
    assert_eq!(transport.call_count(d), 0);
    let node_d = snap.nodes.iter().find(|n| n.node_id == d).unwrap();
    assert_eq!(node_d.status, NodeStatus::Skipped);
}

#[tokio::test]
async fn edge_condition_false_skips_the_gated_dependent() {
    let a = NodeId::v4();
    let b = NodeId::v4();
    let workflow = WorkflowDefinition::new(
        WorkflowId::v4(),
        vec![NodeDefinition::new(a, "noop"), NodeDefinition::new(b, "noop")],
        vec![Edge::new(a, b).with_condition(flowcore_workflow::EdgeCondition {
            field: "status".into(),
            operator: flowcore_workflow::ConditionOperator::Equals,
            value: json!("go"),
        })],
    );

    let mut scripts = HashMap::new();
    scripts.insert(a, vec![Step::Ok(json!({"status": "stop"}))]);

    let (scheduler, store, transport) = harness(scripts);
    let (exec_id, execution) = pending_execution(workflow.id, json!({}));
    store.create(execution).unwrap();
    claim(&store, exec_id);

    scheduler.run(exec_id, &workflow).await.unwrap();

    let snap = store.snapshot(exec_id).unwrap();
    assert_eq!(snap.execution.status, ExecutionStatus::Completed);
    assert_eq!(transport.call_count(b), 0);
    let node_b = snap.nodes.iter().find(|n| n.node_id == b).unwrap();
    assert_eq!(node_b.status, NodeStatus::Skipped);
}

/// A transport that flips `cancel_requested` on the store the moment its
/// designated trigger node is invoked, simulating an `Orchestrator::cancel`
/// call arriving while that node is in flight.
struct CancellingTransport {
    store: Arc<InMemoryStateStore>,
    execution_id: ExecutionId,
    trigger: NodeId,
    calls: Mutex<Vec<NodeId>>,
}

#[async_trait::async_trait]
impl NodeTransport for CancellingTransport {
    async fn invoke(&self, request: NodeInvocation) -> Result<Value, NodeError> {
        self.calls.lock().push(request.node_id);
        if request.node_id == self.trigger {
            self.store.patch_execution(self.execution_id, |e| e.cancel_requested = true).unwrap();
        }
        Ok(json!({}))
    }
}

#[tokio::test]
async fn cancellation_requested_mid_drain_skips_remaining_nodes() {
    // a -> b. Cancellation is observed while a is still in flight (a's own
    // invocation flips cancel_requested), so a still finishes and is
    // persisted as Completed, but b never gets dispatched: the drain loop
    // checks cancel_requested at the top of the next iteration, before
    // readying b.
    let a = NodeId::v4();
    let b = NodeId::v4();
    let workflow = WorkflowDefinition::new(
        WorkflowId::v4(),
        vec![NodeDefinition::new(a, "noop"), NodeDefinition::new(b, "noop")],
        vec![Edge::new(a, b)],
    );

    let store = Arc::new(InMemoryStateStore::new());
    let (exec_id, execution) = pending_execution(workflow.id, json!({}));
    store.create(execution).unwrap();
    claim(&store, exec_id);

    let transport =
        Arc::new(CancellingTransport { store: store.clone(), execution_id: exec_id, trigger: a, calls: Mutex::new(Vec::new()) });
    let dispatcher = Arc::new(Dispatcher::new(transport.clone(), DispatcherConfig::default()));
    let events = Arc::new(EventStream::default());
    let scheduler = Scheduler::new(store.clone(), dispatcher, events, EngineConfig::default());

    scheduler.run(exec_id, &workflow).await.unwrap();

    let snap = store.snapshot(exec_id).unwrap();
    assert_eq!(snap.execution.status, ExecutionStatus::Cancelled);
    assert!(!transport.calls.lock().contains(&b));
    let node_a = snap.nodes.iter().find(|n| n.node_id == a).unwrap();
    assert_eq!(node_a.status, NodeStatus::Completed);
    let node_b = snap.nodes.iter().find(|n| n.node_id == b).unwrap();
    assert_eq!(node_b.status, NodeStatus::Skipped);
}

#[tokio::test(start_paused = true)]
async fn execution_deadline_exceeded_fails_the_execution() {
    let a = NodeId::v4();
    let b = NodeId::v4();
    let workflow = WorkflowDefinition::new(
        WorkflowId::v4(),
        vec![NodeDefinition::new(a, "noop"), NodeDefinition::new(b, "noop")],
        vec![Edge::new(a, b)],
    );

    struct StallingTransport;
    #[async_trait::async_trait]
    impl NodeTransport for StallingTransport {
        async fn invoke(&self, _request: NodeInvocation) -> Result<Value, NodeError> {
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            Ok(json!({}))
        }
    }

    let store = Arc::new(InMemoryStateStore::new());
    let (exec_id, execution) = pending_execution(workflow.id, json!({}));
    store.create(execution).unwrap();
    claim(&store, exec_id);

    let dispatcher = Arc::new(Dispatcher::new(Arc::new(StallingTransport), DispatcherConfig::default()));
    let events = Arc::new(EventStream::default());
    let config = EngineConfig { execution_deadline: std::time::Duration::from_millis(1), ..EngineConfig::default() };
    let scheduler = Scheduler::new(store.clone(), dispatcher, events, config);

    scheduler.run(exec_id, &workflow).await.unwrap();

    let snap = store.snapshot(exec_id).unwrap();
    assert_eq!(snap.execution.status, ExecutionStatus::Failed);
    assert!(snap.execution.error.as_deref().unwrap_or_default().contains("deadline"));
}
