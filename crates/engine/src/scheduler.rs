//! The drain loop (§4.6): claim, plan, dispatch up to `maxConcurrency`,
//! react to each result, finalize. Modeled as a reducer over events
//! (`NodeResult`, `Cancel`) rather than nested async continuations (design
//! note 9.1) — `step()` folds one event into the scheduler's state and
//! returns the side effects (dispatches to start, terminal transition) for
//! `run` to carry out.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use flowcore_core::{ExecutionId, NodeId};
use flowcore_dispatcher::{Dispatcher, NodeExecutionResponse, NodeTransport};
use flowcore_eventstream::{output_hash, EventStream, ProgressEvent};
use flowcore_execution::{ExecutionStatus, NodeExecution, NodeStatus, ResultFingerprint, StateStore};
use flowcore_sandbox::Grant;
use flowcore_workflow::{plan, Edge, FailPolicy, WorkflowDefinition};
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::input::assemble_input;

/// One node's terminal-for-this-round outcome, fed back into the drain
/// loop's state machine.
struct NodeResult {
    node_id: NodeId,
    outcome: NodeExecutionResponse,
}

/// Runs the scheduler algorithm for one execution (§4.6). Generic over the
/// state store and node transport so tests can swap in in-memory/scripted
/// implementations without touching the algorithm.
pub struct Scheduler<S: StateStore, T: NodeTransport> {
    state_store: Arc<S>,
    dispatcher: Arc<Dispatcher<T>>,
    events: Arc<EventStream>,
    config: EngineConfig,
}

impl<S: StateStore + 'static, T: NodeTransport + 'static> Scheduler<S, T> {
    #[must_use]
    pub fn new(state_store: Arc<S>, dispatcher: Arc<Dispatcher<T>>, events: Arc<EventStream>, config: EngineConfig) -> Self {
        Self { state_store, dispatcher, events, config }
    }

    /// Run the full claim -> plan -> drain -> finalize algorithm for
    /// `execution_id`. Assumes the caller already performed the
    /// `Pending -> Running` CAS claim (§4.6 step 1) — this lets crash
    /// recovery re-enter the drain loop for an execution already `Running`
    /// without re-claiming it.
    #[instrument(skip(self, workflow), fields(execution_id = %execution_id))]
    pub async fn run(&self, execution_id: ExecutionId, workflow: &WorkflowDefinition) -> Result<(), EngineError> {
        let plan = match plan(workflow) {
            Ok(plan) => plan,
            Err(err) => {
                self.state_store.transition(
                    execution_id,
                    &[ExecutionStatus::Pending],
                    ExecutionStatus::Failed,
                    |execution| execution.error = Some(err.to_string()),
                )?;
                return Err(err.into());
            }
        };

        let snapshot = self.state_store.snapshot(execution_id)?;
        let fail_policy = self.config.fail_policy;
        let started_at = tokio::time::Instant::now();

        let mut remaining_deps: HashMap<NodeId, usize> =
            plan.dependencies.iter().map(|(node, deps)| (*node, deps.len())).collect();
        let mut ready: BTreeSet<NodeId> = plan.entry_nodes().into_iter().collect();
        let mut skipped: HashSet<NodeId> = HashSet::new();
        let mut running: JoinSet<NodeResult> = JoinSet::new();
        let mut fingerprint = ResultFingerprint::from_node_executions(&snapshot.nodes);

        self.events.publish(ProgressEvent::ExecutionStarted { execution_id });

        let mut total_progress = flowcore_execution::Progress {
            total: plan.node_count() as u32,
            ..Default::default()
        };

        // Crash recovery (§4.6.4): fold in whatever this execution already
        // persisted before reaching the fresh-start seeding above. A node
        // with no persisted record is untouched (fresh-start behaves as if
        // this block is a no-op).
        for record in &snapshot.nodes {
            match record.status {
                NodeStatus::Completed => {
                    ready.remove(&record.node_id);
                    total_progress.completed += 1;
                    self.resolve_dependents_of_completed(
                        execution_id,
                        &plan,
                        record.node_id,
                        fingerprint.get(record.node_id).cloned().unwrap_or_default(),
                        workflow,
                        &mut remaining_deps,
                        &mut ready,
                        &mut skipped,
                    )?;
                }
                NodeStatus::Failed => {
                    ready.remove(&record.node_id);
                    total_progress.failed += 1;
                }
                NodeStatus::Skipped => {
                    ready.remove(&record.node_id);
                    skipped.insert(record.node_id);
                }
                // A node still `Running` when the engine crashed is
                // redispatched from scratch; the dispatcher's idempotency
                // key makes a duplicate in-flight attempt harmless (§4.6.4).
                NodeStatus::Running => {
                    ready.insert(record.node_id);
                }
                NodeStatus::Pending | NodeStatus::Ready => {}
            }
        }

        let mut failed_terminally = snapshot.nodes.iter().any(|n| {
            n.status == NodeStatus::Failed && fail_policy == FailPolicy::FailFast
        });
        if failed_terminally {
            self.skip_all_pending(execution_id, &plan, &remaining_deps, &mut skipped)?;
            ready.clear();
        }
        let mut cancelled = false;
        let mut deadline_exceeded = false;

        'drain: loop {
            // The execution-wide deadline (§5, default 1h) is checked
            // alongside cancellation, at the top of each pass: in-flight
            // dispatches finish and are persisted as history, but no
            // further nodes are readied once it elapses.
            if !cancelled && !failed_terminally && !deadline_exceeded && started_at.elapsed() >= self.config.execution_deadline {
                warn!(execution_id = %execution_id, "execution deadline exceeded, failing");
                deadline_exceeded = true;
                ready.clear();
                self.skip_all_pending(execution_id, &plan, &remaining_deps, &mut skipped)?;
            }

            // Cancellation is cooperative (§4.6.3): checked at the top of
            // each pass through the loop, not mid-dispatch. In-flight
            // dispatches are left to finish — their results are persisted
            // as history but no longer drive further scheduling.
            if !cancelled && !failed_terminally && !deadline_exceeded && self.state_store.snapshot(execution_id)?.execution.cancel_requested {
                cancelled = true;
                ready.clear();
                self.skip_all_pending(execution_id, &plan, &remaining_deps, &mut skipped)?;
            }

            while !cancelled && running.len() < self.config.max_concurrency_per_execution && !ready.is_empty() {
                let node_id = *ready.iter().next().expect("checked non-empty");
                ready.remove(&node_id);

                let mut node = self.load_or_init_node(execution_id, &plan, node_id)?;
                node.transition(NodeStatus::Ready).map_err(EngineError::StateStore)?;
                node.transition(NodeStatus::Running).map_err(EngineError::StateStore)?;

                let input = assemble_input(node_id, workflow, &fingerprint, &snapshot.execution);
                let input = match input {
                    Ok(input) => input,
                    Err(err) => {
                        node.fail(err.to_string()).map_err(EngineError::StateStore)?;
                        self.state_store.upsert_node(node)?;
                        self.propagate_skip(execution_id, &plan, node_id, &mut skipped, &mut remaining_deps, &mut ready)?;
                        total_progress.failed += 1;
                        continue;
                    }
                };

                node.input = input.clone();
                self.state_store.upsert_node(node.clone())?;
                total_progress.running += 1;
                self.events.publish(ProgressEvent::NodeStarted { execution_id, node_id });

                let (node_type, parameters) = node_definition_of(workflow, node_id);
                let dispatcher = self.dispatcher.clone();
                let attempt = node.attempt;
                running.spawn(async move {
                    // No workflow-model field grants per-node capabilities yet
                    // (the DAG Analyzer's node model doesn't carry one), so
                    // every invocation runs under the deny-by-default grant
                    // until one is added.
                    let outcome = dispatcher
                        .dispatch(execution_id, node_id, node_type, parameters, input, Grant::none())
                        .await;
                    debug_assert!(matches!(&outcome,
                        NodeExecutionResponse::Completed { attempt: a, .. } | NodeExecutionResponse::Failed { attempt: a, .. }
                        if *a >= attempt));
                    NodeResult { node_id, outcome }
                });
            }

            if running.is_empty() && ready.is_empty() {
                break 'drain;
            }

            let Some(joined) = running.join_next().await else {
                break 'drain;
            };
            let NodeResult { node_id, outcome } = joined.expect("node task does not panic across the join boundary");
            total_progress.running = total_progress.running.saturating_sub(1);

            match outcome {
                NodeExecutionResponse::Completed { output, .. } => {
                    let mut node = self.load_or_init_node(execution_id, &plan, node_id)?;
                    node.complete(output.clone()).map_err(EngineError::StateStore)?;
                    self.state_store.upsert_node(node)?;
                    fingerprint.record(node_id, output.clone());
                    total_progress.completed += 1;
                    self.events.publish(ProgressEvent::NodeCompleted {
                        execution_id,
                        node_id,
                        output_hash: output_hash(&output),
                    });

                    // A cancelled execution keeps this result as history but
                    // stops using it to unblock dependents (§4.6.3).
                    for dependent in (!cancelled).then(|| plan.dependents.get(&node_id).cloned().unwrap_or_default()).unwrap_or_default() {
                        if skipped.contains(&dependent) {
                            continue;
                        }
                        let gated = edge_condition_blocks(workflow, node_id, dependent, &output);
                        if gated {
                            skipped.insert(dependent);
                            remaining_deps.remove(&dependent);
                            self.mark_skipped(execution_id, &plan, dependent)?;
                            self.propagate_skip(execution_id, &plan, dependent, &mut skipped, &mut remaining_deps, &mut ready)?;
                            continue;
                        }
                        if let Some(count) = remaining_deps.get_mut(&dependent) {
                            *count = count.saturating_sub(1);
                            if *count == 0 {
                                ready.insert(dependent);
                            }
                        }
                    }
                }
                NodeExecutionResponse::Failed { error, .. } => {
                    let mut node = self.load_or_init_node(execution_id, &plan, node_id)?;
                    node.fail(error.to_string()).map_err(EngineError::StateStore)?;
                    self.state_store.upsert_node(node)?;
                    total_progress.failed += 1;
                    self.events.publish(ProgressEvent::NodeFailed {
                        execution_id,
                        node_id,
                        error_kind: error.kind().to_string(),
                    });

                    if !cancelled {
                        match fail_policy {
                            FailPolicy::FailFast => {
                                warn!(%node_id, %error, "fail-fast: aborting execution");
                                ready.clear();
                                self.skip_all_pending(execution_id, &plan, &remaining_deps, &mut skipped)?;
                                failed_terminally = true;
                                break 'drain;
                            }
                            FailPolicy::Continue => {
                                self.propagate_skip(execution_id, &plan, node_id, &mut skipped, &mut remaining_deps, &mut ready)?;
                            }
                        }
                    }
                }
            }

            total_progress.skipped = skipped.len() as u32;
            self.state_store.patch_execution(execution_id, |execution| {
                execution.progress = total_progress;
            })?;
        }

        total_progress.skipped = skipped.len() as u32;
        let final_status = if cancelled {
            ExecutionStatus::Cancelled
        } else if failed_terminally || deadline_exceeded {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };
        self.state_store.transition(execution_id, &[ExecutionStatus::Running], final_status, |execution| {
            execution.progress = total_progress;
            if deadline_exceeded {
                execution.error = Some(EngineError::DeadlineExceeded(execution_id).to_string());
            }
        })?;
        self.events.publish(ProgressEvent::ExecutionCompleted {
            execution_id,
            status: format!("{final_status}"),
        });
        info!(?final_status, "execution finalized");
        Ok(())
    }

    fn load_or_init_node(
        &self,
        execution_id: ExecutionId,
        plan: &flowcore_workflow::Plan,
        node_id: NodeId,
    ) -> Result<NodeExecution, EngineError> {
        let history = self.state_store.snapshot(execution_id)?.nodes;
        if let Some(existing) = history.into_iter().find(|n| n.node_id == node_id) {
            return Ok(existing);
        }
        Ok(NodeExecution::new(
            execution_id,
            node_id,
            plan.dependencies.get(&node_id).cloned().unwrap_or_default(),
            plan.dependents.get(&node_id).cloned().unwrap_or_default(),
        ))
    }

    /// Recovery-time counterpart of the completed-node branch in the drain
    /// loop's match arm: decrements `remaining_deps` for `node_id`'s
    /// dependents and gates them against edge conditions, without emitting
    /// progress events (the engine crashed before or after this node
    /// finished; a replay of `NodeCompleted` to subscribers would be
    /// misleading, so recovery stays silent and lets `getStatus` answer
    /// queries going forward).
    #[allow(clippy::too_many_arguments)]
    fn resolve_dependents_of_completed(
        &self,
        execution_id: ExecutionId,
        plan: &flowcore_workflow::Plan,
        node_id: NodeId,
        output: serde_json::Value,
        workflow: &WorkflowDefinition,
        remaining_deps: &mut HashMap<NodeId, usize>,
        ready: &mut BTreeSet<NodeId>,
        skipped: &mut HashSet<NodeId>,
    ) -> Result<(), EngineError> {
        for dependent in plan.dependents.get(&node_id).cloned().unwrap_or_default() {
            if skipped.contains(&dependent) {
                continue;
            }
            if edge_condition_blocks(workflow, node_id, dependent, &output) {
                skipped.insert(dependent);
                remaining_deps.remove(&dependent);
                self.mark_skipped(execution_id, plan, dependent)?;
                self.propagate_skip(execution_id, plan, dependent, skipped, remaining_deps, ready)?;
                continue;
            }
            if let Some(count) = remaining_deps.get_mut(&dependent) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.insert(dependent);
                }
            }
        }
        Ok(())
    }

    fn mark_skipped(&self, execution_id: ExecutionId, plan: &flowcore_workflow::Plan, node_id: NodeId) -> Result<(), EngineError> {
        let mut node = self.load_or_init_node(execution_id, plan, node_id)?;
        if node.status == NodeStatus::Pending {
            node.transition(NodeStatus::Skipped).map_err(EngineError::StateStore)?;
            self.state_store.upsert_node(node)?;
            self.events.publish(ProgressEvent::NodeSkipped { execution_id, node_id });
        }
        Ok(())
    }

    /// Transitively skip every not-yet-dispatched descendant of `node_id`,
    /// persisting a `Skipped` record for each (§4.6's fail-fast and
    /// continue paths both use this).
    fn propagate_skip(
        &self,
        execution_id: ExecutionId,
        plan: &flowcore_workflow::Plan,
        node_id: NodeId,
        skipped: &mut HashSet<NodeId>,
        remaining_deps: &mut HashMap<NodeId, usize>,
        ready: &mut BTreeSet<NodeId>,
    ) -> Result<(), EngineError> {
        let mut stack = vec![node_id];
        while let Some(current) = stack.pop() {
            for dependent in plan.dependents.get(&current).cloned().unwrap_or_default() {
                if skipped.insert(dependent) {
                    ready.remove(&dependent);
                    remaining_deps.remove(&dependent);
                    self.mark_skipped(execution_id, plan, dependent)?;
                    stack.push(dependent);
                }
            }
        }
        Ok(())
    }

    fn skip_all_pending(
        &self,
        execution_id: ExecutionId,
        plan: &flowcore_workflow::Plan,
        remaining_deps: &HashMap<NodeId, usize>,
        skipped: &mut HashSet<NodeId>,
    ) -> Result<(), EngineError> {
        for node_id in remaining_deps.keys() {
            if skipped.insert(*node_id) {
                self.mark_skipped(execution_id, plan, *node_id)?;
            }
        }
        Ok(())
    }
}

fn node_definition_of(workflow: &WorkflowDefinition, node_id: NodeId) -> (String, serde_json::Value) {
    workflow
        .nodes
        .iter()
        .find(|n| n.id == node_id)
        .map(|n| (n.node_type.clone(), serde_json::Value::Object(n.parameters.clone())))
        .unwrap_or_default()
}

fn edge_condition_blocks(workflow: &WorkflowDefinition, source: NodeId, target: NodeId, output: &serde_json::Value) -> bool {
    workflow
        .edges
        .iter()
        .filter(|edge: &&Edge| edge.source == source && edge.target == target)
        .any(|edge| edge.condition.as_ref().is_some_and(|c| !c.evaluate(output)))
}
