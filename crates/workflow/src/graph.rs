//! The DAG Analyzer: validates a workflow's graph and computes the
//! topological layering the scheduler uses to seed its ready-set.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use flowcore_core::NodeId;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::WorkflowError;
use crate::model::WorkflowDefinition;

/// The output of [`plan`]: adjacency maps plus a topological layering.
///
/// `layers` groups nodes by longest-path-from-root so every node in a layer
/// may run fully in parallel; it seeds the scheduler's initial ready-set
/// only — the scheduler itself advances nodes via `dependencies`/`dependents`
/// as results arrive, not by marching through `layers`.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub layers: Vec<Vec<NodeId>>,
    pub dependencies: HashMap<NodeId, Vec<NodeId>>,
    pub dependents: HashMap<NodeId, Vec<NodeId>>,
}

impl Plan {
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<NodeId> {
        self.layers.first().cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn exit_nodes(&self) -> Vec<NodeId> {
        self.dependents
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(&id, _)| id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.dependencies.len()
    }
}

/// Validate `workflow`'s graph and compute its execution plan.
///
/// Fails with [`WorkflowError::EmptyGraph`] if there are no nodes,
/// [`WorkflowError::DanglingEdge`] if an edge names an unknown node, and
/// [`WorkflowError::CycleDetected`] if Kahn's algorithm terminates with
/// unvisited nodes.
pub fn plan(workflow: &WorkflowDefinition) -> Result<Plan, WorkflowError> {
    if workflow.nodes.is_empty() {
        return Err(WorkflowError::EmptyGraph);
    }

    let mut graph: DiGraph<NodeId, ()> = DiGraph::with_capacity(workflow.nodes.len(), workflow.edges.len());
    let mut index_of: HashMap<NodeId, NodeIndex> = HashMap::with_capacity(workflow.nodes.len());
    for node in &workflow.nodes {
        index_of.insert(node.id, graph.add_node(node.id));
    }

    for edge in &workflow.edges {
        let &source = index_of.get(&edge.source).ok_or(WorkflowError::DanglingEdge(edge.source))?;
        let &target = index_of.get(&edge.target).ok_or(WorkflowError::DanglingEdge(edge.target))?;
        graph.add_edge(source, target, ());
    }

    let layers = kahn_layers(&graph)?;

    let mut dependencies: HashMap<NodeId, Vec<NodeId>> = HashMap::with_capacity(workflow.nodes.len());
    let mut dependents: HashMap<NodeId, Vec<NodeId>> = HashMap::with_capacity(workflow.nodes.len());
    for &index in index_of.values() {
        let id = graph[index];
        let mut deps: Vec<NodeId> = graph.neighbors_directed(index, Direction::Incoming).map(|i| graph[i]).collect();
        let mut dents: Vec<NodeId> = graph.neighbors_directed(index, Direction::Outgoing).map(|i| graph[i]).collect();
        deps.sort();
        deps.dedup();
        dents.sort();
        dents.dedup();
        dependencies.insert(id, deps);
        dependents.insert(id, dents);
    }

    Ok(Plan {
        layers,
        dependencies,
        dependents,
    })
}

/// Kahn's algorithm over the petgraph `DiGraph`, grouping nodes into layers
/// by longest path from a root. Within a layer, ties are broken
/// lexicographically by node id so replay is deterministic. `petgraph`'s
/// `is_cyclic_directed`/`toposort` report only *that* a cycle exists, not
/// the layering this crate needs to seed the scheduler's ready-set, so this
/// walks incoming-edge counts directly instead of calling into `algo::*`.
fn kahn_layers(graph: &DiGraph<NodeId, ()>) -> Result<Vec<Vec<NodeId>>, WorkflowError> {
    // Dedup neighbors up front: a workflow that names the same edge twice
    // shouldn't make its target wait on two units of in-degree for one
    // actual predecessor.
    let predecessors: HashMap<NodeIndex, BTreeSet<NodeIndex>> = graph
        .node_indices()
        .map(|idx| (idx, graph.neighbors_directed(idx, Direction::Incoming).collect()))
        .collect();
    let successors: HashMap<NodeIndex, BTreeSet<NodeIndex>> = graph
        .node_indices()
        .map(|idx| (idx, graph.neighbors_directed(idx, Direction::Outgoing).collect()))
        .collect();

    let mut remaining: HashMap<NodeIndex, usize> =
        predecessors.iter().map(|(&idx, preds)| (idx, preds.len())).collect();

    let mut layers = Vec::new();
    let mut visited = 0usize;

    loop {
        let mut ready: BTreeMap<NodeId, NodeIndex> = BTreeMap::new();
        for (&idx, &count) in &remaining {
            if count == 0 {
                ready.insert(graph[idx], idx);
            }
        }
        if ready.is_empty() {
            break;
        }

        let layer: Vec<NodeId> = ready.keys().copied().collect();
        for &idx in ready.values() {
            remaining.remove(&idx);
            visited += 1;
            for dependent in &successors[&idx] {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                }
            }
        }
        layers.push(layer);
    }

    if visited != graph.node_count() {
        let stuck: Vec<NodeId> = remaining.keys().map(|&idx| graph[idx]).collect::<BTreeSet<_>>().into_iter().collect();
        return Err(WorkflowError::CycleDetected(stuck));
    }

    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Edge, NodeDefinition, WorkflowDefinition};
    use flowcore_core::WorkflowId;
    use rstest::rstest;

    fn wf(nodes: Vec<NodeDefinition>, edges: Vec<Edge>) -> WorkflowDefinition {
        WorkflowDefinition::new(WorkflowId::v4(), nodes, edges)
    }

    fn node(id: NodeId) -> NodeDefinition {
        NodeDefinition::new(id, "noop")
    }

    #[test]
    fn empty_graph_rejected() {
        let w = wf(vec![], vec![]);
        assert_eq!(plan(&w).unwrap_err(), WorkflowError::EmptyGraph);
    }

    #[test]
    fn single_node_is_one_layer() {
        let a = NodeId::v4();
        let w = wf(vec![node(a)], vec![]);
        let p = plan(&w).unwrap();
        assert_eq!(p.layers, vec![vec![a]]);
        assert_eq!(p.entry_nodes(), vec![a]);
        assert_eq!(p.exit_nodes(), vec![a]);
    }

    #[test]
    fn linear_chain_has_three_layers() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let c = NodeId::v4();
        let w = wf(vec![node(a), node(b), node(c)], vec![Edge::new(a, b), Edge::new(b, c)]);
        let p = plan(&w).unwrap();
        assert_eq!(p.layers.len(), 3);
        assert_eq!(p.dependencies[&b], vec![a]);
        assert_eq!(p.dependents[&a], vec![b]);
    }

    #[test]
    fn diamond_has_two_nodes_in_middle_layer() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let c = NodeId::v4();
        let d = NodeId::v4();
        let w = wf(
            vec![node(a), node(b), node(c), node(d)],
            vec![Edge::new(a, b), Edge::new(a, c), Edge::new(b, d), Edge::new(c, d)],
        );
        let p = plan(&w).unwrap();
        assert_eq!(p.layers.len(), 3);
        assert_eq!(p.layers[1].len(), 2);
        assert_eq!(p.exit_nodes(), vec![d]);
    }

    #[test]
    fn two_disconnected_components() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let w = wf(vec![node(a), node(b)], vec![]);
        let p = plan(&w).unwrap();
        assert_eq!(p.layers.len(), 1);
        assert_eq!(p.layers[0].len(), 2);
    }

    #[test]
    fn cycle_is_rejected() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let w = wf(vec![node(a), node(b)], vec![Edge::new(a, b), Edge::new(b, a)]);
        assert!(matches!(plan(&w), Err(WorkflowError::CycleDetected(_))));
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let a = NodeId::v4();
        let ghost = NodeId::v4();
        let w = wf(vec![node(a)], vec![Edge::new(a, ghost)]);
        assert_eq!(plan(&w).unwrap_err(), WorkflowError::DanglingEdge(ghost));
    }

    #[rstest]
    #[case(1)]
    #[case(50)]
    fn fan_in_dependency_counts(#[case] n: usize) {
        let root = NodeId::v4();
        let mut nodes = vec![node(root)];
        let mut edges = vec![];
        for _ in 0..n {
            let dep = NodeId::v4();
            nodes.push(node(dep));
            edges.push(Edge::new(dep, root));
        }
        let w = wf(nodes, edges);
        let p = plan(&w).unwrap();
        assert_eq!(p.dependencies[&root].len(), n);
    }

    #[test]
    fn fan_out_of_100_children() {
        let root = NodeId::v4();
        let mut nodes = vec![node(root)];
        let mut edges = vec![];
        for _ in 0..100 {
            let child = NodeId::v4();
            nodes.push(node(child));
            edges.push(Edge::new(root, child));
        }
        let w = wf(nodes, edges);
        let p = plan(&w).unwrap();
        assert_eq!(p.dependents[&root].len(), 100);
        assert_eq!(p.layers[0], vec![root]);
        assert_eq!(p.layers[1].len(), 100);
    }

    #[test]
    fn lexicographic_ordering_within_layer() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let w = wf(vec![node(a), node(b)], vec![]);
        let p = plan(&w).unwrap();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(p.layers[0], expected);
    }
}
