//! The read-only workflow definition: nodes, edges, and edge conditions.

use std::collections::HashMap;

use flowcore_core::{NodeId, WorkflowId};
use serde::{Deserialize, Serialize};

/// One vertex of the workflow DAG. Opaque to the core beyond its `id` and
/// `node_type` — `parameters` are interpreted only by the node handler that
/// `node_type` selects in the runner's registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeDefinition {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub credentials_ref: Option<String>,
}

impl NodeDefinition {
    #[must_use]
    pub fn new(id: NodeId, node_type: impl Into<String>) -> Self {
        Self {
            id,
            node_type: node_type.into(),
            parameters: serde_json::Map::new(),
            credentials_ref: None,
        }
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: serde_json::Map<String, serde_json::Value>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// The comparison operators an edge condition may use (§4.6.2). Conditions
/// are evaluated against the source node's output and never cause a retry —
/// a false condition skips the dependent, it does not fail it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    Regex,
}

/// A condition gating an edge: `field` is a dot-path into the source node's
/// output, evaluated with `operator` against `value`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeCondition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: serde_json::Value,
}

impl EdgeCondition {
    /// Evaluate this condition against a source node's output.
    ///
    /// Returns `false` (not an error) if `field` is absent from `output` —
    /// a missing field simply fails `equals`/`contains`/etc. the same way an
    /// absent value would.
    #[must_use]
    pub fn evaluate(&self, output: &serde_json::Value) -> bool {
        let Some(actual) = lookup_field(output, &self.field) else {
            return false;
        };

        match self.operator {
            ConditionOperator::Equals => actual == &self.value,
            ConditionOperator::NotEquals => actual != &self.value,
            ConditionOperator::Contains => contains(actual, &self.value),
            ConditionOperator::NotContains => !contains(actual, &self.value),
            ConditionOperator::GreaterThan => compare_numeric(actual, &self.value, |a, b| a > b),
            ConditionOperator::LessThan => compare_numeric(actual, &self.value, |a, b| a < b),
            ConditionOperator::Regex => match (actual.as_str(), self.value.as_str()) {
                (Some(s), Some(pattern)) => regex::Regex::new(pattern)
                    .map(|re| re.is_match(s))
                    .unwrap_or(false),
                _ => false,
            },
        }
    }
}

fn lookup_field<'a>(value: &'a serde_json::Value, field: &str) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for segment in field.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn contains(actual: &serde_json::Value, needle: &serde_json::Value) -> bool {
    match actual {
        serde_json::Value::Array(items) => items.contains(needle),
        serde_json::Value::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        _ => false,
    }
}

fn compare_numeric(a: &serde_json::Value, b: &serde_json::Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

/// One edge of the workflow DAG: "output of `source` feeds input of
/// `target`". `source_output`/`target_input` name the handles being
/// connected when a node has more than one output/input slot; `None` means
/// "pass the whole value".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub source_output: Option<String>,
    #[serde(default)]
    pub target_input: Option<String>,
    #[serde(default)]
    pub condition: Option<EdgeCondition>,
}

impl Edge {
    #[must_use]
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self {
            source,
            target,
            source_output: None,
            target_input: None,
            condition: None,
        }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: EdgeCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    #[must_use]
    pub fn with_handles(mut self, source_output: Option<String>, target_input: Option<String>) -> Self {
        self.source_output = source_output;
        self.target_input = target_input;
        self
    }
}

/// The strategy applied on the first fatal node error (§4.6, Glossary).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FailPolicy {
    #[default]
    FailFast,
    Continue,
}

/// A workflow the user designed: a DAG of nodes and edges. Read-only within
/// an execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub version: u32,
    pub nodes: Vec<NodeDefinition>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
}

impl WorkflowDefinition {
    #[must_use]
    pub fn new(id: WorkflowId, nodes: Vec<NodeDefinition>, edges: Vec<Edge>) -> Self {
        Self {
            id,
            version: 1,
            nodes,
            edges,
            variables: HashMap::new(),
        }
    }
}
