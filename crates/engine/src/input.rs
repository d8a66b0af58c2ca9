//! Node input assembly (§4.6.1): outputs of immediate dependencies merged
//! with the execution's top-level input under the reserved key `$input`.

use std::collections::BTreeMap;

use flowcore_core::NodeId;
use flowcore_execution::{Execution, ExecutionError, ResultFingerprint};
use flowcore_workflow::{Edge, WorkflowDefinition};
use serde_json::Value;

const TOP_LEVEL_INPUT_KEY: &str = "$input";

/// Build the input for `node_id` from its incoming edges, the outputs
/// already recorded in `fingerprint`, and the execution's top-level input.
/// Merge order is deterministic (lexicographic by source node id, §4.6.1);
/// two edges writing the same target slot is a [`ExecutionError::DuplicateInputBinding`].
pub fn assemble_input(
    node_id: NodeId,
    workflow: &WorkflowDefinition,
    fingerprint: &ResultFingerprint,
    execution: &Execution,
) -> Result<Value, ExecutionError> {
    let mut incoming: Vec<&Edge> = workflow.edges.iter().filter(|edge| edge.target == node_id).collect();
    incoming.sort_by_key(|edge| edge.source);

    let mut slots: BTreeMap<String, Value> = BTreeMap::new();
    slots.insert(TOP_LEVEL_INPUT_KEY.to_string(), execution.input.clone());

    for edge in incoming {
        let Some(source_output) = fingerprint.get(edge.source) else {
            continue; // dependency skipped/not completed; handled by scheduler before dispatch
        };

        let value = match &edge.source_output {
            Some(field) => source_output.get(field).cloned().unwrap_or(Value::Null),
            None => source_output.clone(),
        };

        let slot_key = edge.target_input.clone().unwrap_or_else(|| edge.source.to_string());

        if slots.insert(slot_key.clone(), value).is_some() && slot_key != TOP_LEVEL_INPUT_KEY {
            return Err(ExecutionError::DuplicateInputBinding { node: node_id, slot: slot_key });
        }
    }

    Ok(Value::Object(slots.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcore_core::{ExecutionId, TenantId, WorkflowId};
    use flowcore_workflow::NodeDefinition;
    use serde_json::json;

    fn execution_with_input(input: Value) -> Execution {
        Execution::new(ExecutionId::v4(), WorkflowId::v4(), TenantId::v4(), input, "corr".into())
    }

    #[test]
    fn merges_top_level_input_and_dependency_outputs() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let workflow = WorkflowDefinition::new(
            WorkflowId::v4(),
            vec![NodeDefinition::new(a, "noop"), NodeDefinition::new(b, "noop")],
            vec![Edge::new(a, b)],
        );
        let mut fingerprint = ResultFingerprint::new();
        fingerprint.record(a, json!({"value": 42}));

        let execution = execution_with_input(json!({"tenant": "acme"}));
        let input = assemble_input(b, &workflow, &fingerprint, &execution).unwrap();

        assert_eq!(input["$input"], json!({"tenant": "acme"}));
        assert_eq!(input.get(a.to_string()).unwrap(), &json!({"value": 42}));
    }

    #[test]
    fn explicit_handles_map_field_to_named_slot() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let workflow = WorkflowDefinition::new(
            WorkflowId::v4(),
            vec![NodeDefinition::new(a, "noop"), NodeDefinition::new(b, "noop")],
            vec![Edge::new(a, b).with_handles(Some("value".into()), Some("amount".into()))],
        );
        let mut fingerprint = ResultFingerprint::new();
        fingerprint.record(a, json!({"value": 42, "extra": true}));

        let execution = execution_with_input(json!(null));
        let input = assemble_input(b, &workflow, &fingerprint, &execution).unwrap();
        assert_eq!(input["amount"], json!(42));
    }

    #[test]
    fn duplicate_target_slot_is_an_error() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let c = NodeId::v4();
        let workflow = WorkflowDefinition::new(
            WorkflowId::v4(),
            vec![NodeDefinition::new(a, "noop"), NodeDefinition::new(b, "noop"), NodeDefinition::new(c, "noop")],
            vec![
                Edge::new(a, c).with_handles(None, Some("slot".into())),
                Edge::new(b, c).with_handles(None, Some("slot".into())),
            ],
        );
        let mut fingerprint = ResultFingerprint::new();
        fingerprint.record(a, json!(1));
        fingerprint.record(b, json!(2));

        let execution = execution_with_input(json!(null));
        let err = assemble_input(c, &workflow, &fingerprint, &execution).unwrap_err();
        assert!(matches!(err, ExecutionError::DuplicateInputBinding { .. }));
    }
}
