#![forbid(unsafe_code)]

//! Workflow DAG model and the DAG Analyzer (C1).
//!
//! Defines the read-only [`WorkflowDefinition`] the engine receives in an
//! `ExecuteWorkflow` job, and [`graph::plan`], which validates the graph and
//! computes the topological layering the scheduler uses to seed its initial
//! ready-set. Node inputs/outputs stay opaque JSON here; only the edge
//! condition evaluator (`ConditionOperator`) introspects them, through a
//! restricted operator set.

pub mod error;
pub mod graph;
pub mod model;

pub use error::WorkflowError;
pub use graph::{plan, Plan};
pub use model::{ConditionOperator, Edge, EdgeCondition, FailPolicy, NodeDefinition, WorkflowDefinition};
