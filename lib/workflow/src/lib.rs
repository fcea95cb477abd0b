//! Workflow domain model for the miniflow execution engine.
//!
//! This crate provides:
//!
//! - **Graph model**: nodes, edges and the DAG built from them (petgraph)
//! - **Parameters**: declared parameter specs and their extraction rules
//! - **Scripts**: global and workspace-scoped executables
//! - **Triggers**: input mappings and their validation
//! - **Execution state**: executions, per-node work-items and results
//! - **Errors**: the engine-wide error taxonomy

pub mod edge;
pub mod error;
pub mod execution;
pub mod graph;
pub mod node;
pub mod param;
pub mod resource;
pub mod script;
pub mod status;
pub mod trigger;

pub use edge::Edge;
pub use error::{EngineError, GraphError};
pub use execution::{Execution, ExecutionInput, ExecutionOutput, NodeResult, ResultMap};
pub use graph::WorkflowDag;
pub use node::{Node, ScriptRef, Workflow};
pub use param::{ParamEntry, ParamSpec};
pub use status::{ExecutionStatus, NodeRunStatus};
pub use trigger::{Trigger, TriggerField, TriggerFieldType};
