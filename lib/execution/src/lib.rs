//! Execution lifecycle for the miniflow execution engine.
//!
//! The [`ExecutionService`] is the public facade: it starts executions
//! (from a trigger or directly from a workflow), aborts them, and serves
//! the read queries. The topological expansion of a workflow into per-node
//! work-items lives in [`launcher`] as a pure function.

pub mod launcher;
pub mod service;

pub use launcher::plan_execution_inputs;
pub use service::{EndedExecution, ExecutionService, StartedExecution};
