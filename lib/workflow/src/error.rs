//! Error types for the engine core.
//!
//! `EngineError` is the engine-wide taxonomy: every layer above the store
//! speaks it. The first three kinds are caller errors and are never retried;
//! the remaining kinds are operational and carry their own retry
//! disposition. `GraphError` covers graph construction, which happens before
//! an execution exists.

use miniflow_core::{ExecutionId, NodeId};
use std::fmt;

/// Engine-wide error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed parameter, coercion failure, unknown reference kind, bad
    /// path, or a cross-workspace reference. Surfaced to the caller, never
    /// retried.
    InvalidInput {
        field: Option<String>,
        message: String,
    },
    /// A referenced record is missing. Same disposition as `InvalidInput`.
    ResourceNotFound { resource: &'static str, id: String },
    /// A trigger- or workflow-level constraint was violated.
    BusinessRuleViolation { message: String },
    /// Database query or transaction failure. Transient by default.
    Database { message: String },
    /// The worker queue rejected a batch after all submit attempts.
    EngineSubmission { payload_count: usize, attempts: u32 },
    /// Context construction failed for a single execution input. The input
    /// stays queued and is retried on a later tick.
    ContextBuild {
        input_id: String,
        message: String,
    },
    /// A worker result could not be ingested after all attempts.
    ResultProcessing {
        execution_id: Option<ExecutionId>,
        node_id: Option<NodeId>,
        attempts: u32,
        message: String,
    },
}

impl EngineError {
    /// Shorthand for an `InvalidInput` naming a parameter or field.
    #[must_use]
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Shorthand for an `InvalidInput` without a field.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: None,
            message: message.into(),
        }
    }

    /// Shorthand for a missing record.
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl fmt::Display) -> Self {
        Self::ResourceNotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Wraps a database-layer error.
    #[must_use]
    pub fn database(err: impl fmt::Display) -> Self {
        Self::Database {
            message: err.to_string(),
        }
    }

    /// Returns true if a retry may succeed.
    ///
    /// Caller errors never become valid by retrying; database and ingestion
    /// failures might.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database { .. } | Self::EngineSubmission { .. } | Self::ResultProcessing { .. }
        )
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput {
                field: Some(field),
                message,
            } => {
                write!(f, "invalid input '{field}': {message}")
            }
            Self::InvalidInput {
                field: None,
                message,
            } => {
                write!(f, "invalid input: {message}")
            }
            Self::ResourceNotFound { resource, id } => {
                write!(f, "{resource} not found: {id}")
            }
            Self::BusinessRuleViolation { message } => {
                write!(f, "business rule violation: {message}")
            }
            Self::Database { message } => write!(f, "database error: {message}"),
            Self::EngineSubmission {
                payload_count,
                attempts,
            } => {
                write!(
                    f,
                    "engine submission failed for {payload_count} payloads after {attempts} attempts"
                )
            }
            Self::ContextBuild { input_id, message } => {
                write!(f, "context build failed for {input_id}: {message}")
            }
            Self::ResultProcessing {
                execution_id,
                node_id,
                attempts,
                message,
            } => {
                write!(f, "result processing failed after {attempts} attempts")?;
                if let Some(execution_id) = execution_id {
                    write!(f, " (execution {execution_id}")?;
                    if let Some(node_id) = node_id {
                        write!(f, ", node {node_id}")?;
                    }
                    write!(f, ")")?;
                }
                write!(f, ": {message}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

/// Errors from workflow graph construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// An edge references a node that is not part of the workflow.
    UnknownNode { node_id: NodeId },
    /// An edge connects a node to itself.
    SelfLoop { node_id: NodeId },
    /// The same `(from, to)` pair appears more than once.
    DuplicateEdge { from: NodeId, to: NodeId },
    /// The edges form a cycle; workflows must be DAGs.
    CycleDetected,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNode { node_id } => {
                write!(f, "edge references unknown node: {node_id}")
            }
            Self::SelfLoop { node_id } => {
                write!(f, "self-loop on node: {node_id}")
            }
            Self::DuplicateEdge { from, to } => {
                write!(f, "duplicate edge: {from} -> {to}")
            }
            Self::CycleDetected => write!(f, "workflow graph contains a cycle"),
        }
    }
}

impl std::error::Error for GraphError {}

impl From<GraphError> for EngineError {
    fn from(e: GraphError) -> Self {
        Self::BusinessRuleViolation {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_display_names_field() {
        let err = EngineError::invalid_input("timeout", "cannot convert to integer");
        assert!(err.to_string().contains("'timeout'"));
    }

    #[test]
    fn not_found_display() {
        let id = ExecutionId::new();
        let err = EngineError::not_found("execution", id);
        assert!(err.to_string().contains("execution not found"));
        assert!(err.to_string().contains("EXE-"));
    }

    #[test]
    fn retryability() {
        assert!(!EngineError::invalid("bad").is_retryable());
        assert!(!EngineError::not_found("variable", "x").is_retryable());
        assert!(EngineError::database("deadlock detected").is_retryable());
        assert!(
            EngineError::EngineSubmission {
                payload_count: 3,
                attempts: 3
            }
            .is_retryable()
        );
    }

    #[test]
    fn graph_error_converts_to_business_rule() {
        let node_id = NodeId::new();
        let err: EngineError = GraphError::SelfLoop { node_id }.into();
        assert!(matches!(err, EngineError::BusinessRuleViolation { .. }));
    }
}
