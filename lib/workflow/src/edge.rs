//! Edges: directed precedence between nodes of one workflow.

use miniflow_core::{EdgeId, NodeId, WorkflowId};
use serde::{Deserialize, Serialize};

/// A directed edge from one node to another within a workflow.
///
/// The target node becomes eligible only after the source node has a
/// successful output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique identifier.
    pub id: EdgeId,
    /// The workflow this edge belongs to.
    pub workflow_id: WorkflowId,
    /// The upstream node.
    pub from_node_id: NodeId,
    /// The downstream node.
    pub to_node_id: NodeId,
}

impl Edge {
    /// Creates a new edge.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, from_node_id: NodeId, to_node_id: NodeId) -> Self {
        Self {
            id: EdgeId::new(),
            workflow_id,
            from_node_id,
            to_node_id,
        }
    }
}
