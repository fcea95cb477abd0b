//! The workflow DAG, built from node and edge records.
//!
//! The launcher uses it to compute per-node in-degrees (the initial
//! `dependency_count` of each work-item) and to reject malformed graphs
//! before anything is written.

use crate::edge::Edge;
use crate::error::GraphError;
use crate::node::Node;
use miniflow_core::NodeId;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// A validated workflow DAG.
#[derive(Debug, Clone)]
pub struct WorkflowDag {
    graph: DiGraph<NodeId, ()>,
    node_to_index: HashMap<NodeId, NodeIndex>,
}

impl WorkflowDag {
    /// Builds a DAG from node and edge records.
    ///
    /// # Errors
    ///
    /// Returns an error when an edge references an unknown node, connects a
    /// node to itself, duplicates another edge, or when the edges form a
    /// cycle.
    pub fn from_records(nodes: &[Node], edges: &[Edge]) -> Result<Self, GraphError> {
        let mut graph = DiGraph::new();
        let mut node_to_index = HashMap::new();

        for node in nodes {
            let idx = graph.add_node(node.id);
            node_to_index.insert(node.id, idx);
        }

        let mut seen = HashSet::new();
        for edge in edges {
            if edge.from_node_id == edge.to_node_id {
                return Err(GraphError::SelfLoop {
                    node_id: edge.from_node_id,
                });
            }
            if !seen.insert((edge.from_node_id, edge.to_node_id)) {
                return Err(GraphError::DuplicateEdge {
                    from: edge.from_node_id,
                    to: edge.to_node_id,
                });
            }

            let from = *node_to_index
                .get(&edge.from_node_id)
                .ok_or(GraphError::UnknownNode {
                    node_id: edge.from_node_id,
                })?;
            let to = *node_to_index
                .get(&edge.to_node_id)
                .ok_or(GraphError::UnknownNode {
                    node_id: edge.to_node_id,
                })?;
            graph.add_edge(from, to, ());
        }

        if petgraph::algo::is_cyclic_directed(&graph) {
            return Err(GraphError::CycleDetected);
        }

        Ok(Self {
            graph,
            node_to_index,
        })
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the in-degree of a node, or 0 for unknown nodes.
    #[must_use]
    pub fn in_degree(&self, node_id: NodeId) -> usize {
        let Some(&idx) = self.node_to_index.get(&node_id) else {
            return 0;
        };
        self.graph.edges_directed(idx, Direction::Incoming).count()
    }

    /// Returns the in-degree of every node.
    ///
    /// This is the initial `dependency_count` of each execution input.
    #[must_use]
    pub fn in_degree_map(&self) -> HashMap<NodeId, u32> {
        self.node_to_index
            .keys()
            .map(|&id| (id, self.in_degree(id) as u32))
            .collect()
    }

    /// Returns nodes with no incoming edges (the initially-ready set).
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<NodeId> {
        self.nodes_with_degree(Direction::Incoming)
    }

    /// Returns nodes with no outgoing edges (completing one of these can
    /// finish the execution).
    #[must_use]
    pub fn terminal_nodes(&self) -> Vec<NodeId> {
        self.nodes_with_degree(Direction::Outgoing)
    }

    /// Returns the direct successors of a node.
    #[must_use]
    pub fn successors(&self, node_id: NodeId) -> Vec<NodeId> {
        let Some(&idx) = self.node_to_index.get(&node_id) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, Direction::Outgoing)
            .filter_map(|n| self.graph.node_weight(n).copied())
            .collect()
    }

    fn nodes_with_degree(&self, direction: Direction) -> Vec<NodeId> {
        self.graph
            .node_indices()
            .filter(|&idx| self.graph.edges_directed(idx, direction).count() == 0)
            .filter_map(|idx| self.graph.node_weight(idx).copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniflow_core::{ScriptId, WorkflowId};

    fn make_node(workflow_id: WorkflowId, name: &str) -> Node {
        Node::new(workflow_id, name, ScriptId::new())
    }

    fn diamond() -> (WorkflowId, Vec<Node>, Vec<Edge>, [NodeId; 4]) {
        let workflow_id = WorkflowId::new();
        let a = make_node(workflow_id, "A");
        let b = make_node(workflow_id, "B");
        let c = make_node(workflow_id, "C");
        let d = make_node(workflow_id, "D");
        let ids = [a.id, b.id, c.id, d.id];

        let edges = vec![
            Edge::new(workflow_id, ids[0], ids[1]),
            Edge::new(workflow_id, ids[0], ids[2]),
            Edge::new(workflow_id, ids[1], ids[3]),
            Edge::new(workflow_id, ids[2], ids[3]),
        ];

        (workflow_id, vec![a, b, c, d], edges, ids)
    }

    #[test]
    fn empty_workflow_builds() {
        let dag = WorkflowDag::from_records(&[], &[]).expect("should build");
        assert_eq!(dag.node_count(), 0);
        assert!(dag.entry_nodes().is_empty());
    }

    #[test]
    fn diamond_in_degrees() {
        let (_, nodes, edges, [a, b, c, d]) = diamond();
        let dag = WorkflowDag::from_records(&nodes, &edges).expect("should build");

        let degrees = dag.in_degree_map();
        assert_eq!(degrees[&a], 0);
        assert_eq!(degrees[&b], 1);
        assert_eq!(degrees[&c], 1);
        assert_eq!(degrees[&d], 2);

        assert_eq!(dag.entry_nodes(), vec![a]);
        assert_eq!(dag.terminal_nodes(), vec![d]);
    }

    #[test]
    fn successors_of_fork() {
        let (_, nodes, edges, [a, b, c, _]) = diamond();
        let dag = WorkflowDag::from_records(&nodes, &edges).expect("should build");

        let succs = dag.successors(a);
        assert_eq!(succs.len(), 2);
        assert!(succs.contains(&b));
        assert!(succs.contains(&c));
    }

    #[test]
    fn rejects_self_loop() {
        let workflow_id = WorkflowId::new();
        let a = make_node(workflow_id, "A");
        let edges = vec![Edge::new(workflow_id, a.id, a.id)];

        let err = WorkflowDag::from_records(&[a], &edges).unwrap_err();
        assert!(matches!(err, GraphError::SelfLoop { .. }));
    }

    #[test]
    fn rejects_duplicate_edge() {
        let workflow_id = WorkflowId::new();
        let a = make_node(workflow_id, "A");
        let b = make_node(workflow_id, "B");
        let edges = vec![
            Edge::new(workflow_id, a.id, b.id),
            Edge::new(workflow_id, a.id, b.id),
        ];

        let err = WorkflowDag::from_records(&[a, b], &edges).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateEdge { .. }));
    }

    #[test]
    fn rejects_unknown_node() {
        let workflow_id = WorkflowId::new();
        let a = make_node(workflow_id, "A");
        let ghost = NodeId::new();
        let edges = vec![Edge::new(workflow_id, a.id, ghost)];

        let err = WorkflowDag::from_records(&[a], &edges).unwrap_err();
        assert!(matches!(err, GraphError::UnknownNode { node_id } if node_id == ghost));
    }

    #[test]
    fn rejects_cycle() {
        let workflow_id = WorkflowId::new();
        let a = make_node(workflow_id, "A");
        let b = make_node(workflow_id, "B");
        let c = make_node(workflow_id, "C");
        let edges = vec![
            Edge::new(workflow_id, a.id, b.id),
            Edge::new(workflow_id, b.id, c.id),
            Edge::new(workflow_id, c.id, a.id),
        ];

        let err = WorkflowDag::from_records(&[a, b, c], &edges).unwrap_err();
        assert_eq!(err, GraphError::CycleDetected);
    }
}
