//! Workflow graph implementation using petgraph.
//!
//! The stored definition is parsed into a `DiGraph` whose edge weights are
//! the optional branch handles. Building the graph is where every
//! definition error is caught; a built graph always has exactly one entry
//! (a trigger) and no cycles, which together mean every node is reachable.

use crate::definition::Workflow;
use crate::edge::BranchHandle;
use crate::error::GraphError;
use crate::node::{NodeId, WorkflowNode};
use petgraph::Direction;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

/// A parsed, validated workflow graph.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    graph: DiGraph<WorkflowNode, Option<BranchHandle>>,
    /// Map from NodeId to petgraph's NodeIndex for O(1) lookup.
    node_index_map: HashMap<NodeId, NodeIndex>,
    entry: NodeIndex,
}

impl WorkflowGraph {
    /// Parses and validates a workflow definition.
    ///
    /// # Errors
    ///
    /// Returns the first definition error found.
    pub fn build(workflow: &Workflow) -> Result<Self, GraphError> {
        let mut graph = DiGraph::with_capacity(workflow.nodes.len(), workflow.edges.len());
        let mut node_index_map = HashMap::with_capacity(workflow.nodes.len());

        for definition in &workflow.nodes {
            let node = WorkflowNode::try_from(definition)?;
            if node_index_map.contains_key(&node.id) {
                return Err(GraphError::DuplicateNode { node_id: node.id });
            }
            let id = node.id.clone();
            let index = graph.add_node(node);
            node_index_map.insert(id, index);
        }

        for edge in &workflow.edges {
            let lookup = |id: &str| {
                node_index_map
                    .get(id)
                    .copied()
                    .ok_or_else(|| GraphError::DanglingEdge {
                        source: edge.source.clone(),
                        target: edge.target.clone(),
                        missing: id.to_string(),
                    })
            };
            let source = lookup(&edge.source)?;
            let target = lookup(&edge.target)?;
            graph.add_edge(source, target, edge.source_handle);
        }

        for index in graph.node_indices() {
            let mut seen = HashSet::new();
            for edge in graph.edges_directed(index, Direction::Outgoing) {
                if !seen.insert(*edge.weight()) {
                    return Err(GraphError::AmbiguousEdges {
                        node_id: graph[index].id.clone(),
                    });
                }
            }
        }

        if is_cyclic_directed(&graph) {
            return Err(GraphError::CycleDetected);
        }

        let entries: Vec<NodeIndex> = graph
            .node_indices()
            .filter(|&idx| {
                graph
                    .edges_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .collect();
        let entry = match entries.as_slice() {
            [] => return Err(GraphError::NoEntryNode),
            [entry] => *entry,
            many => {
                return Err(GraphError::MultipleEntryNodes {
                    node_ids: many.iter().map(|&idx| graph[idx].id.clone()).collect(),
                });
            }
        };
        if !graph[entry].is_trigger() {
            return Err(GraphError::EntryNotTrigger {
                node_id: graph[entry].id.clone(),
            });
        }
        if let Some(stray) = graph
            .node_indices()
            .find(|&idx| idx != entry && graph[idx].is_trigger())
        {
            return Err(GraphError::MisplacedTrigger {
                node_id: graph[stray].id.clone(),
            });
        }

        Ok(Self {
            graph,
            node_index_map,
            entry,
        })
    }

    /// Returns the trigger node every run starts from.
    #[must_use]
    pub fn entry(&self) -> &WorkflowNode {
        &self.graph[self.entry]
    }

    /// Returns a node by id.
    #[must_use]
    pub fn node(&self, node_id: &str) -> Option<&WorkflowNode> {
        let index = self.node_index_map.get(node_id)?;
        self.graph.node_weight(*index)
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the node to run after `current`.
    ///
    /// With a handle, only the edge carrying that handle is followed; an
    /// unwired branch yields `None`. Without one, the unconditional edge is
    /// preferred, falling back to the sole outgoing edge.
    #[must_use]
    pub fn next(&self, current: &str, handle: Option<BranchHandle>) -> Option<&NodeId> {
        let index = *self.node_index_map.get(current)?;
        let mut outgoing = self.graph.edges_directed(index, Direction::Outgoing);

        let edge = match handle {
            Some(handle) => outgoing.find(|e| *e.weight() == Some(handle)),
            None => {
                let edges: Vec<_> = outgoing.collect();
                match edges.iter().find(|e| e.weight().is_none()) {
                    Some(plain) => Some(*plain),
                    None if edges.len() == 1 => edges.first().copied(),
                    None => None,
                }
            }
        }?;

        Some(&self.graph[edge.target()].id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::NodeDefinition;
    use crate::edge::WorkflowEdge;
    use crate::trigger::TriggerType;
    use leadflow_core::TenantId;
    use serde_json::json;

    fn workflow(nodes: Vec<NodeDefinition>, edges: Vec<WorkflowEdge>) -> Workflow {
        let mut workflow = Workflow::new(TenantId::new(), "graph test", TriggerType::LeadCreated);
        workflow.nodes = nodes;
        workflow.edges = edges;
        workflow
    }

    fn trigger(id: &str) -> NodeDefinition {
        NodeDefinition::new(id, "trigger", json!({}))
    }

    fn action(id: &str) -> NodeDefinition {
        NodeDefinition::new(id, "action", json!({"actionType": "send_email"}))
    }

    fn condition(id: &str) -> NodeDefinition {
        NodeDefinition::new(
            id,
            "condition",
            json!({"field": "x", "operator": "equals", "value": "1"}),
        )
    }

    #[test]
    fn builds_linear_graph() {
        let graph = WorkflowGraph::build(&workflow(
            vec![action("a"), trigger("t")],
            vec![WorkflowEdge::new("t", "a")],
        ))
        .unwrap();

        assert_eq!(graph.entry().id.as_str(), "t");
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.next("t", None).map(NodeId::as_str), Some("a"));
        assert_eq!(graph.next("a", None), None);
        assert_eq!(graph.next("ghost", None), None);
    }

    #[test]
    fn condition_follows_matching_handle_only() {
        let graph = WorkflowGraph::build(&workflow(
            vec![trigger("t"), condition("c"), action("yes-action")],
            vec![
                WorkflowEdge::new("t", "c"),
                WorkflowEdge::branch("c", BranchHandle::Yes, "yes-action"),
            ],
        ))
        .unwrap();

        assert_eq!(
            graph.next("c", Some(BranchHandle::Yes)).map(NodeId::as_str),
            Some("yes-action")
        );
        assert_eq!(graph.next("c", Some(BranchHandle::No)), None);
    }

    #[test]
    fn plain_edge_preferred_without_handle() {
        let graph = WorkflowGraph::build(&workflow(
            vec![trigger("t"), action("plain"), action("tagged")],
            vec![
                WorkflowEdge::branch("t", BranchHandle::Yes, "tagged"),
                WorkflowEdge::new("t", "plain"),
            ],
        ))
        .unwrap();
        assert_eq!(graph.next("t", None).map(NodeId::as_str), Some("plain"));
    }

    #[test]
    fn sole_tagged_edge_is_followed_without_handle() {
        let graph = WorkflowGraph::build(&workflow(
            vec![trigger("t"), action("a")],
            vec![WorkflowEdge::branch("t", BranchHandle::No, "a")],
        ))
        .unwrap();
        assert_eq!(graph.next("t", None).map(NodeId::as_str), Some("a"));
    }

    #[test]
    fn rejects_dangling_edge() {
        let err = WorkflowGraph::build(&workflow(
            vec![trigger("t")],
            vec![WorkflowEdge::new("t", "ghost")],
        ))
        .unwrap_err();
        assert!(matches!(err, GraphError::DanglingEdge { missing, .. } if missing == "ghost"));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = WorkflowGraph::build(&workflow(vec![trigger("t"), action("t")], vec![]))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::DuplicateNode {
                node_id: NodeId::from("t")
            }
        );
    }

    #[test]
    fn rejects_cycles() {
        let err = WorkflowGraph::build(&workflow(
            vec![trigger("t"), action("a"), action("b")],
            vec![
                WorkflowEdge::new("t", "a"),
                WorkflowEdge::new("a", "b"),
                WorkflowEdge::new("b", "a"),
            ],
        ))
        .unwrap_err();
        assert_eq!(err, GraphError::CycleDetected);
    }

    #[test]
    fn rejects_bad_entries() {
        assert_eq!(
            WorkflowGraph::build(&workflow(vec![], vec![])).unwrap_err(),
            GraphError::NoEntryNode
        );

        let err = WorkflowGraph::build(&workflow(vec![trigger("t"), action("orphan")], vec![]))
            .unwrap_err();
        assert!(matches!(err, GraphError::MultipleEntryNodes { node_ids } if node_ids.len() == 2));

        let err = WorkflowGraph::build(&workflow(
            vec![action("a"), action("b")],
            vec![WorkflowEdge::new("a", "b")],
        ))
        .unwrap_err();
        assert_eq!(
            err,
            GraphError::EntryNotTrigger {
                node_id: NodeId::from("a")
            }
        );

        let err = WorkflowGraph::build(&workflow(
            vec![trigger("t"), trigger("t2")],
            vec![WorkflowEdge::new("t", "t2")],
        ))
        .unwrap_err();
        assert_eq!(
            err,
            GraphError::MisplacedTrigger {
                node_id: NodeId::from("t2")
            }
        );
    }

    #[test]
    fn rejects_ambiguous_fan_out() {
        let err = WorkflowGraph::build(&workflow(
            vec![trigger("t"), action("a"), action("b")],
            vec![WorkflowEdge::new("t", "a"), WorkflowEdge::new("t", "b")],
        ))
        .unwrap_err();
        assert_eq!(
            err,
            GraphError::AmbiguousEdges {
                node_id: NodeId::from("t")
            }
        );
    }

    #[test]
    fn node_errors_surface_from_build() {
        let err = WorkflowGraph::build(&workflow(
            vec![trigger("t"), NodeDefinition::new("x", "webhook_in", json!({}))],
            vec![WorkflowEdge::new("t", "x")],
        ))
        .unwrap_err();
        assert!(matches!(err, GraphError::UnknownNodeType { .. }));
    }
}
