//! Error types for the workflow crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `GraphError`: The stored definition cannot be run
//! - `NodeError`: A node executor failed (classified transient/permanent)
//! - `StoreError`: Persistence failures from an execution or workflow store
//! - `EngineError`: Engine operations, returned as `Report<EngineError>`

use crate::node::NodeId;
use leadflow_ai::AiError;
use leadflow_core::{ExecutionId, WorkflowId};
use leadflow_integration::DispatchError;
use std::fmt;
use std::time::Duration;

/// Errors found while parsing a stored definition into a graph.
///
/// All of these are definition errors: the run fails at start and is never
/// retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Two nodes share an id.
    DuplicateNode { node_id: NodeId },
    /// Node `type` is not one the engine can run.
    UnknownNodeType { node_id: NodeId, node_type: String },
    /// Node `data` does not match its type.
    InvalidNodeData { node_id: NodeId, reason: String },
    /// An edge references a node that does not exist.
    DanglingEdge {
        source: String,
        target: String,
        missing: String,
    },
    /// More than one outgoing edge shares the same branch handle.
    AmbiguousEdges { node_id: NodeId },
    /// The graph contains a cycle.
    CycleDetected,
    /// No node lacks incoming edges.
    NoEntryNode,
    /// More than one node lacks incoming edges.
    MultipleEntryNodes { node_ids: Vec<NodeId> },
    /// The entry node is not a trigger.
    EntryNotTrigger { node_id: NodeId },
    /// A trigger node appears somewhere other than the entry.
    MisplacedTrigger { node_id: NodeId },
    /// A node cannot be reached from the entry.
    UnreachableNode { node_id: NodeId },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateNode { node_id } => write!(f, "duplicate node id: {node_id}"),
            Self::UnknownNodeType { node_id, node_type } => {
                write!(f, "node {node_id} has unknown type '{node_type}'")
            }
            Self::InvalidNodeData { node_id, reason } => {
                write!(f, "node {node_id} has invalid data: {reason}")
            }
            Self::DanglingEdge {
                source,
                target,
                missing,
            } => {
                write!(
                    f,
                    "edge {source} -> {target} references missing node {missing}"
                )
            }
            Self::AmbiguousEdges { node_id } => {
                write!(f, "node {node_id} has more than one edge for the same branch")
            }
            Self::CycleDetected => write!(f, "graph contains cycles"),
            Self::NoEntryNode => write!(f, "graph has no entry node"),
            Self::MultipleEntryNodes { node_ids } => {
                let ids: Vec<&str> = node_ids.iter().map(NodeId::as_str).collect();
                write!(f, "graph has multiple entry nodes: {}", ids.join(", "))
            }
            Self::EntryNotTrigger { node_id } => {
                write!(f, "entry node {node_id} is not a trigger")
            }
            Self::MisplacedTrigger { node_id } => {
                write!(f, "trigger node {node_id} is not the entry node")
            }
            Self::UnreachableNode { node_id } => {
                write!(f, "node {node_id} is unreachable from the trigger")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors from running a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The AI collaborator failed.
    Ai(AiError),
    /// The action dispatcher failed.
    Dispatch(DispatchError),
    /// An attempt exceeded the per-attempt timeout.
    AttemptTimedOut { after: Duration },
    /// The node's resolved input cannot be executed.
    InvalidInput { reason: String },
}

impl NodeError {
    /// Returns whether retrying the node may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Ai(e) => e.is_transient(),
            Self::Dispatch(e) => e.is_transient(),
            Self::AttemptTimedOut { .. } => true,
            Self::InvalidInput { .. } => false,
        }
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ai(e) => write!(f, "AI call failed: {e}"),
            Self::Dispatch(e) => write!(f, "action dispatch failed: {e}"),
            Self::AttemptTimedOut { after } => {
                write!(f, "attempt timed out after {}ms", after.as_millis())
            }
            Self::InvalidInput { reason } => write!(f, "invalid input: {reason}"),
        }
    }
}

impl std::error::Error for NodeError {}

impl From<AiError> for NodeError {
    fn from(e: AiError) -> Self {
        Self::Ai(e)
    }
}

impl From<DispatchError> for NodeError {
    fn from(e: DispatchError) -> Self {
        Self::Dispatch(e)
    }
}

/// Errors from execution and workflow stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached.
    Unavailable { details: String },
    /// A query failed.
    QueryFailed { details: String },
    /// A stored record could not be decoded.
    CorruptRecord { id: String, details: String },
    /// The execution to update does not exist.
    ExecutionNotFound { execution_id: ExecutionId },
    /// The claim a write was made under is no longer held; another worker
    /// took the execution over after the lease expired.
    ClaimLost { execution_id: ExecutionId },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { details } => write!(f, "store unavailable: {details}"),
            Self::QueryFailed { details } => write!(f, "store query failed: {details}"),
            Self::CorruptRecord { id, details } => {
                write!(f, "stored record {id} is corrupt: {details}")
            }
            Self::ExecutionNotFound { execution_id } => {
                write!(f, "execution not found: {execution_id}")
            }
            Self::ClaimLost { execution_id } => {
                write!(f, "claim on execution {execution_id} was lost")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from engine operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Workflow not found.
    WorkflowNotFound { workflow_id: WorkflowId },
    /// Workflow exists but may not be started.
    WorkflowNotActive {
        workflow_id: WorkflowId,
        status: String,
    },
    /// Execution not found.
    ExecutionNotFound { execution_id: ExecutionId },
    /// A store operation failed; the execution keeps its last persisted state.
    Store(StoreError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkflowNotFound { workflow_id } => {
                write!(f, "workflow not found: {workflow_id}")
            }
            Self::WorkflowNotActive {
                workflow_id,
                status,
            } => {
                write!(f, "workflow {workflow_id} is {status}, not active")
            }
            Self::ExecutionNotFound { execution_id } => {
                write!(f, "execution not found: {execution_id}")
            }
            Self::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_display() {
        let err = GraphError::DanglingEdge {
            source: "t1".to_string(),
            target: "ghost".to_string(),
            missing: "ghost".to_string(),
        };
        assert!(err.to_string().contains("missing node ghost"));

        let err = GraphError::MultipleEntryNodes {
            node_ids: vec![NodeId::from("a"), NodeId::from("b")],
        };
        assert!(err.to_string().ends_with("a, b"));
    }

    #[test]
    fn node_error_classification() {
        assert!(NodeError::from(AiError::Timeout).is_transient());
        assert!(
            NodeError::AttemptTimedOut {
                after: Duration::from_secs(60)
            }
            .is_transient()
        );
        assert!(
            !NodeError::from(DispatchError::Unsupported {
                action_type: "webhook".to_string()
            })
            .is_transient()
        );
        assert!(
            !NodeError::InvalidInput {
                reason: "bad".to_string()
            }
            .is_transient()
        );
    }

    #[test]
    fn engine_error_display() {
        let workflow_id = WorkflowId::new();
        let err = EngineError::WorkflowNotFound { workflow_id };
        assert!(err.to_string().contains("workflow not found"));

        let err = EngineError::from(StoreError::Unavailable {
            details: "connection refused".to_string(),
        });
        assert!(err.to_string().contains("connection refused"));

        let execution_id = ExecutionId::new();
        let err = EngineError::from(StoreError::ClaimLost { execution_id });
        assert!(err.to_string().contains("was lost"));
    }
}
