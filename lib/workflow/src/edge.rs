//! Edge types for workflow graphs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The branch a condition node takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchHandle {
    Yes,
    No,
}

impl BranchHandle {
    /// Maps a condition result to its branch.
    #[must_use]
    pub fn from_bool(value: bool) -> Self {
        if value { Self::Yes } else { Self::No }
    }

    /// Returns the handle name used by the editor.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

impl fmt::Display for BranchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed connection between two nodes, as stored by the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEdge {
    /// Editor-assigned edge id; not used for routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Branch handle on condition nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<BranchHandle>,
}

impl WorkflowEdge {
    /// Creates an unconditional edge.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: None,
            source: source.into(),
            target: target.into(),
            source_handle: None,
        }
    }

    /// Creates an edge taken when the source condition yields `handle`.
    #[must_use]
    pub fn branch(
        source: impl Into<String>,
        handle: BranchHandle,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source_handle: Some(handle),
            ..Self::new(source, target)
        }
    }
}
