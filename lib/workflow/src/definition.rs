//! Workflow definition types.
//!
//! A workflow is stored exactly as the visual editor saves it: node `type`
//! is a plain string and node `data` is free-form JSON. The engine parses it
//! into a [`WorkflowGraph`](crate::graph::WorkflowGraph) when a run starts,
//! so a malformed definition fails that run rather than the load.

use crate::edge::WorkflowEdge;
use crate::trigger::TriggerType;
use chrono::{DateTime, Utc};
use leadflow_core::{TenantId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Being edited; cannot run.
    #[default]
    Draft,
    /// Accepting trigger events.
    Active,
    /// Temporarily not accepting trigger events.
    Paused,
    /// Disabled after repeated failures.
    Error,
}

impl WorkflowStatus {
    /// Returns the string representation for database storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }

    /// Parses from database string representation.
    #[must_use]
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// A node as stored by the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Identifier, unique within the workflow.
    pub id: String,
    /// Node type name (`trigger`, `action`, `condition`, `ai_processor`, `delay`).
    #[serde(rename = "type")]
    pub node_type: String,
    /// Type-specific payload.
    #[serde(default)]
    pub data: JsonValue,
}

impl NodeDefinition {
    /// Creates a node definition.
    #[must_use]
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, data: JsonValue) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data,
        }
    }
}

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier for this workflow.
    pub id: WorkflowId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Human-readable name.
    pub name: String,
    /// Description of what this workflow does.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: WorkflowStatus,
    /// The event that starts this workflow.
    pub trigger_type: TriggerType,
    /// Nodes, in no particular order.
    pub nodes: Vec<NodeDefinition>,
    /// Edges, in no particular order.
    pub edges: Vec<WorkflowEdge>,
    /// When this workflow was created.
    pub created_at: DateTime<Utc>,
    /// When this workflow was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Creates an empty draft workflow.
    #[must_use]
    pub fn new(tenant_id: TenantId, name: impl Into<String>, trigger_type: TriggerType) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::new(),
            tenant_id,
            name: name.into(),
            description: None,
            status: WorkflowStatus::Draft,
            trigger_type,
            nodes: Vec::new(),
            edges: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = status;
        self
    }

    /// Adds a node.
    #[must_use]
    pub fn with_node(mut self, node: NodeDefinition) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds an edge.
    #[must_use]
    pub fn with_edge(mut self, edge: WorkflowEdge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Returns whether the workflow may be started.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == WorkflowStatus::Active
    }
}
