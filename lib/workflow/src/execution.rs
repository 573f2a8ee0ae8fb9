//! Workflow execution state machine.
//!
//! ```text
//! pending -> running -> { processing_ai, waiting_approval } -> completed | failed | cancelled
//! ```
//!
//! A run suspended for a delay stays `running` with `resume_at` set.
//! `execution_path` only grows and `node_outputs` keys are never replaced,
//! so a persisted snapshot is also an audit trail.

use crate::node::NodeId;
use chrono::{DateTime, Utc};
use leadflow_core::{ExecutionId, TenantId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// The overall status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created, not yet picked up.
    Pending,
    /// Walking the graph, or suspended for a delay when `resume_at` is set.
    Running,
    /// Waiting on the AI collaborator.
    ProcessingAi,
    /// Paused until a human approves an action.
    WaitingApproval,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns the string representation for database storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ProcessingAi => "processing_ai",
            Self::WaitingApproval => "waiting_approval",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses from database string representation.
    #[must_use]
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "processing_ai" => Some(Self::ProcessingAi),
            "waiting_approval" => Some(Self::WaitingApproval),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One run of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub tenant_id: TenantId,
    pub status: ExecutionStatus,
    /// Event payload captured at start.
    pub trigger_data: JsonValue,
    /// Node to run next, or the node in flight. `None` once terminal.
    pub current_node_id: Option<NodeId>,
    /// Nodes visited, in order.
    pub execution_path: Vec<NodeId>,
    /// Output of each visited node.
    pub node_outputs: BTreeMap<NodeId, JsonValue>,
    /// Set only while suspended for a delay.
    pub resume_at: Option<DateTime<Utc>>,
    /// Set only on failure.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    /// Creates a new execution in pending state.
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        tenant_id: TenantId,
        trigger_data: JsonValue,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            workflow_id,
            tenant_id,
            status: ExecutionStatus::Pending,
            trigger_data,
            current_node_id: None,
            execution_path: Vec::new(),
            node_outputs: BTreeMap::new(),
            resume_at: None,
            error_message: None,
            created_at: now,
            started_at: None,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Returns whether the run is parked on a delay.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.status == ExecutionStatus::Running && self.resume_at.is_some()
    }

    /// Moves a pending run onto its entry node.
    pub fn start(&mut self, entry: NodeId, now: DateTime<Utc>) {
        self.status = ExecutionStatus::Running;
        self.current_node_id = Some(entry);
        self.started_at = Some(now);
        self.updated_at = now;
    }

    /// Marks the run as running again after a suspension or pause.
    pub fn wake(&mut self, now: DateTime<Utc>) {
        self.status = ExecutionStatus::Running;
        self.resume_at = None;
        self.updated_at = now;
    }

    /// Appends `node` to the path unless it is already the last entry.
    pub fn enter_node(&mut self, node: &NodeId, status: ExecutionStatus, now: DateTime<Utc>) {
        if self.execution_path.last() != Some(node) {
            self.execution_path.push(node.clone());
        }
        self.current_node_id = Some(node.clone());
        self.status = status;
        self.updated_at = now;
    }

    /// Returns whether `node` was entered but never produced an output.
    #[must_use]
    pub fn was_interrupted(&self, node: &NodeId) -> bool {
        self.execution_path.last() == Some(node) && !self.node_outputs.contains_key(node)
    }

    /// Records a node's output. An existing output is never replaced.
    pub fn record_output(&mut self, node: &NodeId, output: JsonValue, now: DateTime<Utc>) {
        self.node_outputs.entry(node.clone()).or_insert(output);
        self.updated_at = now;
    }

    /// Moves on to `next`.
    pub fn advance(&mut self, next: Option<NodeId>, now: DateTime<Utc>) {
        self.current_node_id = next;
        self.status = ExecutionStatus::Running;
        self.updated_at = now;
    }

    /// Parks the run until `resume_at`, continuing at `next`.
    pub fn suspend(&mut self, next: NodeId, resume_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.current_node_id = Some(next);
        self.resume_at = Some(resume_at);
        self.status = ExecutionStatus::Running;
        self.updated_at = now;
    }

    /// Pauses the run until approved, continuing at `next`.
    pub fn await_approval(&mut self, next: Option<NodeId>, now: DateTime<Utc>) {
        self.current_node_id = next;
        self.status = ExecutionStatus::WaitingApproval;
        self.updated_at = now;
    }

    /// Marks the run as completed.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.finish(ExecutionStatus::Completed, now);
    }

    /// Marks the run as failed.
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.error_message = Some(error.into());
        self.finish(ExecutionStatus::Failed, now);
    }

    /// Marks the run as cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.finish(ExecutionStatus::Cancelled, now);
    }

    fn finish(&mut self, status: ExecutionStatus, now: DateTime<Utc>) {
        self.status = status;
        self.current_node_id = None;
        self.resume_at = None;
        self.finished_at = Some(now);
        self.updated_at = now;
    }
}
