//! Workflow definitions stored in PostgreSQL.

use super::{corrupt, store_error};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadflow_core::{TenantId, WorkflowId};
use leadflow_workflow::{
    NodeDefinition, StoreError, TriggerType, Workflow, WorkflowEdge, WorkflowStatus, WorkflowStore,
};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use tracing::instrument;

/// Row type for workflow queries.
#[derive(FromRow)]
struct WorkflowRow {
    id: String,
    tenant_id: String,
    name: String,
    description: Option<String>,
    status: String,
    trigger_type: String,
    nodes: serde_json::Value,
    edges: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkflowRow {
    fn try_into_workflow(self) -> Result<Workflow, StoreError> {
        let id = WorkflowId::from_str(&self.id).map_err(|e| corrupt(&self.id, e.to_string()))?;
        let tenant_id =
            TenantId::from_str(&self.tenant_id).map_err(|e| corrupt(&self.id, e.to_string()))?;
        let status = WorkflowStatus::from_str_value(&self.status)
            .ok_or_else(|| corrupt(&self.id, format!("unknown status '{}'", self.status)))?;
        let trigger_type = TriggerType::from_str_value(&self.trigger_type).ok_or_else(|| {
            corrupt(
                &self.id,
                format!("unknown trigger type '{}'", self.trigger_type),
            )
        })?;
        // Node payloads stay raw here; the engine validates them per run.
        let nodes: Vec<NodeDefinition> = serde_json::from_value(self.nodes)
            .map_err(|e| corrupt(&self.id, format!("nodes: {e}")))?;
        let edges: Vec<WorkflowEdge> = serde_json::from_value(self.edges)
            .map_err(|e| corrupt(&self.id, format!("edges: {e}")))?;

        Ok(Workflow {
            id,
            tenant_id,
            name: self.name,
            description: self.description,
            status,
            trigger_type,
            nodes,
            edges,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Workflow store backed by the `workflows` table.
#[derive(Debug, Clone)]
pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    /// Creates a new store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    #[instrument(skip(self), fields(workflow_id = %id))]
    async fn get(&self, id: WorkflowId) -> Result<Option<Workflow>, StoreError> {
        let row: Option<WorkflowRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, name, description, status, trigger_type, nodes, edges,
                   created_at, updated_at
            FROM workflows
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(WorkflowRow::try_into_workflow).transpose()
    }
}
