//! Workflow executions stored in PostgreSQL.
//!
//! Claims are a single conditional `UPDATE ... RETURNING`: the row is only
//! returned when its lease is free and its state allows the claim, so two
//! workers racing for the same execution cannot both win. Each claim stores a
//! fresh `claim_id`; saves and releases are conditional on it.

use super::{corrupt, store_error};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use leadflow_core::{ClaimId, ExecutionId, TenantId, WorkflowId};
use leadflow_workflow::{
    ClaimPurpose, Claimed, ExecutionStatus, ExecutionStore, NodeId, StoreError,
    WorkflowExecution,
};
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, instrument};

const COLUMNS: &str = "id, workflow_id, tenant_id, status, trigger_data, current_node_id, \
     execution_path, node_outputs, resume_at, error_message, created_at, started_at, \
     updated_at, finished_at";

const LEASE_FREE: &str = "(claimed_until IS NULL OR claimed_until <= $2)";

const RUNNABLE: &str = "(status = 'pending' OR (status IN ('running', 'processing_ai') \
     AND (resume_at IS NULL OR resume_at <= $2)))";

/// State predicate for a claim; `$2` is the claim time.
fn claim_predicate(purpose: ClaimPurpose) -> &'static str {
    match purpose {
        ClaimPurpose::Run => RUNNABLE,
        ClaimPurpose::Approve => "status = 'waiting_approval'",
        ClaimPurpose::Cancel => "status NOT IN ('completed', 'failed', 'cancelled')",
    }
}

/// Row type for execution queries.
#[derive(FromRow)]
struct ExecutionRow {
    id: String,
    workflow_id: String,
    tenant_id: String,
    status: String,
    trigger_data: serde_json::Value,
    current_node_id: Option<String>,
    execution_path: serde_json::Value,
    node_outputs: serde_json::Value,
    resume_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl ExecutionRow {
    fn try_into_execution(self) -> Result<WorkflowExecution, StoreError> {
        let id = ExecutionId::from_str(&self.id).map_err(|e| corrupt(&self.id, e.to_string()))?;
        let workflow_id = WorkflowId::from_str(&self.workflow_id)
            .map_err(|e| corrupt(&self.id, e.to_string()))?;
        let tenant_id =
            TenantId::from_str(&self.tenant_id).map_err(|e| corrupt(&self.id, e.to_string()))?;
        let status = ExecutionStatus::from_str_value(&self.status)
            .ok_or_else(|| corrupt(&self.id, format!("unknown status '{}'", self.status)))?;
        let execution_path: Vec<NodeId> = serde_json::from_value(self.execution_path)
            .map_err(|e| corrupt(&self.id, format!("execution_path: {e}")))?;
        let node_outputs: BTreeMap<NodeId, serde_json::Value> =
            serde_json::from_value(self.node_outputs)
                .map_err(|e| corrupt(&self.id, format!("node_outputs: {e}")))?;

        Ok(WorkflowExecution {
            id,
            workflow_id,
            tenant_id,
            status,
            trigger_data: self.trigger_data,
            current_node_id: self.current_node_id.map(NodeId::from),
            execution_path,
            node_outputs,
            resume_at: self.resume_at,
            error_message: self.error_message,
            created_at: self.created_at,
            started_at: self.started_at,
            updated_at: self.updated_at,
            finished_at: self.finished_at,
        })
    }
}

fn to_json<T: serde::Serialize>(
    id: ExecutionId,
    value: &T,
) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| corrupt(&id.to_string(), e.to_string()))
}

/// Error for a save that matched no row under its claim.
fn save_rejected(execution_id: ExecutionId, exists: bool) -> StoreError {
    if exists {
        StoreError::ClaimLost { execution_id }
    } else {
        StoreError::ExecutionNotFound { execution_id }
    }
}

fn to_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Execution store backed by the `workflow_executions` table.
#[derive(Debug, Clone)]
pub struct PgExecutionStore {
    pool: PgPool,
}

impl PgExecutionStore {
    /// Creates a new store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionStore for PgExecutionStore {
    #[instrument(skip_all, fields(execution_id = %execution.id))]
    async fn create(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions
                (id, workflow_id, tenant_id, status, trigger_data, current_node_id,
                 execution_path, node_outputs, resume_at, error_message, created_at,
                 started_at, updated_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(execution.tenant_id.to_string())
        .bind(execution.status.as_str())
        .bind(&execution.trigger_data)
        .bind(execution.current_node_id.as_ref().map(NodeId::as_str))
        .bind(to_json(execution.id, &execution.execution_path)?)
        .bind(to_json(execution.id, &execution.node_outputs)?)
        .bind(execution.resume_at)
        .bind(&execution.error_message)
        .bind(execution.created_at)
        .bind(execution.started_at)
        .bind(execution.updated_at)
        .bind(execution.finished_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn get(&self, id: ExecutionId) -> Result<Option<WorkflowExecution>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM workflow_executions WHERE id = $1");
        let row: Option<ExecutionRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.map(ExecutionRow::try_into_execution).transpose()
    }

    async fn list_for_workflow(
        &self,
        workflow_id: WorkflowId,
        limit: usize,
    ) -> Result<Vec<WorkflowExecution>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM workflow_executions WHERE workflow_id = $1 \
             ORDER BY created_at DESC, seq DESC LIMIT $2"
        );
        let rows: Vec<ExecutionRow> = sqlx::query_as(&sql)
            .bind(workflow_id.to_string())
            .bind(to_limit(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rows.into_iter()
            .map(ExecutionRow::try_into_execution)
            .collect()
    }

    #[instrument(skip(self, lease), fields(execution_id = %id))]
    async fn claim(
        &self,
        id: ExecutionId,
        purpose: ClaimPurpose,
        now: DateTime<Utc>,
        lease: TimeDelta,
    ) -> Result<Option<Claimed>, StoreError> {
        let claim_id = ClaimId::new();
        let clear_resume = purpose == ClaimPurpose::Run;
        let sql = format!(
            "UPDATE workflow_executions \
             SET claimed_until = $3, claim_id = $5, \
                 resume_at = CASE WHEN $4 THEN NULL ELSE resume_at END \
             WHERE id = $1 AND {LEASE_FREE} AND {predicate} \
             RETURNING {COLUMNS}",
            predicate = claim_predicate(purpose),
        );
        let row: Option<ExecutionRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .bind(now)
            .bind(now + lease)
            .bind(clear_resume)
            .bind(claim_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        debug!(claimed = row.is_some(), "claim attempted");
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Claimed {
            claim_id,
            execution: row.try_into_execution()?,
        }))
    }

    #[instrument(skip_all, fields(execution_id = %execution.id, status = %execution.status))]
    async fn save(
        &self,
        execution: &WorkflowExecution,
        claim_id: ClaimId,
        lease_until: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $2, current_node_id = $3, execution_path = $4, node_outputs = $5,
                resume_at = $6, error_message = $7, started_at = $8, updated_at = $9,
                finished_at = $10, claimed_until = $12
            WHERE id = $1 AND claim_id = $11
            "#,
        )
        .bind(execution.id.to_string())
        .bind(execution.status.as_str())
        .bind(execution.current_node_id.as_ref().map(NodeId::as_str))
        .bind(to_json(execution.id, &execution.execution_path)?)
        .bind(to_json(execution.id, &execution.node_outputs)?)
        .bind(execution.resume_at)
        .bind(&execution.error_message)
        .bind(execution.started_at)
        .bind(execution.updated_at)
        .bind(execution.finished_at)
        .bind(claim_id.to_string())
        .bind(lease_until)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }
        let exists: Option<(bool,)> =
            sqlx::query_as("SELECT TRUE FROM workflow_executions WHERE id = $1")
                .bind(execution.id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;
        Err(save_rejected(execution.id, exists.is_some()))
    }

    async fn release(&self, id: ExecutionId, claim_id: ClaimId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE workflow_executions
            SET claimed_until = NULL, claim_id = NULL
            WHERE id = $1 AND claim_id = $2
            "#,
        )
        .bind(id.to_string())
        .bind(claim_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn list_due_for_resume(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ExecutionId>, StoreError> {
        // The shared predicates read the scan time from `$2`.
        let sql = format!(
            "SELECT id FROM workflow_executions \
             WHERE {LEASE_FREE} AND {RUNNABLE} \
             ORDER BY COALESCE(resume_at, created_at), seq \
             LIMIT $1"
        );
        let rows: Vec<(String,)> = sqlx::query_as(&sql)
            .bind(to_limit(limit))
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rows.into_iter()
            .map(|(id,)| ExecutionId::from_str(&id).map_err(|e| corrupt(&id, e.to_string())))
            .collect()
    }

    async fn request_cancel(&self, id: ExecutionId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET cancel_requested = TRUE
            WHERE id = $1 AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_cancel_requested(&self, id: ExecutionId) -> Result<bool, StoreError> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT cancel_requested FROM workflow_executions WHERE id = $1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;
        Ok(row.is_some_and(|(requested,)| requested))
    }
}
