//! HTTP API over the execution engine.

use crate::error::ApiError;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use leadflow_core::{ExecutionId, WorkflowId};
use leadflow_workflow::{ExecutionEngine, WorkflowExecution};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ExecutionEngine>,
}

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/workflows/{workflow_id}/executions",
            post(start_execution).get(list_executions),
        )
        .route("/api/executions/{execution_id}", get(get_execution))
        .route("/api/executions/{execution_id}/cancel", post(cancel_execution))
        .route(
            "/api/executions/{execution_id}/approve",
            post(approve_execution),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

fn parse_workflow_id(raw: &str) -> Result<WorkflowId, ApiError> {
    WorkflowId::from_str(raw).map_err(|_| ApiError::InvalidId {
        kind: "workflow",
        value: raw.to_string(),
    })
}

fn parse_execution_id(raw: &str) -> Result<ExecutionId, ApiError> {
    ExecutionId::from_str(raw).map_err(|_| ApiError::InvalidId {
        kind: "execution",
        value: raw.to_string(),
    })
}

/// Creates an execution and runs it in the background.
async fn start_execution(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Json(trigger_data): Json<JsonValue>,
) -> Result<(StatusCode, Json<JsonValue>), ApiError> {
    let workflow_id = parse_workflow_id(&workflow_id)?;
    let execution_id = state
        .engine
        .enqueue_execution(workflow_id, trigger_data)
        .await?;

    // If this task dies the scheduler picks the pending run up on its next scan.
    let engine = state.engine.clone();
    tokio::spawn(async move {
        if let Err(e) = engine.resume(execution_id).await {
            warn!(%execution_id, error = %e, "background execution failed");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "execution_id": execution_id.to_string() })),
    ))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

async fn list_executions(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<WorkflowExecution>>, ApiError> {
    let workflow_id = parse_workflow_id(&workflow_id)?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let executions = state.engine.list_executions(workflow_id, limit).await?;
    Ok(Json(executions))
}

async fn get_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<WorkflowExecution>, ApiError> {
    let execution_id = parse_execution_id(&execution_id)?;
    Ok(Json(state.engine.get_execution(execution_id).await?))
}

async fn cancel_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    let execution_id = parse_execution_id(&execution_id)?;
    let cancelled = state.engine.cancel(execution_id).await?;
    Ok(Json(json!({ "cancelled": cancelled })))
}

async fn approve_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<JsonValue>, ApiError> {
    let execution_id = parse_execution_id(&execution_id)?;
    match state.engine.approve(execution_id).await? {
        Some(status) => Ok(Json(json!({ "status": status }))),
        None => {
            let execution = state.engine.get_execution(execution_id).await?;
            Err(ApiError::Conflict {
                reason: format!(
                    "execution {execution_id} is {}, not waiting for approval",
                    execution.status
                ),
            })
        }
    }
}
