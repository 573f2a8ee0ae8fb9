//! The execution engine.
//!
//! The engine drives one execution at a time through its graph:
//!
//! 1. Claim the execution (see [`ExecutionStore::claim`]). Every save is
//!    made under that claim and renews its lease; a worker whose lease was
//!    taken over gets [`StoreError::ClaimLost`] and stops.
//! 2. Parse the workflow; a definition error fails the run.
//! 3. Before each node, honour a pending cancellation.
//! 4. External-call nodes are appended to the path and persisted before the
//!    call, so a crash mid-call is detected on resume instead of repeated.
//! 5. Record the output, route to the next node, persist, loop.
//!
//! Delays and approvals end the loop by persisting and releasing the claim;
//! the scheduler (or an approval) picks the run up again later. A
//! cancellation requested while the claim was held is applied once it is
//! released.

use crate::error::{EngineError, NodeError, StoreError};
use crate::execution::{ExecutionStatus, WorkflowExecution};
use crate::executor::{NodeExecutors, NodeOutcome, SideEffect};
use crate::graph::WorkflowGraph;
use crate::node::NodeKind;
use crate::retry::RetryPolicy;
use crate::store::{ClaimPurpose, Claimed, ExecutionStore, WorkflowStore};
use chrono::TimeDelta;
use leadflow_ai::AiInvoker;
use leadflow_core::{ClaimId, Clock, ExecutionId, SystemClock, WorkflowId};
use leadflow_integration::ActionDispatcher;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retry policy for AI and action nodes.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// How long a claim stays valid after its last save.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    /// Model used by AI nodes that do not name one.
    #[serde(default = "default_model")]
    pub default_model: String,
}

fn default_lease_secs() -> u64 {
    15 * 60
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            lease_secs: default_lease_secs(),
            default_model: default_model(),
        }
    }
}

impl EngineConfig {
    /// Returns the claim lease.
    #[must_use]
    pub fn lease(&self) -> TimeDelta {
        TimeDelta::seconds(i64::try_from(self.lease_secs).unwrap_or(i64::MAX / 1000))
    }
}

/// Runs workflow executions.
pub struct ExecutionEngine {
    workflows: Arc<dyn WorkflowStore>,
    executions: Arc<dyn ExecutionStore>,
    executors: NodeExecutors,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("executors", &self.executors)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExecutionEngine {
    /// Creates an engine using the system clock.
    #[must_use]
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        executions: Arc<dyn ExecutionStore>,
        ai: Arc<dyn AiInvoker>,
        actions: Arc<dyn ActionDispatcher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            workflows,
            executions,
            executors: NodeExecutors::new(ai, actions, config.default_model.clone()),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Creates a pending execution without running it.
    ///
    /// # Errors
    ///
    /// Fails if the workflow is missing or not active, or the store fails.
    #[instrument(skip(self, trigger_data))]
    pub async fn enqueue_execution(
        &self,
        workflow_id: WorkflowId,
        trigger_data: JsonValue,
    ) -> Result<ExecutionId, Report<EngineError>> {
        let workflow = self
            .workflows
            .get(workflow_id)
            .await
            .map_err(EngineError::Store)?
            .ok_or(EngineError::WorkflowNotFound { workflow_id })?;
        if !workflow.is_active() {
            return Err(EngineError::WorkflowNotActive {
                workflow_id,
                status: workflow.status.as_str().to_string(),
            }
            .into());
        }

        let execution = WorkflowExecution::new(
            workflow_id,
            workflow.tenant_id,
            trigger_data,
            self.clock.now(),
        );
        self.executions
            .create(&execution)
            .await
            .map_err(EngineError::Store)?;

        info!(execution_id = %execution.id, "execution created");
        Ok(execution.id)
    }

    /// Creates an execution and runs it until it finishes or suspends.
    ///
    /// # Errors
    ///
    /// Fails if the workflow is missing or not active, or the store fails.
    /// Node failures do not error; they leave the execution `failed`.
    pub async fn start_execution(
        &self,
        workflow_id: WorkflowId,
        trigger_data: JsonValue,
    ) -> Result<ExecutionId, Report<EngineError>> {
        let execution_id = self.enqueue_execution(workflow_id, trigger_data).await?;
        self.resume(execution_id).await?;
        Ok(execution_id)
    }

    /// Runs an execution that is pending, due after a delay, or orphaned.
    ///
    /// Returns `None` when the execution is not due or another worker holds
    /// its claim.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails; the execution keeps its last
    /// persisted state.
    #[instrument(skip(self), fields(execution_id = %execution_id))]
    pub async fn resume(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<ExecutionStatus>, Report<EngineError>> {
        let claimed = self
            .executions
            .claim(
                execution_id,
                ClaimPurpose::Run,
                self.clock.now(),
                self.config.lease(),
            )
            .await
            .map_err(EngineError::Store)?;
        let Some(claimed) = claimed else {
            debug!("execution not claimable");
            return Ok(None);
        };

        Ok(Some(self.drive(claimed).await?))
    }

    /// Continues a run paused for approval.
    ///
    /// Returns `None` when the execution is not waiting for approval.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    #[instrument(skip(self), fields(execution_id = %execution_id))]
    pub async fn approve(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<ExecutionStatus>, Report<EngineError>> {
        let claimed = self
            .executions
            .claim(
                execution_id,
                ClaimPurpose::Approve,
                self.clock.now(),
                self.config.lease(),
            )
            .await
            .map_err(EngineError::Store)?;
        let Some(mut claimed) = claimed else {
            debug!("execution not waiting for approval");
            return Ok(None);
        };

        info!("execution approved");
        claimed.execution.wake(self.clock.now());
        Ok(Some(self.drive(claimed).await?))
    }

    /// Requests cancellation.
    ///
    /// An idle execution is cancelled immediately. One being run elsewhere
    /// is cancelled by that worker before its next node, or as soon as it
    /// releases its claim. Returns `false` if the execution is missing or
    /// already terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    #[instrument(skip(self), fields(execution_id = %execution_id))]
    pub async fn cancel(&self, execution_id: ExecutionId) -> Result<bool, Report<EngineError>> {
        let requested = self
            .executions
            .request_cancel(execution_id)
            .await
            .map_err(EngineError::Store)?;
        if !requested {
            return Ok(false);
        }

        if self.finish_cancel(execution_id).await?.is_none() {
            info!("cancellation requested; active worker will stop the run");
        }
        Ok(true)
    }

    /// Loads an execution.
    ///
    /// # Errors
    ///
    /// Returns an error if it does not exist or the store fails.
    pub async fn get_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<WorkflowExecution, Report<EngineError>> {
        let execution = self
            .executions
            .get(execution_id)
            .await
            .map_err(EngineError::Store)?
            .ok_or(EngineError::ExecutionNotFound { execution_id })?;
        Ok(execution)
    }

    /// Lists a workflow's executions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn list_executions(
        &self,
        workflow_id: WorkflowId,
        limit: usize,
    ) -> Result<Vec<WorkflowExecution>, Report<EngineError>> {
        let executions = self
            .executions
            .list_for_workflow(workflow_id, limit)
            .await
            .map_err(EngineError::Store)?;
        Ok(executions)
    }

    /// Runs a claimed execution and always attempts to release the claim.
    async fn drive(&self, claimed: Claimed) -> Result<ExecutionStatus, EngineError> {
        let Claimed {
            claim_id,
            mut execution,
        } = claimed;
        let result = self.run_claimed(&mut execution, claim_id).await;
        let released = self.executions.release(execution.id, claim_id).await;
        match &result {
            Err(StoreError::ClaimLost { .. }) => {
                warn!("claim taken over by another worker; stopping without further writes");
            }
            Err(e) => warn!(error = %e, "execution step aborted; state left at last save"),
            Ok(_) => {}
        }
        let status = result?;
        released?;

        // A cancel that arrived while the claim was held could not finalize.
        if !status.is_terminal() && self.executions.is_cancel_requested(execution.id).await? {
            if let Some(cancelled) = self.finish_cancel(execution.id).await? {
                return Ok(cancelled);
            }
        }
        Ok(status)
    }

    /// Claims an execution for cancellation and finalizes it.
    ///
    /// Returns `None` when another worker holds the claim.
    async fn finish_cancel(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<ExecutionStatus>, EngineError> {
        let now = self.clock.now();
        let claimed = self
            .executions
            .claim(execution_id, ClaimPurpose::Cancel, now, self.config.lease())
            .await?;
        let Some(Claimed {
            claim_id,
            mut execution,
        }) = claimed
        else {
            return Ok(None);
        };

        execution.cancel(now);
        let saved = self.save(&execution, claim_id).await;
        let released = self.executions.release(execution_id, claim_id).await;
        saved?;
        released?;
        info!("execution cancelled");
        Ok(Some(execution.status))
    }

    /// Saves under `claim_id` and renews its lease.
    async fn save(
        &self,
        execution: &WorkflowExecution,
        claim_id: ClaimId,
    ) -> Result<(), StoreError> {
        let lease_until = self.clock.now() + self.config.lease();
        self.executions.save(execution, claim_id, lease_until).await
    }

    async fn run_claimed(
        &self,
        execution: &mut WorkflowExecution,
        claim_id: ClaimId,
    ) -> Result<ExecutionStatus, StoreError> {
        let Some(workflow) = self.workflows.get(execution.workflow_id).await? else {
            return self
                .finish_failed(execution, claim_id, "workflow no longer exists".to_string())
                .await;
        };
        let graph = match WorkflowGraph::build(&workflow) {
            Ok(graph) => graph,
            Err(e) => {
                return self
                    .finish_failed(
                        execution,
                        claim_id,
                        format!("invalid workflow definition: {e}"),
                    )
                    .await;
            }
        };

        if execution.status == ExecutionStatus::Pending {
            execution.start(graph.entry().id.clone(), self.clock.now());
            info!(entry = %graph.entry().id, "execution started");
        }

        loop {
            if self.executions.is_cancel_requested(execution.id).await? {
                execution.cancel(self.clock.now());
                self.save(execution, claim_id).await?;
                info!("execution cancelled");
                return Ok(execution.status);
            }

            let Some(node_id) = execution.current_node_id.clone() else {
                execution.complete(self.clock.now());
                self.save(execution, claim_id).await?;
                info!(path_len = execution.execution_path.len(), "execution completed");
                return Ok(execution.status);
            };
            let Some(node) = graph.node(node_id.as_str()) else {
                return self
                    .finish_failed(
                        execution,
                        claim_id,
                        format!("node {node_id} is not in the workflow"),
                    )
                    .await;
            };

            let side_effect = node.kind.side_effect();
            let now = self.clock.now();
            if side_effect == SideEffect::ExternalCall {
                if execution.was_interrupted(&node.id) {
                    return self
                        .finish_failed(
                            execution,
                            claim_id,
                            format!(
                                "node {node_id} was interrupted before it finished and will not be re-run"
                            ),
                        )
                        .await;
                }
                let status = match node.kind {
                    NodeKind::AiProcessor(_) => ExecutionStatus::ProcessingAi,
                    _ => ExecutionStatus::Running,
                };
                execution.enter_node(&node.id, status, now);
                self.save(execution, claim_id).await?;
            } else {
                execution.enter_node(&node.id, ExecutionStatus::Running, now);
            }

            debug!(node_id = %node.id, node_type = node.kind.type_name(), "running node");
            let outcome = {
                let snapshot: &WorkflowExecution = execution;
                let executors = &self.executors;
                match side_effect {
                    SideEffect::ExternalCall => {
                        self.config
                            .retry
                            .run(move |_| executors.execute(node, snapshot, now))
                            .await
                    }
                    _ => executors.execute(node, snapshot, now).await,
                }
            };

            let now = self.clock.now();
            match outcome {
                Err(e) => {
                    return self
                        .finish_node_failed(execution, claim_id, &node_id, &e)
                        .await;
                }
                Ok(NodeOutcome::Continue { output, handle }) => {
                    execution.record_output(&node.id, output, now);
                    let next = graph.next(node.id.as_str(), handle).cloned();
                    execution.advance(next, now);
                    self.save(execution, claim_id).await?;
                }
                Ok(NodeOutcome::Suspend { output, resume_at }) => {
                    execution.record_output(&node.id, output, now);
                    match graph.next(node.id.as_str(), None).cloned() {
                        Some(next) => {
                            execution.suspend(next, resume_at, now);
                            self.save(execution, claim_id).await?;
                            info!(%resume_at, "execution suspended");
                            return Ok(execution.status);
                        }
                        None => {
                            execution.advance(None, now);
                            self.save(execution, claim_id).await?;
                        }
                    }
                }
                Ok(NodeOutcome::AwaitApproval { output }) => {
                    execution.record_output(&node.id, output, now);
                    let next = graph.next(node.id.as_str(), None).cloned();
                    execution.await_approval(next, now);
                    self.save(execution, claim_id).await?;
                    info!(node_id = %node.id, "execution waiting for approval");
                    return Ok(execution.status);
                }
            }
        }
    }

    async fn finish_node_failed(
        &self,
        execution: &mut WorkflowExecution,
        claim_id: ClaimId,
        node_id: &crate::node::NodeId,
        error: &NodeError,
    ) -> Result<ExecutionStatus, StoreError> {
        self.finish_failed(execution, claim_id, format!("node {node_id} failed: {error}"))
            .await
    }

    async fn finish_failed(
        &self,
        execution: &mut WorkflowExecution,
        claim_id: ClaimId,
        message: String,
    ) -> Result<ExecutionStatus, StoreError> {
        warn!(error = %message, "execution failed");
        execution.fail(message, self.clock.now());
        self.save(execution, claim_id).await?;
        Ok(execution.status)
    }
}
