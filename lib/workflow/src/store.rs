//! Persistence seams for executions and workflows.
//!
//! The engine never mutates an execution without first claiming it. A claim
//! is a lease identified by a fresh [`ClaimId`]: it expires on its own, so a
//! crashed process cannot strand a run, and every write names the claim it
//! was made under, so a worker whose lease was taken over cannot write.
//! Each save extends the lease. Claiming also clears `resume_at` on a
//! suspended run, which is what makes two overlapping scheduler scans resume
//! it only once.

use crate::definition::Workflow;
use crate::error::StoreError;
use crate::execution::{ExecutionStatus, WorkflowExecution};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use leadflow_core::{ClaimId, ExecutionId, WorkflowId};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Why an execution is being claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimPurpose {
    /// Walk the graph: start, resume after a delay, or recover an orphan.
    Run,
    /// Continue a run paused in `waiting_approval`.
    Approve,
    /// Finalize a cancellation.
    Cancel,
}

/// Returns whether an execution in this state may be claimed for `purpose`.
///
/// Lease expiry is checked separately by the store.
#[must_use]
pub fn is_claimable(
    execution: &WorkflowExecution,
    purpose: ClaimPurpose,
    now: DateTime<Utc>,
) -> bool {
    if execution.status.is_terminal() {
        return false;
    }
    match purpose {
        ClaimPurpose::Cancel => true,
        ClaimPurpose::Approve => execution.status == ExecutionStatus::WaitingApproval,
        ClaimPurpose::Run => match execution.status {
            ExecutionStatus::Pending => true,
            ExecutionStatus::Running | ExecutionStatus::ProcessingAi => {
                execution.resume_at.is_none_or(|at| at <= now)
            }
            _ => false,
        },
    }
}

/// An execution held under a claim.
#[derive(Debug, Clone, PartialEq)]
pub struct Claimed {
    pub claim_id: ClaimId,
    pub execution: WorkflowExecution,
}

/// Trait for execution persistence.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Persists a new execution.
    async fn create(&self, execution: &WorkflowExecution) -> Result<(), StoreError>;

    /// Loads an execution without claiming it.
    async fn get(&self, id: ExecutionId) -> Result<Option<WorkflowExecution>, StoreError>;

    /// Lists a workflow's executions, newest first.
    async fn list_for_workflow(
        &self,
        workflow_id: WorkflowId,
        limit: usize,
    ) -> Result<Vec<WorkflowExecution>, StoreError>;

    /// Atomically claims an execution until `now + lease`.
    ///
    /// Returns `None` when the execution is missing, not claimable for
    /// `purpose`, or already under an unexpired lease. A successful claim
    /// replaces any expired one. A `Run` claim clears `resume_at`.
    async fn claim(
        &self,
        id: ExecutionId,
        purpose: ClaimPurpose,
        now: DateTime<Utc>,
        lease: TimeDelta,
    ) -> Result<Option<Claimed>, StoreError>;

    /// Overwrites an execution held under `claim_id` and extends the lease
    /// to `lease_until`.
    ///
    /// Fails with [`StoreError::ClaimLost`] once another claim replaced it.
    async fn save(
        &self,
        execution: &WorkflowExecution,
        claim_id: ClaimId,
        lease_until: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Drops the lease if `claim_id` still holds it.
    async fn release(&self, id: ExecutionId, claim_id: ClaimId) -> Result<(), StoreError>;

    /// Lists executions the scheduler should hand to the engine.
    ///
    /// Due means: not terminal, not waiting for approval, no live lease, and
    /// either pending, suspended with `resume_at <= now`, or orphaned
    /// mid-step by a lease that expired.
    async fn list_due_for_resume(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ExecutionId>, StoreError>;

    /// Flags a non-terminal execution for cancellation.
    ///
    /// Returns `false` if the execution is missing or already terminal.
    async fn request_cancel(&self, id: ExecutionId) -> Result<bool, StoreError>;

    /// Returns whether cancellation was requested.
    async fn is_cancel_requested(&self, id: ExecutionId) -> Result<bool, StoreError>;
}

/// Read-only access to workflow definitions.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Loads a workflow.
    async fn get(&self, id: WorkflowId) -> Result<Option<Workflow>, StoreError>;
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    execution: WorkflowExecution,
    claim: Option<(ClaimId, DateTime<Utc>)>,
    cancel_requested: bool,
}

impl Entry {
    fn lease_live(&self, now: DateTime<Utc>) -> bool {
        self.claim.is_some_and(|(_, until)| until > now)
    }

    fn held_by(&self, claim_id: ClaimId) -> bool {
        self.claim.is_some_and(|(held, _)| held == claim_id)
    }
}

#[derive(Debug, Default)]
struct Executions {
    next_seq: u64,
    entries: HashMap<ExecutionId, Entry>,
}

/// In-process execution store.
///
/// Suitable for tests and single-process deployments without a database.
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    inner: Mutex<Executions>,
}

impl InMemoryExecutionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            execution.id,
            Entry {
                seq,
                execution: execution.clone(),
                claim: None,
                cancel_requested: false,
            },
        );
        Ok(())
    }

    async fn get(&self, id: ExecutionId) -> Result<Option<WorkflowExecution>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.entries.get(&id).map(|e| e.execution.clone()))
    }

    async fn list_for_workflow(
        &self,
        workflow_id: WorkflowId,
        limit: usize,
    ) -> Result<Vec<WorkflowExecution>, StoreError> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<&Entry> = inner
            .entries
            .values()
            .filter(|e| e.execution.workflow_id == workflow_id)
            .collect();
        entries.sort_by(|a, b| {
            b.execution
                .created_at
                .cmp(&a.execution.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|e| e.execution.clone())
            .collect())
    }

    async fn claim(
        &self,
        id: ExecutionId,
        purpose: ClaimPurpose,
        now: DateTime<Utc>,
        lease: TimeDelta,
    ) -> Result<Option<Claimed>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.entries.get_mut(&id) else {
            return Ok(None);
        };
        if entry.lease_live(now) || !is_claimable(&entry.execution, purpose, now) {
            return Ok(None);
        }
        let claim_id = ClaimId::new();
        entry.claim = Some((claim_id, now + lease));
        if purpose == ClaimPurpose::Run {
            entry.execution.resume_at = None;
        }
        Ok(Some(Claimed {
            claim_id,
            execution: entry.execution.clone(),
        }))
    }

    async fn save(
        &self,
        execution: &WorkflowExecution,
        claim_id: ClaimId,
        lease_until: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let entry = inner
            .entries
            .get_mut(&execution.id)
            .ok_or(StoreError::ExecutionNotFound {
                execution_id: execution.id,
            })?;
        if !entry.held_by(claim_id) {
            return Err(StoreError::ClaimLost {
                execution_id: execution.id,
            });
        }
        entry.execution = execution.clone();
        entry.claim = Some((claim_id, lease_until));
        Ok(())
    }

    async fn release(&self, id: ExecutionId, claim_id: ClaimId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.entries.get_mut(&id) {
            if entry.held_by(claim_id) {
                entry.claim = None;
            }
        }
        Ok(())
    }

    async fn list_due_for_resume(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ExecutionId>, StoreError> {
        let inner = self.inner.lock().await;
        let mut due: Vec<&Entry> = inner
            .entries
            .values()
            .filter(|e| !e.lease_live(now) && is_claimable(&e.execution, ClaimPurpose::Run, now))
            .collect();
        due.sort_by_key(|e| (e.execution.resume_at.unwrap_or(e.execution.created_at), e.seq));
        Ok(due
            .into_iter()
            .take(limit)
            .map(|e| e.execution.id)
            .collect())
    }

    async fn request_cancel(&self, id: ExecutionId) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.entries.get_mut(&id) {
            Some(entry) if !entry.execution.status.is_terminal() => {
                entry.cancel_requested = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn is_cancel_requested(&self, id: ExecutionId) -> Result<bool, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.entries.get(&id).is_some_and(|e| e.cancel_requested))
    }
}

/// In-process workflow store.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    workflows: Mutex<HashMap<WorkflowId, Workflow>>,
}

impl InMemoryWorkflowStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a workflow.
    pub async fn insert(&self, workflow: Workflow) {
        self.workflows.lock().await.insert(workflow.id, workflow);
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn get(&self, id: WorkflowId) -> Result<Option<Workflow>, StoreError> {
        Ok(self.workflows.lock().await.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;
    use chrono::TimeZone;
    use leadflow_core::TenantId;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn lease() -> TimeDelta {
        TimeDelta::minutes(15)
    }

    fn execution(workflow_id: WorkflowId, created: i64) -> WorkflowExecution {
        WorkflowExecution::new(workflow_id, TenantId::new(), json!({}), at(created))
    }

    async fn claim_at(
        store: &InMemoryExecutionStore,
        id: ExecutionId,
        secs: i64,
    ) -> Option<Claimed> {
        store.claim(id, ClaimPurpose::Run, at(secs), lease()).await.unwrap()
    }

    #[tokio::test]
    async fn claim_is_exclusive_until_released() {
        let store = InMemoryExecutionStore::new();
        let exec = execution(WorkflowId::new(), 0);
        store.create(&exec).await.unwrap();

        let held = claim_at(&store, exec.id, 1).await.unwrap();
        assert!(claim_at(&store, exec.id, 2).await.is_none());

        store.release(exec.id, held.claim_id).await.unwrap();
        let next = claim_at(&store, exec.id, 3).await.unwrap();
        assert_ne!(next.claim_id, held.claim_id);
    }

    #[tokio::test]
    async fn expired_lease_can_be_reclaimed() {
        let store = InMemoryExecutionStore::new();
        let exec = execution(WorkflowId::new(), 0);
        store.create(&exec).await.unwrap();

        claim_at(&store, exec.id, 0).await.unwrap();
        let later = at(0) + lease() + TimeDelta::seconds(1);
        assert!(store.claim(exec.id, ClaimPurpose::Run, later, lease()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn superseded_claim_can_neither_save_nor_release() {
        let store = InMemoryExecutionStore::new();
        let exec = execution(WorkflowId::new(), 0);
        store.create(&exec).await.unwrap();

        let stale = claim_at(&store, exec.id, 0).await.unwrap();
        let later = at(0) + lease() + TimeDelta::seconds(1);
        let current = store
            .claim(exec.id, ClaimPurpose::Run, later, lease())
            .await
            .unwrap()
            .unwrap();

        let mut overwrite = stale.execution.clone();
        overwrite.complete(later);
        assert_eq!(
            store.save(&overwrite, stale.claim_id, later + lease()).await,
            Err(StoreError::ClaimLost {
                execution_id: exec.id
            })
        );
        assert_eq!(
            store.get(exec.id).await.unwrap().unwrap().status,
            ExecutionStatus::Pending
        );

        // Releasing the stale claim leaves the current one in place.
        store.release(exec.id, stale.claim_id).await.unwrap();
        assert!(store.claim(exec.id, ClaimPurpose::Run, later, lease()).await.unwrap().is_none());
        store
            .save(&current.execution, current.claim_id, later + lease())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn save_extends_the_lease() {
        let store = InMemoryExecutionStore::new();
        let exec = execution(WorkflowId::new(), 0);
        store.create(&exec).await.unwrap();

        let held = claim_at(&store, exec.id, 0).await.unwrap();
        let heartbeat = at(600);
        store
            .save(&held.execution, held.claim_id, heartbeat + lease())
            .await
            .unwrap();

        let past_first_lease = at(0) + lease() + TimeDelta::seconds(1);
        let reclaimed = store
            .claim(exec.id, ClaimPurpose::Run, past_first_lease, lease())
            .await
            .unwrap();
        assert!(reclaimed.is_none());
        assert!(store.list_due_for_resume(past_first_lease, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_claim_respects_resume_at_and_clears_it() {
        let store = InMemoryExecutionStore::new();
        let mut exec = execution(WorkflowId::new(), 0);
        exec.start(NodeId::from("t"), at(0));
        exec.suspend(NodeId::from("after"), at(100), at(0));
        store.create(&exec).await.unwrap();

        assert!(store.claim(exec.id, ClaimPurpose::Run, at(50), lease()).await.unwrap().is_none());
        assert!(store.list_due_for_resume(at(50), 10).await.unwrap().is_empty());
        assert_eq!(store.list_due_for_resume(at(100), 10).await.unwrap(), vec![exec.id]);

        let claimed = claim_at(&store, exec.id, 100).await.unwrap();
        assert_eq!(claimed.execution.resume_at, None);
        assert!(store.list_due_for_resume(at(101), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn approval_claims_only_waiting_executions() {
        let store = InMemoryExecutionStore::new();
        let pending = execution(WorkflowId::new(), 0);
        store.create(&pending).await.unwrap();
        let approval = store
            .claim(pending.id, ClaimPurpose::Approve, at(1), lease())
            .await
            .unwrap();
        assert!(approval.is_none());

        let mut exec = execution(WorkflowId::new(), 0);
        exec.await_approval(Some(NodeId::from("next")), at(1));
        store.create(&exec).await.unwrap();
        assert!(store.claim(exec.id, ClaimPurpose::Run, at(2), lease()).await.unwrap().is_none());
        assert!(store.list_due_for_resume(at(2), 10).await.unwrap().is_empty());
        assert!(store.claim(exec.id, ClaimPurpose::Approve, at(2), lease()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn terminal_executions_are_never_claimed_or_cancelled() {
        let store = InMemoryExecutionStore::new();
        let mut exec = execution(WorkflowId::new(), 0);
        exec.complete(at(1));
        store.create(&exec).await.unwrap();

        for purpose in [ClaimPurpose::Run, ClaimPurpose::Approve, ClaimPurpose::Cancel] {
            assert!(store.claim(exec.id, purpose, at(2), lease()).await.unwrap().is_none());
        }
        assert!(!store.request_cancel(exec.id).await.unwrap());
        assert!(!store.is_cancel_requested(exec.id).await.unwrap());
    }

    #[tokio::test]
    async fn cancel_flag() {
        let store = InMemoryExecutionStore::new();
        let exec = execution(WorkflowId::new(), 0);
        store.create(&exec).await.unwrap();

        assert!(store.request_cancel(exec.id).await.unwrap());
        assert!(store.is_cancel_requested(exec.id).await.unwrap());
        assert!(!store.request_cancel(ExecutionId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn lists_newest_first_with_limit() {
        let store = InMemoryExecutionStore::new();
        let workflow_id = WorkflowId::new();
        let first = execution(workflow_id, 0);
        let second = execution(workflow_id, 10);
        let third = execution(workflow_id, 20);
        for exec in [&first, &second, &third] {
            store.create(exec).await.unwrap();
        }
        store.create(&execution(WorkflowId::new(), 30)).await.unwrap();

        let listed = store.list_for_workflow(workflow_id, 2).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![third.id, second.id]);
    }

    #[tokio::test]
    async fn orphaned_running_execution_is_due_after_lease_expiry() {
        let store = InMemoryExecutionStore::new();
        let mut exec = execution(WorkflowId::new(), 0);
        store.create(&exec).await.unwrap();
        let held = claim_at(&store, exec.id, 0).await.unwrap();
        exec.start(NodeId::from("t"), at(0));
        exec.enter_node(&NodeId::from("ai"), ExecutionStatus::ProcessingAi, at(0));
        store.save(&exec, held.claim_id, at(0) + lease()).await.unwrap();

        assert!(store.list_due_for_resume(at(60), 10).await.unwrap().is_empty());
        let after_lease = at(0) + lease() + TimeDelta::seconds(1);
        assert_eq!(
            store.list_due_for_resume(after_lease, 10).await.unwrap(),
            vec![exec.id]
        );
    }

    #[tokio::test]
    async fn workflow_store_roundtrip() {
        let store = InMemoryWorkflowStore::new();
        let workflow = Workflow::new(
            TenantId::new(),
            "stored",
            crate::trigger::TriggerType::Manual,
        );
        store.insert(workflow.clone()).await;
        assert_eq!(store.get(workflow.id).await.unwrap(), Some(workflow));
        assert_eq!(store.get(WorkflowId::new()).await.unwrap(), None);
    }
}
