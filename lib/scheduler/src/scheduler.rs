//! Periodic resumption of due executions.

use crate::error::SchedulerError;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use leadflow_core::{Clock, ExecutionId};
use leadflow_workflow::{ExecutionEngine, ExecutionStore};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Scheduler tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scans.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Maximum executions resumed at once within a tick.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Maximum executions picked up per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_interval_secs() -> u64 {
    30
}

fn default_max_concurrent() -> usize {
    8
}

fn default_batch_size() -> usize {
    100
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_concurrent: default_max_concurrent(),
            batch_size: default_batch_size(),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Executions listed as due.
    pub due: usize,
    /// Executions this tick actually ran.
    pub resumed: usize,
    /// Executions another worker claimed first.
    pub skipped: usize,
    /// Executions whose resumption hit a store error.
    pub errored: usize,
}

/// Hands due executions to the engine.
pub struct ResumeScheduler {
    engine: Arc<ExecutionEngine>,
    store: Arc<dyn ExecutionStore>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl std::fmt::Debug for ResumeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumeScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ResumeScheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(
        engine: Arc<ExecutionEngine>,
        store: Arc<dyn ExecutionStore>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            engine,
            store,
            clock,
            config,
        }
    }

    /// Resumes every execution due at `now`.
    ///
    /// Per-execution failures are logged and counted; they do not abort the
    /// tick.
    ///
    /// # Errors
    ///
    /// Returns an error if the due executions cannot be listed.
    #[instrument(skip(self))]
    pub async fn tick(
        &self,
        now: DateTime<Utc>,
    ) -> Result<TickSummary, Report<SchedulerError>> {
        let due = self
            .store
            .list_due_for_resume(now, self.config.batch_size)
            .await
            .map_err(|e| SchedulerError::ScanFailed {
                details: e.to_string(),
            })?;

        let mut summary = TickSummary {
            due: due.len(),
            ..TickSummary::default()
        };
        if due.is_empty() {
            return Ok(summary);
        }

        let results: Vec<(ExecutionId, _)> = futures::stream::iter(due)
            .map(|id| async move { (id, self.engine.resume(id).await) })
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        for (execution_id, result) in results {
            match result {
                Ok(Some(status)) => {
                    summary.resumed += 1;
                    debug!(%execution_id, %status, "execution resumed");
                }
                Ok(None) => summary.skipped += 1,
                Err(e) => {
                    summary.errored += 1;
                    warn!(%execution_id, error = %e, "failed to resume execution");
                }
            }
        }

        info!(
            due = summary.due,
            resumed = summary.resumed,
            skipped = summary.skipped,
            errored = summary.errored,
            "scheduler tick finished"
        );
        Ok(summary)
    }

    /// Ticks on the configured interval until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.config.interval_secs, "scheduler started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.tick(self.clock.now()).await {
                        warn!(error = %e, "scheduler tick failed");
                    }
                }
            }
        }

        info!("scheduler stopped");
    }
}
