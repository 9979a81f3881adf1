//! One in-flight cluster submission.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cluster::{AsyncBatchState, ClusterManager, SubmitStatus};
use crate::error::{Error, Result};
use crate::event::{Event, EventSink};

/// Consecutive `check_status` failures tolerated before a batch is forced to
/// `Complete`/`None` to avoid deadlock. Fixed at 5 — an implementation
/// choice, not derived from source (see DESIGN.md).
pub const CHECK_STATUS_FAILURE_THRESHOLD: u32 = 5;

/// Owns one submitted batch's lifecycle: the one-time `run()` submission,
/// repeated `poll()` status checks, and the terminal transition. Not
/// `Clone` — it uniquely owns the relationship between a job id and the
/// cluster manager, which is what makes `Drop` meaningful here.
pub struct AsyncBatch {
    name: String,
    run_script: PathBuf,
    output: PathBuf,
    cluster: Arc<dyn ClusterManager>,
    sink: Arc<dyn EventSink>,
    job_id: Option<String>,
    last_state: AsyncBatchState,
    is_pending: bool,
    consecutive_failures: u32,
}

impl AsyncBatch {
    pub fn new(
        name: impl Into<String>,
        run_script: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        cluster: Arc<dyn ClusterManager>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            name: name.into(),
            run_script: run_script.into(),
            output: output.into(),
            cluster,
            sink,
            job_id: None,
            last_state: AsyncBatchState::None,
            is_pending: false,
            consecutive_failures: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_pending(&self) -> bool {
        self.is_pending
    }

    pub fn last_state(&self) -> AsyncBatchState {
        self.last_state
    }

    pub fn run_script(&self) -> &Path {
        &self.run_script
    }

    /// One-time submission. On non-`Good` status the batch never enters the
    /// `SubmissionQueue` — the caller maps this to `Error::ExecutionError`.
    pub fn run(&mut self) -> Result<()> {
        let (job_id, status) = self
            .cluster
            .submit(&self.output, &self.name, &self.run_script)
            .map_err(|e| Error::ClusterError(e.to_string()))?;

        if status != SubmitStatus::Good {
            return Err(Error::ExecutionError(format!(
                "submission of batch '{}' was rejected by cluster backend '{}'",
                self.name,
                self.cluster.backend_name()
            )));
        }

        self.job_id = Some(job_id.clone());
        self.is_pending = true;
        self.last_state = AsyncBatchState::Queued;
        self.sink.emit(Event::hpc_job_assigned(&self.name, &job_id));
        Ok(())
    }

    /// One `check_status` call. Transient cluster errors are swallowed and
    /// retried, retaining the last observed state, up to
    /// `CHECK_STATUS_FAILURE_THRESHOLD` consecutive failures; beyond that
    /// the batch is forced to `Complete` to avoid deadlocking the queue.
    /// Returns whether the batch is now complete.
    pub fn poll(&mut self) -> bool {
        if !self.is_pending {
            return true;
        }

        let job_id = match &self.job_id {
            Some(id) => id.clone(),
            None => return true,
        };

        match self.cluster.check_status(&job_id) {
            Ok(new_state) => {
                self.consecutive_failures = 0;
                self.transition(new_state);
            }
            Err(e) => {
                self.consecutive_failures += 1;
                tracing::warn!(
                    batch = %self.name,
                    error = %e,
                    consecutive_failures = self.consecutive_failures,
                    "transient cluster error while checking status"
                );
                if self.consecutive_failures > CHECK_STATUS_FAILURE_THRESHOLD {
                    tracing::warn!(
                        batch = %self.name,
                        "consecutive check_status failure threshold exceeded, forcing complete"
                    );
                    self.transition(AsyncBatchState::None);
                }
            }
        }

        !self.is_pending
    }

    fn transition(&mut self, new_state: AsyncBatchState) {
        if new_state != self.last_state {
            self.sink.emit(Event::hpc_job_state_change(
                &self.name,
                self.job_id.as_deref().unwrap_or(""),
                self.last_state.label(),
                new_state.label(),
            ));
        }
        self.last_state = new_state;
        if new_state.is_terminal() {
            self.is_pending = false;
        }
    }
}

impl Drop for AsyncBatch {
    fn drop(&mut self) {
        if self.is_pending {
            tracing::warn!(
                batch = %self.name,
                job_id = ?self.job_id,
                "AsyncBatch destroyed while still pending"
            );
        }
    }
}
