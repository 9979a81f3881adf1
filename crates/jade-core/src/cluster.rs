//! Pluggable HPC batch-system abstraction.

use std::collections::HashMap;
use std::path::Path;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use thiserror::Error;

/// Name of the environment variable gating the fake cluster backend. Any
/// non-empty value other than `"0"`/`"false"` selects it.
pub const FAKE_HPC_CLUSTER_ENV: &str = "FAKE_HPC_CLUSTER";

/// Whether the current process environment requests the fake backend.
/// Tests should prefer the `FakeClusterManager` constructors directly
/// rather than this function, so they never depend on mutating
/// process-wide environment.
pub fn fake_hpc_cluster_requested() -> bool {
    match std::env::var(FAKE_HPC_CLUSTER_ENV) {
        Ok(v) => !(v.is_empty() || v == "0" || v.eq_ignore_ascii_case("false")),
        Err(_) => false,
    }
}

/// Coarse job state as reported by a cluster backend. `None` is both the
/// pre-submission state and the terminal "backend no longer knows this id"
/// state — the scheduler treats a job id the backend has forgotten as
/// complete, never as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncBatchState {
    None,
    Queued,
    Running,
    Complete,
}

impl AsyncBatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AsyncBatchState::None | AsyncBatchState::Complete)
    }

    pub fn label(self) -> &'static str {
        match self {
            AsyncBatchState::None => "NONE",
            AsyncBatchState::Queued => "QUEUED",
            AsyncBatchState::Running => "RUNNING",
            AsyncBatchState::Complete => "COMPLETE",
        }
    }
}

/// Submission outcome. Only `Good` lets the batch enter the
/// `SubmissionQueue`; anything else becomes an `Error::ExecutionError` at
/// the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    Good,
    Error,
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster backend command failed: {0}")]
    CommandFailed(String),

    #[error("cluster backend produced unparseable output: {0}")]
    UnparseableOutput(String),
}

/// Abstraction over an HPC batch system: submit a script, query status by
/// id. One implementation per backend; no inheritance hierarchy, just this
/// trait's two methods plus whatever backend-identity tag a caller wants for
/// logging.
pub trait ClusterManager: Send + Sync {
    fn submit(
        &self,
        output_dir: &Path,
        name: &str,
        script_path: &Path,
    ) -> Result<(String, SubmitStatus), ClusterError>;

    fn check_status(&self, job_id: &str) -> Result<AsyncBatchState, ClusterError>;

    fn backend_name(&self) -> &str;
}

/// Deterministic in-process backend for tests and local (non-cluster) runs.
/// Gated by `FAKE_HPC_CLUSTER` at the CLI boundary, but every behavior a
/// test needs is reachable through constructor options so tests never have
/// to mutate process environment to drive it.
pub struct FakeClusterManager {
    next_id: AtomicU64,
    force_submit_error: bool,
    /// job_id -> number of remaining `Running` polls before `Complete`.
    polls_until_complete: Mutex<HashMap<String, u32>>,
    default_polls_until_complete: u32,
    force_check_status_error: bool,
    /// When set, `submit()` actually spawns `script_path` as a child process
    /// (bash) instead of faking state transitions, and `check_status` polls
    /// the child's exit status. This is the "force-local" behavior named in
    /// SPEC_FULL.md §4.2, used by end-to-end tests that need a genuine
    /// completed-job side effect (a result file written by the bundled
    /// `jade-run-jobs` stub runner) to unblock downstream jobs.
    force_local: bool,
    local_children: Mutex<HashMap<String, Child>>,
}

impl FakeClusterManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            force_submit_error: false,
            polls_until_complete: Mutex::new(HashMap::new()),
            default_polls_until_complete: 0,
            force_check_status_error: false,
            force_local: false,
            local_children: Mutex::new(HashMap::new()),
        }
    }

    /// Every submission fails at `submit()` time (backend rejected the
    /// script outright).
    pub fn with_forced_submit_error() -> Self {
        Self {
            force_submit_error: true,
            ..Self::new()
        }
    }

    /// Every submission succeeds, but `check_status` reports `Running` for
    /// `polls` calls before reporting `Complete`.
    pub fn with_polls_until_complete(polls: u32) -> Self {
        Self {
            default_polls_until_complete: polls,
            ..Self::new()
        }
    }

    /// Every `check_status` call fails transiently, to exercise the
    /// consecutive-failure threshold in `AsyncBatch::poll`.
    pub fn with_forced_check_status_error() -> Self {
        Self {
            force_check_status_error: true,
            ..Self::new()
        }
    }

    /// Genuinely executes each submitted run-script as a local child
    /// process rather than simulating state transitions in memory.
    pub fn with_force_local() -> Self {
        Self {
            force_local: true,
            ..Self::new()
        }
    }

    /// Construct from the `FAKE_HPC_CLUSTER` environment gate (SPEC_FULL.md
    /// §6): requested ⇒ force-local fake backend, not requested ⇒ still a
    /// `FakeClusterManager` (a real `ShellClusterManager` is selected by the
    /// caller, not here) with default in-memory behavior.
    pub fn from_env() -> Self {
        if fake_hpc_cluster_requested() {
            Self::with_force_local()
        } else {
            Self::new()
        }
    }
}

impl Default for FakeClusterManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterManager for FakeClusterManager {
    fn submit(
        &self,
        _output_dir: &Path,
        name: &str,
        script_path: &Path,
    ) -> Result<(String, SubmitStatus), ClusterError> {
        if self.force_submit_error {
            return Ok((String::new(), SubmitStatus::Error));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let job_id = format!("fake-{name}-{id}");

        if self.force_local {
            let child = Command::new("bash")
                .arg(script_path)
                .spawn()
                .map_err(|e| ClusterError::CommandFailed(e.to_string()))?;
            self.local_children
                .lock()
                .expect("fake cluster child map poisoned")
                .insert(job_id.clone(), child);
            return Ok((job_id, SubmitStatus::Good));
        }

        self.polls_until_complete
            .lock()
            .expect("fake cluster poll map poisoned")
            .insert(job_id.clone(), self.default_polls_until_complete);
        Ok((job_id, SubmitStatus::Good))
    }

    fn check_status(&self, job_id: &str) -> Result<AsyncBatchState, ClusterError> {
        if self.force_check_status_error {
            return Err(ClusterError::CommandFailed(
                "simulated transient cluster failure".to_string(),
            ));
        }

        if self.force_local {
            let mut children = self
                .local_children
                .lock()
                .expect("fake cluster child map poisoned");
            return match children.get_mut(job_id) {
                None => Ok(AsyncBatchState::None),
                Some(child) => match child.try_wait() {
                    Ok(Some(_status)) => {
                        children.remove(job_id);
                        Ok(AsyncBatchState::Complete)
                    }
                    Ok(None) => Ok(AsyncBatchState::Running),
                    Err(e) => Err(ClusterError::CommandFailed(e.to_string())),
                },
            };
        }

        let mut polls = self
            .polls_until_complete
            .lock()
            .expect("fake cluster poll map poisoned");
        match polls.get_mut(job_id) {
            None => Ok(AsyncBatchState::None),
            Some(remaining) if *remaining == 0 => {
                polls.remove(job_id);
                Ok(AsyncBatchState::Complete)
            }
            Some(remaining) => {
                *remaining -= 1;
                Ok(AsyncBatchState::Running)
            }
        }
    }

    fn backend_name(&self) -> &str {
        "fake"
    }
}

/// Submits via a configurable shell command template, checks status via
/// another. Stands in for a real sbatch/squeue-style backend — a full
/// SLURM/PBS driver is an external collaborator, but this gives the trait
/// boundary a genuine non-fake implementation.
///
/// Templates use `{script}`/`{name}`/`{job_id}` placeholders, substituted
/// literally before the command is split on whitespace and executed.
pub struct ShellClusterManager {
    submit_command: String,
    status_command: String,
    backend_name: String,
}

impl ShellClusterManager {
    pub fn new(
        submit_command: impl Into<String>,
        status_command: impl Into<String>,
        backend_name: impl Into<String>,
    ) -> Self {
        Self {
            submit_command: submit_command.into(),
            status_command: status_command.into(),
            backend_name: backend_name.into(),
        }
    }

    fn run(command_line: &str) -> Result<String, ClusterError> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ClusterError::CommandFailed("empty command template".to_string()))?;
        let output = Command::new(program)
            .args(parts)
            .output()
            .map_err(|e| ClusterError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(ClusterError::CommandFailed(format!(
                "{} exited with {:?}: {}",
                program,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl ClusterManager for ShellClusterManager {
    fn submit(
        &self,
        _output_dir: &Path,
        name: &str,
        script_path: &Path,
    ) -> Result<(String, SubmitStatus), ClusterError> {
        let command_line = self
            .submit_command
            .replace("{script}", &script_path.display().to_string())
            .replace("{name}", name);

        match Self::run(&command_line) {
            Ok(stdout) if stdout.is_empty() => Err(ClusterError::UnparseableOutput(
                "submit command produced no job id".to_string(),
            )),
            Ok(job_id) => Ok((job_id, SubmitStatus::Good)),
            Err(_) => Ok((String::new(), SubmitStatus::Error)),
        }
    }

    fn check_status(&self, job_id: &str) -> Result<AsyncBatchState, ClusterError> {
        let command_line = self.status_command.replace("{job_id}", job_id);
        let stdout = Self::run(&command_line)?;
        match stdout.to_uppercase().as_str() {
            "" | "NONE" | "UNKNOWN" => Ok(AsyncBatchState::None),
            "QUEUED" | "PENDING" => Ok(AsyncBatchState::Queued),
            "RUNNING" => Ok(AsyncBatchState::Running),
            "COMPLETE" | "COMPLETED" => Ok(AsyncBatchState::Complete),
            other => Err(ClusterError::UnparseableOutput(other.to_string())),
        }
    }

    fn backend_name(&self) -> &str {
        &self.backend_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn fake_cluster_submit_assigns_increasing_ids() {
        let cluster = FakeClusterManager::new();
        let (id1, status1) = cluster
            .submit(&PathBuf::from("/tmp"), "job1", &PathBuf::from("run.sh"))
            .unwrap();
        let (id2, status2) = cluster
            .submit(&PathBuf::from("/tmp"), "job2", &PathBuf::from("run.sh"))
            .unwrap();
        assert_eq!(status1, SubmitStatus::Good);
        assert_eq!(status2, SubmitStatus::Good);
        assert_ne!(id1, id2);
    }

    #[test]
    fn fake_cluster_forced_submit_error() {
        let cluster = FakeClusterManager::with_forced_submit_error();
        let (_, status) = cluster
            .submit(&PathBuf::from("/tmp"), "job1", &PathBuf::from("run.sh"))
            .unwrap();
        assert_eq!(status, SubmitStatus::Error);
    }

    #[test]
    fn fake_cluster_unknown_job_id_is_none() {
        let cluster = FakeClusterManager::new();
        assert_eq!(
            cluster.check_status("nonexistent").unwrap(),
            AsyncBatchState::None
        );
    }

    #[test]
    fn fake_cluster_polls_until_complete_then_forgets() {
        let cluster = FakeClusterManager::with_polls_until_complete(2);
        let (id, _) = cluster
            .submit(&PathBuf::from("/tmp"), "job1", &PathBuf::from("run.sh"))
            .unwrap();
        assert_eq!(cluster.check_status(&id).unwrap(), AsyncBatchState::Running);
        assert_eq!(cluster.check_status(&id).unwrap(), AsyncBatchState::Running);
        assert_eq!(cluster.check_status(&id).unwrap(), AsyncBatchState::Complete);
        // backend no longer knows the job once it's reported Complete
        assert_eq!(cluster.check_status(&id).unwrap(), AsyncBatchState::None);
    }

    #[test]
    fn fake_cluster_forced_check_status_error() {
        let cluster = FakeClusterManager::with_forced_check_status_error();
        assert!(cluster.check_status("anything").is_err());
    }

    #[test]
    fn async_batch_state_is_terminal() {
        assert!(AsyncBatchState::None.is_terminal());
        assert!(AsyncBatchState::Complete.is_terminal());
        assert!(!AsyncBatchState::Queued.is_terminal());
        assert!(!AsyncBatchState::Running.is_terminal());
    }

    #[test]
    fn force_local_runs_script_and_reports_completion() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.sh");
        std::fs::write(&script, "#!/bin/bash\ntrue\n").unwrap();

        let cluster = FakeClusterManager::with_force_local();
        let (id, status) = cluster.submit(dir.path(), "job1", &script).unwrap();
        assert_eq!(status, SubmitStatus::Good);

        let mut state = cluster.check_status(&id).unwrap();
        let mut attempts = 0;
        while state == AsyncBatchState::Running && attempts < 200 {
            std::thread::sleep(std::time::Duration::from_millis(10));
            state = cluster.check_status(&id).unwrap();
            attempts += 1;
        }
        assert_eq!(state, AsyncBatchState::Complete);
        // backend no longer knows the job once complete, same as the
        // in-memory variant.
        assert_eq!(cluster.check_status(&id).unwrap(), AsyncBatchState::None);
    }
}
