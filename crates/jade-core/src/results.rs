//! Read-only scan of on-disk result records (SPEC_FULL.md §4.3).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One job's outcome, written atomically by the per-node runner under
/// `<output>/results/<job_name>.json` (write-to-temp-then-rename). The core
/// never inspects `return_code` for scheduling purposes — a non-zero code is
/// just a completed job, surfaced here for post-hoc reporting only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub name: String,
    pub return_code: i32,
    pub exec_time_minutes: f64,
    #[serde(default)]
    pub completion_status: Option<String>,
}

impl JobResult {
    pub fn is_successful(&self) -> bool {
        self.return_code == 0
    }
}

/// Scans `<output>/results/*.json` and accumulates completed job names into
/// a monotonically-growing set. `list_results`/`get_successful_results` are
/// CLI-level operations (restart-failed/restart-missing flows) — the
/// scheduler core itself only ever needs `completed_job_names`.
#[derive(Debug, Default)]
pub struct ResultsAggregator {
    results_dir: PathBuf,
    results: Vec<JobResult>,
    completed_names: HashSet<String>,
}

impl ResultsAggregator {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            results_dir: output_dir.as_ref().join("results"),
            results: Vec::new(),
            completed_names: HashSet::new(),
        }
    }

    /// Re-scan the results directory, parsing any file not already
    /// accounted for. Missing directory is not an error — it just means no
    /// job has completed yet. A file that can't be read or doesn't parse as
    /// a `JobResult` (e.g. still being written, or corrupt) is logged and
    /// skipped rather than failing the whole scan — SPEC_FULL.md §4.3
    /// requires the aggregator to tolerate partial/in-progress observations
    /// and only admit complete records.
    pub fn refresh(&mut self) -> Result<()> {
        let entries = match std::fs::read_dir(&self.results_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let contents = match std::fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read result file, skipping");
                    continue;
                }
            };
            let result: JobResult = match serde_json::from_str(&contents) {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unparseable result file, skipping");
                    continue;
                }
            };
            if self.completed_names.insert(result.name.clone()) {
                self.results.push(result);
            }
        }
        Ok(())
    }

    pub fn completed_job_names(&self) -> &HashSet<String> {
        &self.completed_names
    }

    pub fn list_results(&self) -> &[JobResult] {
        &self.results
    }

    pub fn get_successful_results(&self) -> Vec<&JobResult> {
        self.results.iter().filter(|r| r.is_successful()).collect()
    }

    pub fn get_failed_results(&self) -> Vec<&JobResult> {
        self.results.iter().filter(|r| !r.is_successful()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_result(dir: &Path, name: &str, return_code: i32) {
        std::fs::create_dir_all(dir).unwrap();
        let result = JobResult {
            name: name.to_string(),
            return_code,
            exec_time_minutes: 1.5,
            completion_status: None,
        };
        std::fs::write(
            dir.join(format!("{name}.json")),
            serde_json::to_string(&result).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn refresh_on_missing_directory_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut aggregator = ResultsAggregator::new(dir.path());
        aggregator.refresh().unwrap();
        assert!(aggregator.completed_job_names().is_empty());
    }

    #[test]
    fn refresh_accumulates_completed_names() {
        let dir = tempfile::tempdir().unwrap();
        let results_dir = dir.path().join("results");
        write_result(&results_dir, "job1", 0);

        let mut aggregator = ResultsAggregator::new(dir.path());
        aggregator.refresh().unwrap();
        assert!(aggregator.completed_job_names().contains("job1"));

        write_result(&results_dir, "job2", 1);
        aggregator.refresh().unwrap();
        assert!(aggregator.completed_job_names().contains("job1"));
        assert!(aggregator.completed_job_names().contains("job2"));
        assert_eq!(aggregator.completed_job_names().len(), 2);
    }

    #[test]
    fn successful_and_failed_partition_correctly() {
        let dir = tempfile::tempdir().unwrap();
        let results_dir = dir.path().join("results");
        write_result(&results_dir, "good", 0);
        write_result(&results_dir, "bad", 1);

        let mut aggregator = ResultsAggregator::new(dir.path());
        aggregator.refresh().unwrap();

        assert_eq!(aggregator.get_successful_results().len(), 1);
        assert_eq!(aggregator.get_failed_results().len(), 1);
        assert_eq!(aggregator.get_successful_results()[0].name, "good");
    }

    #[test]
    fn refresh_is_idempotent_for_already_seen_names() {
        let dir = tempfile::tempdir().unwrap();
        let results_dir = dir.path().join("results");
        write_result(&results_dir, "job1", 0);

        let mut aggregator = ResultsAggregator::new(dir.path());
        aggregator.refresh().unwrap();
        aggregator.refresh().unwrap();
        assert_eq!(aggregator.list_results().len(), 1);
    }

    #[test]
    fn malformed_result_file_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let results_dir = dir.path().join("results");
        write_result(&results_dir, "good", 0);
        std::fs::write(results_dir.join("corrupt.json"), b"not valid json").unwrap();

        let mut aggregator = ResultsAggregator::new(dir.path());
        aggregator.refresh().unwrap();

        assert!(aggregator.completed_job_names().contains("good"));
        assert_eq!(aggregator.completed_job_names().len(), 1);
    }
}
