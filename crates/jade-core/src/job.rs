//! Job and Configuration data model (SPEC_FULL.md §3).

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An independently executable unit of work.
///
/// `blocked_by` is mutated in place as dependencies complete — the
/// scheduler drops names out of it once the aggregator reports them
/// complete (see [`crate::scheduler::Scheduler`]). This matches the
/// original Python implementation's `job.blocked_by.add(...)` /
/// `remove_blocking_job` mutation model rather than tracking a separate
/// immutable "remaining blockers" set. A `BTreeSet` rather than a
/// `HashSet` keeps iteration (and therefore serialization) order
/// alphabetical so that sub-config dumps are byte-identical across
/// runs of the same configuration, not merely within one process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub blocked_by: BTreeSet<String>,
}

impl Job {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            blocked_by: BTreeSet::new(),
        }
    }

    pub fn blocked_by(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.blocked_by = names.into_iter().map(Into::into).collect();
        self
    }
}

/// An ordered sequence of jobs plus whatever base fields the per-node
/// runner needs to reconstruct its environment. The core doesn't interpret
/// `extra_fields` — it just carries them through to materialized
/// sub-configs verbatim, since the runner is an external collaborator
/// (SPEC_FULL.md §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configuration {
    pub jobs: Vec<Job>,
    #[serde(flatten)]
    pub extra_fields: serde_json::Map<String, serde_json::Value>,
}

impl Configuration {
    pub fn new(jobs: Vec<Job>) -> Self {
        Self {
            jobs,
            extra_fields: serde_json::Map::new(),
        }
    }

    pub fn get_num_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn get_job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn get_job_mut(&mut self, name: &str) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.name == name)
    }

    pub fn add_job(&mut self, job: Job) {
        self.jobs.push(job);
    }

    pub fn iter_jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Every name in any `blocked_by` must refer to some job in the
    /// configuration (SPEC_FULL.md §3 invariant). This is the only
    /// validation the core performs statically — cycles are detected only
    /// transitively, at runtime, by the scheduler's no-progress check
    /// (SPEC_FULL.md §7).
    pub fn check_job_dependencies(&self) -> Result<()> {
        let names: HashSet<&str> = self.jobs.iter().map(|j| j.name.as_str()).collect();
        for job in &self.jobs {
            for blocker in &job.blocked_by {
                if !names.contains(blocker.as_str()) {
                    return Err(Error::InvalidConfiguration(format!(
                        "job '{}' is blocked by unknown job '{}'",
                        job.name, blocker
                    )));
                }
            }
        }
        Ok(())
    }

    /// Produce a sibling configuration carrying the same base fields but
    /// only the given batch of jobs — what the Scheduler writes out as a
    /// sub-config for one node (SPEC_FULL.md §6).
    pub fn with_jobs(&self, jobs: Vec<Job>) -> Configuration {
        Configuration {
            jobs,
            extra_fields: self.extra_fields.clone(),
        }
    }

    /// Serialize in canonical form: stable field order, 2-space indent, so
    /// that repeated dumps of identical data are byte-identical and
    /// human-inspectable sub-configs form a reproducible audit trail.
    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn dump(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_canonical_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}
