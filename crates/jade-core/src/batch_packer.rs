//! Pure batch-selection logic (SPEC_FULL.md §4.4).
//!
//! Mirrors `_BatchJobs`/`is_job_blocked`/`are_blocking_jobs_present` from
//! `hpc_submitter.py` exactly: a job already in the batch being built counts
//! toward satisfying another job's `blocked_by` set when `try_add_blocked_jobs`
//! is set, letting the per-node runner manage intra-batch ordering itself.

use std::collections::HashSet;

use crate::job::Job;

/// Result of one packing round. `admitted` holds references into the input
/// slice in the order they were admitted (positional tie-break); `admitted_indices`
/// are their original indices in `ready_jobs`, for the caller to remove
/// without disturbing relative order of what remains.
#[derive(Debug, Clone)]
pub struct PackResult<'a> {
    pub admitted: Vec<&'a Job>,
    pub admitted_indices: Vec<usize>,
    pub num_blocked: usize,
}

impl PackResult<'_> {
    pub fn num_admitted(&self) -> usize {
        self.admitted.len()
    }
}

/// A job is blocked if it has any outstanding `blocked_by` entries, unless
/// `try_add_blocked_jobs` is set and every one of those entries is already
/// present in the batch being built (in which case the runner on the node
/// will sequence it there instead).
fn is_job_blocked(job: &Job, names_in_batch: &HashSet<&str>, try_add_blocked_jobs: bool) -> bool {
    if job.blocked_by.is_empty() {
        return false;
    }
    if try_add_blocked_jobs
        && job
            .blocked_by
            .iter()
            .all(|name| names_in_batch.contains(name.as_str()))
    {
        return false;
    }
    true
}

/// Select jobs for the next batch. Iterates `ready_jobs` in slice order
/// (positional tie-break), admitting each unblocked job until
/// `per_node_batch_size` is reached. Pure: no I/O, no mutation of its
/// inputs, deterministic for a given input.
pub fn pack<'a>(
    ready_jobs: &'a [Job],
    per_node_batch_size: usize,
    try_add_blocked_jobs: bool,
) -> PackResult<'a> {
    let mut admitted = Vec::new();
    let mut admitted_indices = Vec::new();
    let mut names_in_batch: HashSet<&str> = HashSet::new();
    let mut num_blocked = 0;

    for (i, job) in ready_jobs.iter().enumerate() {
        if is_job_blocked(job, &names_in_batch, try_add_blocked_jobs) {
            num_blocked += 1;
            continue;
        }
        names_in_batch.insert(job.name.as_str());
        admitted.push(job);
        admitted_indices.push(i);
        if admitted.len() >= per_node_batch_size {
            break;
        }
    }

    PackResult {
        admitted,
        admitted_indices,
        num_blocked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unblocked_jobs_are_admitted_in_order() {
        let jobs = vec![Job::new("A", "echo a"), Job::new("B", "echo b")];
        let result = pack(&jobs, 8, false);
        assert_eq!(result.num_admitted(), 2);
        assert_eq!(result.admitted_indices, vec![0, 1]);
        assert_eq!(result.num_blocked, 0);
    }

    #[test]
    fn blocked_job_is_skipped_and_counted() {
        let jobs = vec![
            Job::new("A", "echo a").blocked_by(["Z"]),
            Job::new("B", "echo b"),
        ];
        let result = pack(&jobs, 8, false);
        assert_eq!(result.num_admitted(), 1);
        assert_eq!(result.admitted[0].name, "B");
        assert_eq!(result.num_blocked, 1);
    }

    #[test]
    fn respects_per_node_batch_size_cap() {
        let jobs = vec![
            Job::new("A", "echo a"),
            Job::new("B", "echo b"),
            Job::new("C", "echo c"),
        ];
        let result = pack(&jobs, 2, false);
        assert_eq!(result.num_admitted(), 2);
        assert_eq!(result.admitted_indices, vec![0, 1]);
    }

    #[test]
    fn try_add_blocked_jobs_admits_when_blocker_already_in_batch() {
        let jobs = vec![
            Job::new("A", "echo a"),
            Job::new("B", "echo b").blocked_by(["A"]),
        ];
        let result = pack(&jobs, 8, true);
        assert_eq!(result.num_admitted(), 2);
        assert_eq!(result.num_blocked, 0);
    }

    #[test]
    fn try_add_blocked_jobs_still_blocks_when_blocker_not_in_batch() {
        let jobs = vec![
            Job::new("B", "echo b").blocked_by(["A"]),
            Job::new("A", "echo a"),
        ];
        // A hasn't been admitted yet when B is evaluated, so B stays blocked
        // even with try_add_blocked_jobs on.
        let result = pack(&jobs, 8, true);
        assert_eq!(result.num_admitted(), 1);
        assert_eq!(result.admitted[0].name, "A");
        assert_eq!(result.num_blocked, 1);
    }

    #[test]
    fn empty_input_yields_empty_result() {
        let jobs: Vec<Job> = vec![];
        let result = pack(&jobs, 8, false);
        assert_eq!(result.num_admitted(), 0);
        assert_eq!(result.num_blocked, 0);
    }

    #[test]
    fn pack_is_deterministic() {
        let jobs = vec![
            Job::new("A", "echo a"),
            Job::new("B", "echo b").blocked_by(["Z"]),
            Job::new("C", "echo c"),
        ];
        let first = pack(&jobs, 8, false);
        let second = pack(&jobs, 8, false);
        assert_eq!(first.admitted_indices, second.admitted_indices);
        assert_eq!(first.num_blocked, second.num_blocked);
    }
}
