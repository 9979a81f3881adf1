//! Literal scenario tests from SPEC_FULL.md §8, driven end to end against
//! the bundled `jade-run-jobs` stub runner via `FakeClusterManager`'s
//! force-local mode, so dependency chains genuinely unblock via real result
//! files rather than asserted in isolation.

use std::sync::Arc;
use std::time::Duration;

use jade_core::cluster::{ClusterManager, FakeClusterManager};
use jade_core::event::{RecordingEventSink, EVENT_NAME_HPC_JOB_ASSIGNED, EVENT_NAME_HPC_SUBMIT};
use jade_core::job::{Configuration, Job};
use jade_core::scheduler::{Scheduler, SchedulerOptions};

fn runner_command() -> String {
    env!("CARGO_BIN_EXE_jade-run-jobs").to_string()
}

fn options(queue_depth: usize, per_node_batch_size: usize, try_add_blocked_jobs: bool) -> SchedulerOptions {
    SchedulerOptions {
        queue_depth,
        per_node_batch_size,
        num_processes: None,
        poll_interval: Duration::from_millis(20),
        try_add_blocked_jobs,
        verbose: false,
        runner_command: runner_command(),
    }
}

/// Scenario 1: single independent job.
#[test]
fn scenario_single_independent_job() {
    let dir = tempfile::tempdir().unwrap();
    let cluster: Arc<dyn ClusterManager> = Arc::new(FakeClusterManager::with_force_local());
    let sink = Arc::new(RecordingEventSink::new());
    let scheduler = Scheduler::new("job1", cluster, sink.clone(), dir.path());

    let config = Configuration::new(vec![Job::new("1", "echo hello world")]);
    scheduler.run(&config, &options(8, 8, false)).unwrap();

    let submits = sink.events_named(EVENT_NAME_HPC_SUBMIT);
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].data.get("batch_size").unwrap(), 1);
    assert_eq!(submits[0].data.get("num_blocked").unwrap(), 0);
    assert_eq!(sink.events_named(EVENT_NAME_HPC_JOB_ASSIGNED).len(), 1);
}

/// Scenario 2: linear chain of three jobs, try_add_blocked_jobs=false.
#[test]
fn scenario_linear_chain_without_try_add_blocked_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let cluster: Arc<dyn ClusterManager> = Arc::new(FakeClusterManager::with_force_local());
    let sink = Arc::new(RecordingEventSink::new());
    let scheduler = Scheduler::new("chain", cluster, sink.clone(), dir.path());

    let config = Configuration::new(vec![
        Job::new("A", "true"),
        Job::new("B", "true").blocked_by(["A"]),
        Job::new("C", "true").blocked_by(["B"]),
    ]);
    scheduler.run(&config, &options(4, 8, false)).unwrap();

    let submits = sink.events_named(EVENT_NAME_HPC_SUBMIT);
    assert_eq!(submits.len(), 3);
    for submit in &submits {
        assert_eq!(submit.data.get("batch_size").unwrap(), 1);
    }
}

/// Scenario 3: linear chain with try_add_blocked_jobs=true packs into one batch.
#[test]
fn scenario_linear_chain_with_try_add_blocked_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let cluster: Arc<dyn ClusterManager> = Arc::new(FakeClusterManager::with_force_local());
    let sink = Arc::new(RecordingEventSink::new());
    let scheduler = Scheduler::new("chain", cluster, sink.clone(), dir.path());

    let config = Configuration::new(vec![
        Job::new("A", "true"),
        Job::new("B", "true").blocked_by(["A"]),
        Job::new("C", "true").blocked_by(["B"]),
    ]);
    scheduler.run(&config, &options(4, 8, true)).unwrap();

    let submits = sink.events_named(EVENT_NAME_HPC_SUBMIT);
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].data.get("batch_size").unwrap(), 3);
}

/// Scenario 4: cycle detection — no cluster interaction needed at all.
#[test]
fn scenario_cycle_detection() {
    let dir = tempfile::tempdir().unwrap();
    let cluster: Arc<dyn ClusterManager> = Arc::new(FakeClusterManager::new());
    let sink = Arc::new(RecordingEventSink::new());
    let scheduler = Scheduler::new("cyclic", cluster, sink.clone(), dir.path());

    let config = Configuration::new(vec![
        Job::new("A", "true").blocked_by(["B"]),
        Job::new("B", "true").blocked_by(["A"]),
    ]);

    let result = scheduler.run(&config, &options(4, 8, false));
    assert!(result.is_err());
    assert!(sink.events_named(EVENT_NAME_HPC_SUBMIT).is_empty());
}

/// Scenario 5: queue-depth bound across 100 independent jobs.
#[test]
fn scenario_queue_depth_bound_with_many_independent_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let cluster: Arc<dyn ClusterManager> = Arc::new(FakeClusterManager::with_force_local());
    let sink = Arc::new(RecordingEventSink::new());
    let scheduler = Scheduler::new("fleet", cluster, sink.clone(), dir.path());

    let jobs: Vec<Job> = (0..100).map(|i| Job::new(format!("job{i}"), "true")).collect();
    let config = Configuration::new(jobs);
    scheduler.run(&config, &options(4, 1, false)).unwrap();

    assert_eq!(sink.events_named(EVENT_NAME_HPC_SUBMIT).len(), 100);
}

/// Scenario 6: unknown blocker rejection.
#[test]
fn scenario_unknown_blocker_rejection() {
    let dir = tempfile::tempdir().unwrap();
    let cluster: Arc<dyn ClusterManager> = Arc::new(FakeClusterManager::new());
    let sink = Arc::new(RecordingEventSink::new());
    let scheduler = Scheduler::new("job1", cluster, sink, dir.path());

    let mut config = Configuration::new(vec![Job::new("1", "true")]);
    config
        .get_job_mut("1")
        .unwrap()
        .blocked_by
        .insert("10".to_string());

    assert!(scheduler.run(&config, &options(4, 8, false)).is_err());
}
