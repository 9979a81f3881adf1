//! Top-level control loop (SPEC_FULL.md §4.7).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::batch_packer::pack;
use crate::cluster::ClusterManager;
use crate::error::{Error, Result};
use crate::event::{Event, EventSink};
use crate::job::{Configuration, Job};
use crate::metrics::SchedulerMetrics;
use crate::results::ResultsAggregator;
use crate::submission_queue::SubmissionQueue;

/// Run parameters, equivalent to the positional arguments of the Python
/// `HpcSubmitter.run` method.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub queue_depth: usize,
    pub per_node_batch_size: usize,
    pub num_processes: Option<u32>,
    pub poll_interval: Duration,
    pub try_add_blocked_jobs: bool,
    pub verbose: bool,
    /// Name of the per-node runner binary invoked by generated run scripts.
    /// Matches the Python source's `jade-internal` default verbatim.
    pub runner_command: String,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            queue_depth: 4,
            per_node_batch_size: 1,
            num_processes: None,
            poll_interval: Duration::from_secs(60),
            try_add_blocked_jobs: false,
            verbose: false,
            runner_command: "jade-internal".to_string(),
        }
    }
}

/// Generates `#!/bin/bash`, a conditional `module load`/`conda activate`
/// probe (only present on systems where `module` is on PATH, matching
/// `shutil.which("module")`), and a single invocation of the per-node
/// runner.
fn create_run_script(options: &SchedulerOptions, config_file: &Path, output: &Path) -> String {
    let mut lines = vec!["#!/bin/bash".to_string()];

    if which_module_is_present() {
        lines.push("module load conda".to_string());
        lines.push("conda activate jade".to_string());
    }

    let mut command = format!(
        "{} run-jobs {} --output={}",
        options.runner_command,
        config_file.display(),
        output.display()
    );
    if let Some(n) = options.num_processes {
        command.push_str(&format!(" --num-processes={n}"));
    }
    if options.verbose {
        command.push_str(" --verbose");
    }
    lines.push(command);

    lines.join("\n") + "\n"
}

fn which_module_is_present() -> bool {
    std::process::Command::new("which")
        .arg("module")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Drives dependency resolution, batch packing, submission, and polling to
/// completion for a full `Configuration`. Runs on a plain OS thread — no
/// tokio runtime required, per SPEC_FULL.md §5.
pub struct Scheduler {
    name: String,
    cluster: Arc<dyn ClusterManager>,
    sink: Arc<dyn EventSink>,
    output: PathBuf,
    metrics: Option<Arc<SchedulerMetrics>>,
}

impl Scheduler {
    pub fn new(
        name: impl Into<String>,
        cluster: Arc<dyn ClusterManager>,
        sink: Arc<dyn EventSink>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            cluster,
            sink,
            output: output.into(),
            metrics: None,
        }
    }

    /// Attaches a metrics sink the loop updates once per packing round
    /// (ready-queue depth, in-flight count) and on each submission/
    /// completion event, mirroring the teacher's "observe depth every loop
    /// tick" idiom. Optional — a `Scheduler` built via [`Scheduler::new`]
    /// alone runs identically, just without the gauges moving.
    pub fn with_metrics(mut self, metrics: Arc<SchedulerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Drops each ready job's already-completed blockers, matching
    /// `_update_completed_jobs`: mutate `blocked_by` in place rather than
    /// tracking a separate immutable remaining-blockers set.
    fn update_completed(jobs: &mut [Job], aggregator: &ResultsAggregator) {
        for job in jobs.iter_mut() {
            job.blocked_by
                .retain(|name| !aggregator.completed_job_names().contains(name));
        }
    }

    /// Runs every job in `config` to completion. Translates
    /// `HpcSubmitter.run` almost line-for-line: pack a batch, submit it,
    /// keep submitting while the queue has room and jobs are ready, then
    /// poll once and sleep.
    pub fn run(&self, config: &Configuration, options: &SchedulerOptions) -> Result<()> {
        config.check_job_dependencies()?;

        std::fs::create_dir_all(&self.output)?;

        let mut aggregator = ResultsAggregator::new(&self.output);
        let mut queue = SubmissionQueue::new(options.queue_depth, options.poll_interval);
        let mut jobs: Vec<Job> = config.iter_jobs().cloned().collect();
        let mut batch_index: u32 = 1;
        let mut jobs_completed_reported: u64 = 0;

        while !jobs.is_empty() {
            aggregator.refresh()?;
            Self::update_completed(&mut jobs, &aggregator);

            if let Some(metrics) = &self.metrics {
                let completed_total = aggregator.completed_job_names().len() as u64;
                if completed_total > jobs_completed_reported {
                    metrics.jobs_completed.inc_by(completed_total - jobs_completed_reported);
                    jobs_completed_reported = completed_total;
                }
                metrics.ready_jobs.set(jobs.len() as i64);
            }

            let pack_result = pack(&jobs, options.per_node_batch_size, options.try_add_blocked_jobs);
            let num_admitted = pack_result.num_admitted();
            let num_blocked = pack_result.num_blocked;

            if num_admitted > 0 {
                let admitted_jobs: Vec<Job> = pack_result.admitted.iter().map(|j| (*j).clone()).collect();
                let admitted_indices = pack_result.admitted_indices.clone();
                drop(pack_result);

                let suffix = format!("_batch_{batch_index}");
                batch_index += 1;
                let batch_name = format!("{}{}", self.name, suffix);

                let batch_config = config.with_jobs(admitted_jobs);
                let config_path = self.output.join(format!("config{suffix}.json"));
                batch_config.dump(&config_path)?;

                let script_contents = create_run_script(options, &config_path, &self.output);
                let script_path = self.output.join(format!("run{suffix}.sh"));
                std::fs::write(&script_path, script_contents)?;

                tracing::info!(
                    config_file = %config_path.display(),
                    num_jobs = batch_config.get_num_jobs(),
                    "created split config file"
                );

                let batch = crate::async_batch::AsyncBatch::new(
                    batch_name,
                    script_path,
                    self.output.clone(),
                    self.cluster.clone(),
                    self.sink.clone(),
                );
                queue.submit(batch)?;
                if let Some(metrics) = &self.metrics {
                    metrics.batches_submitted.inc();
                    metrics.in_flight_batches.set(queue.len() as i64);
                }

                self.sink.emit(Event::hpc_submit(
                    &self.name,
                    num_admitted,
                    num_blocked,
                    options.per_node_batch_size,
                ));

                for i in admitted_indices.into_iter().rev() {
                    jobs.remove(i);
                }
            } else {
                tracing::debug!("no jobs are ready for submission");
            }

            tracing::debug!(num_submitted = num_admitted, num_blocked, "packing round complete");

            if num_admitted > 0 && !queue.is_full() {
                continue;
            }

            if num_admitted == 0 && queue.is_empty() && !jobs.is_empty() {
                return Err(Error::InvalidConfiguration(format!(
                    "scheduler made no progress with {} jobs remaining; likely a dependency cycle",
                    jobs.len()
                )));
            }

            let before_poll = queue.len();
            queue.process_queue();
            if let Some(metrics) = &self.metrics {
                let completed_this_round = before_poll.saturating_sub(queue.len());
                if completed_this_round > 0 {
                    metrics.batches_completed.inc_by(completed_this_round as u64);
                }
                metrics.in_flight_batches.set(queue.len() as i64);
            }
            if !jobs.is_empty() || !queue.is_empty() {
                std::thread::sleep(options.poll_interval);
            }
        }

        queue.wait();
        if let Some(metrics) = &self.metrics {
            metrics.in_flight_batches.set(0);
        }
        Ok(())
    }
}
