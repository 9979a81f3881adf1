//! `submit-jobs` subcommand — thin external-collaborator wiring around
//! `jade_core::Scheduler` (SPEC_FULL.md §6). Mirrors
//! `jade/cli/submit_jobs.py`'s flag set and restart-flow precedence.
//!
//! Flags that have a `JADE_*` environment fallback use clap's `env = "..."`
//! attribute directly (same idiom as `kallad`'s `Scheduler` subcommand):
//! an explicit flag wins, otherwise the environment variable is read,
//! otherwise the flag's own default applies.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use jade_core::cluster::{ClusterManager, FakeClusterManager, ShellClusterManager};
use jade_core::event::{EventSink, FileEventSink};
use jade_core::job::Configuration;
use jade_core::results::ResultsAggregator;
use jade_core::scheduler::{Scheduler, SchedulerOptions};

#[derive(Args, Debug)]
pub struct SubmitJobsArgs {
    /// Path to the job configuration file.
    pub config_file: PathBuf,

    /// Number of jobs to run on one node in one batch.
    #[arg(short = 'b', long, default_value_t = 1, env = "JADE_PER_NODE_BATCH_SIZE")]
    pub per_node_batch_size: usize,

    /// Run locally via the in-process fake cluster backend, even if an HPC
    /// submit/status command pair is configured.
    #[arg(short = 'l', long, default_value_t = false)]
    pub local: bool,

    /// Maximum number of batches submitted concurrently.
    #[arg(short = 'n', long = "max-nodes", default_value_t = 4, env = "JADE_QUEUE_DEPTH")]
    pub queue_depth: usize,

    /// Output directory.
    #[arg(short = 'o', long, default_value = "output", env = "JADE_OUTPUT_DIR")]
    pub output: PathBuf,

    /// Interval in seconds on which to poll jobs for status.
    #[arg(short = 'p', long, default_value_t = 60.0, env = "JADE_POLL_INTERVAL_SECS")]
    pub poll_interval: f64,

    /// Number of processes the per-node runner should use; defaults to the
    /// runner's own choice when omitted.
    #[arg(short = 'q', long)]
    pub num_processes: Option<u32>,

    /// Enable verbose log output.
    #[arg(long, default_value_t = false)]
    pub verbose: bool,

    /// Restart only failed jobs from a previous run.
    #[arg(long, default_value_t = false)]
    pub restart_failed: bool,

    /// Restart only missing jobs from a previous run.
    #[arg(long, default_value_t = false)]
    pub restart_missing: bool,

    /// Submit jobs to the batch that already contains their blockers when
    /// the remote runner can sequence them internally.
    #[arg(long, default_value_t = true, overrides_with = "no_try_add_blocked_jobs")]
    pub try_add_blocked_jobs: bool,

    #[arg(long, default_value_t = false, overrides_with = "try_add_blocked_jobs", hide = true)]
    pub no_try_add_blocked_jobs: bool,

    /// Submit command template for a real cluster backend, e.g.
    /// `sbatch {script}`. Ignored when `--local` is set.
    #[arg(long)]
    pub submit_command: Option<String>,

    /// Status command template for a real cluster backend, e.g.
    /// `squeue -j {job_id}`. Ignored when `--local` is set.
    #[arg(long)]
    pub status_command: Option<String>,

    /// Expose `/health` and `/metrics` on this port for the duration of the
    /// run. Ambient observability, not part of the scheduling loop itself —
    /// omit to run with no HTTP endpoint at all.
    #[arg(long, env = "JADE_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

/// Runs the `/health`/`/metrics` endpoint on its own OS thread with its own
/// single-threaded Tokio runtime, so the synchronous scheduling loop
/// (SPEC_FULL.md §5) never depends on a Tokio context for correctness.
/// `/ready` flips to 200 once the listener is bound.
fn spawn_metrics_server(port: u16, state: Arc<jade_core::health::HealthState>) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!(error = %e, "failed to start metrics server runtime");
                return;
            }
        };

        runtime.block_on(async move {
            let router = jade_core::health::health_router(state.clone());
            let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::warn!(error = %e, port, "failed to bind metrics server");
                    return;
                }
            };
            state.ready.store(true, std::sync::atomic::Ordering::Relaxed);
            if let Err(e) = axum::serve(listener, router).await {
                tracing::warn!(error = %e, "metrics server exited");
            }
        });
    });
}

/// Builds the sub-config for a restart-failed or restart-missing run,
/// following the Python CLI's sequential precedence: `restart_failed` is
/// applied first, then `restart_missing` second — which means when both
/// flags are set, `restart_missing`'s sub-config wins (DESIGN.md "Open
/// Questions resolved"). A warning is logged when both are set.
fn build_restart_config(config_file: &PathBuf, output: &PathBuf, args: &SubmitJobsArgs) -> Result<PathBuf> {
    if args.restart_failed && args.restart_missing {
        tracing::warn!(
            "both --restart-failed and --restart-missing were set; \
             --restart-missing's sub-config takes precedence"
        );
    }

    let mut active_config_file = config_file.clone();

    if args.restart_failed {
        let base = Configuration::load(&active_config_file)
            .with_context(|| format!("failed to load {}", active_config_file.display()))?;
        let mut aggregator = ResultsAggregator::new(output);
        aggregator.refresh().context("failed to scan results directory")?;
        let failed_names: std::collections::HashSet<String> = aggregator
            .get_failed_results()
            .into_iter()
            .map(|r| r.name.clone())
            .collect();
        let failed_jobs = base
            .iter_jobs()
            .filter(|j| failed_names.contains(&j.name))
            .cloned()
            .collect();
        let restart_config = base.with_jobs(failed_jobs);
        let path = output.join("failed_job_inputs.json");
        restart_config.dump(&path)?;
        active_config_file = path;
    }

    if args.restart_missing {
        let base = Configuration::load(&active_config_file)
            .with_context(|| format!("failed to load {}", active_config_file.display()))?;
        let mut aggregator = ResultsAggregator::new(output);
        aggregator.refresh().context("failed to scan results directory")?;
        let completed = aggregator.completed_job_names();
        let missing_jobs = base
            .iter_jobs()
            .filter(|j| !completed.contains(&j.name))
            .cloned()
            .collect();
        let restart_config = base.with_jobs(missing_jobs);
        let path = output.join("missing_job_inputs.json");
        restart_config.dump(&path)?;
        active_config_file = path;
    }

    Ok(active_config_file)
}

#[track_caller]
pub fn run(args: SubmitJobsArgs) -> Result<()> {
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create output directory {}", args.output.display()))?;

    let config_file = if args.restart_failed || args.restart_missing {
        build_restart_config(&args.config_file, &args.output, &args)?
    } else {
        args.config_file.clone()
    };

    let config = Configuration::load(&config_file)
        .with_context(|| format!("failed to load {}", config_file.display()))?;

    let metrics = Arc::new(jade_core::metrics::SchedulerMetrics::new());
    if let Some(port) = args.metrics_port {
        let health_state = Arc::new(jade_core::health::HealthState::new((*metrics).clone()));
        spawn_metrics_server(port, health_state);
    }

    let event_log_path = args.output.join("events.log");
    let sink: Arc<dyn EventSink> = Arc::new(
        FileEventSink::new(&event_log_path)
            .with_context(|| format!("failed to open event log at {}", event_log_path.display()))?,
    );

    let cluster: Arc<dyn ClusterManager> = if args.local {
        Arc::new(FakeClusterManager::with_force_local())
    } else if jade_core::cluster::fake_hpc_cluster_requested() {
        Arc::new(FakeClusterManager::from_env())
    } else if let (Some(submit), Some(status)) = (&args.submit_command, &args.status_command) {
        Arc::new(ShellClusterManager::new(submit.clone(), status.clone(), "shell"))
    } else {
        anyhow::bail!(
            "no cluster backend configured: pass --local, set FAKE_HPC_CLUSTER, \
             or supply --submit-command/--status-command"
        );
    };

    let name = config_file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("jade")
        .to_string();

    let scheduler = Scheduler::new(name.clone(), cluster, sink.clone(), &args.output).with_metrics(metrics);
    let options = SchedulerOptions {
        queue_depth: args.queue_depth,
        per_node_batch_size: args.per_node_batch_size,
        num_processes: args.num_processes,
        poll_interval: Duration::from_secs_f64(args.poll_interval),
        try_add_blocked_jobs: args.try_add_blocked_jobs && !args.no_try_add_blocked_jobs,
        verbose: args.verbose,
        runner_command: "jade-run-jobs".to_string(),
    };

    if let Err(e) = scheduler.run(&config, &options) {
        sink.emit(jade_core::error::unhandled_error_event(
            &name,
            &e,
            std::panic::Location::caller(),
        ));
        return Err(e.into());
    }
    Ok(())
}
