//! Bundled stand-in for the per-node job runner.
//!
//! A real runner lives on the cluster side; this binary exists only so the
//! test suite can exercise a genuine end-to-end chain —
//! sub-config written, script invoked, commands actually executed, result
//! files actually produced — without depending on a real HPC node. It is
//! deliberately minimal: no staging, no extension registry, no retries.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use clap::Parser;
use jade_core::job::Configuration;

#[derive(Parser)]
#[command(name = "jade-run-jobs")]
struct Cli {
    /// Subcommand name, always "run-jobs" — accepted positionally to match
    /// the invocation shape generated by `Scheduler::run`.
    subcommand: String,

    /// Path to the batch sub-config written by the scheduler.
    config: PathBuf,

    #[arg(long)]
    output: PathBuf,

    #[arg(long)]
    num_processes: Option<usize>,

    #[arg(long, default_value_t = false)]
    verbose: bool,
}

fn run_one_job(job: &jade_core::job::Job, results_dir: &Path) {
    let start = Instant::now();
    let status = Command::new("sh").arg("-c").arg(&job.command).status();
    let exec_time_minutes = start.elapsed().as_secs_f64() / 60.0;

    let return_code = match status {
        Ok(status) => status.code().unwrap_or(-1),
        Err(_) => -1,
    };

    let result = jade_core::results::JobResult {
        name: job.name.clone(),
        return_code,
        exec_time_minutes,
        completion_status: Some(if return_code == 0 { "finished" } else { "failed" }.to_string()),
    };

    let final_path = results_dir.join(format!("{}.json", job.name));
    let tmp_path = results_dir.join(format!("{}.json.tmp", job.name));
    let contents = serde_json::to_string(&result).expect("JobResult always serializes");
    fs::write(&tmp_path, contents).expect("failed to write temp result file");
    fs::rename(&tmp_path, &final_path).expect("failed to rename result file into place");
}

fn main() {
    let cli = Cli::parse();
    assert_eq!(cli.subcommand, "run-jobs", "unsupported subcommand");

    let config = Configuration::load(&cli.config).expect("failed to load sub-config");
    let results_dir = cli.output.join("results");
    fs::create_dir_all(&results_dir).expect("failed to create results directory");

    let worker_count = cli.num_processes.unwrap_or(1).max(1);
    if cli.verbose {
        eprintln!(
            "jade-run-jobs: running {} job(s) with {worker_count} worker(s)",
            config.get_num_jobs()
        );
    }

    let chunk_size = config.jobs.len().div_ceil(worker_count).max(1);
    std::thread::scope(|scope| {
        let chunks: Vec<&[jade_core::job::Job]> = config.jobs.chunks(chunk_size).collect();
        for chunk in chunks {
            scope.spawn(move || {
                for job in chunk {
                    run_one_job(job, &results_dir);
                }
            });
        }
    });
}
