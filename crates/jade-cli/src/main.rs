//! `jade` — CLI front-end for the HPC submission and scheduling engine.
//! Wires `jade_core::Scheduler` to a `clap`-derived `Parser`/`Subcommand` CLI.

mod submit_jobs;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "jade", about = "JADE HPC job submission and scheduling engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submits jobs for execution, locally or on HPC.
    SubmitJobs(submit_jobs::SubmitJobsArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::SubmitJobs(args) => submit_jobs::run(args),
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "submit-jobs failed");
        std::process::exit(1);
    }

    Ok(())
}
