//! JADE HPC submission and scheduling engine.
//!
//! This crate is the scheduling core: dependency resolution, batch packing,
//! bounded-concurrency submission, polling-based completion, and structured
//! event logging. The CLI, config-file loading, and per-node job runner are
//! thin external-collaborator shims layered on top in `jade-cli` and
//! `jade_run_jobs` (this crate's bundled test-only runner binary), not part
//! of the core itself.

pub mod async_batch;
pub mod batch_packer;
pub mod cluster;
pub mod error;
pub mod event;
pub mod health;
pub mod job;
pub mod metrics;
pub mod results;
pub mod scheduler;
pub mod submission_queue;

pub use async_batch::AsyncBatch;
pub use batch_packer::{pack, PackResult};
pub use cluster::{AsyncBatchState, ClusterError, ClusterManager, FakeClusterManager, ShellClusterManager, SubmitStatus};
pub use error::{Error, Result};
pub use event::{Event, EventSink, FileEventSink, NullEventSink, RecordingEventSink};
pub use job::{Configuration, Job};
pub use results::{JobResult, ResultsAggregator};
pub use scheduler::{Scheduler, SchedulerOptions};
pub use submission_queue::SubmissionQueue;
