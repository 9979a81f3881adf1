//! Prometheus metrics for scheduler observability: queue depth, in-flight
//! batch count, and submission/completion counters.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::Arc;

#[derive(Clone)]
pub struct SchedulerMetrics {
    pub in_flight_batches: Gauge,
    pub ready_jobs: Gauge,
    pub batches_submitted: Counter,
    pub batches_completed: Counter,
    pub jobs_completed: Counter,
    registry: Arc<Registry>,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let in_flight_batches = Gauge::default();
        registry.register(
            "jade_in_flight_batches",
            "Number of AsyncBatches currently in the submission queue",
            in_flight_batches.clone(),
        );

        let ready_jobs = Gauge::default();
        registry.register(
            "jade_ready_jobs",
            "Number of jobs in the ready-queue awaiting a batch",
            ready_jobs.clone(),
        );

        let batches_submitted = Counter::default();
        registry.register(
            "jade_batches_submitted_total",
            "Total batches submitted to the cluster manager",
            batches_submitted.clone(),
        );

        let batches_completed = Counter::default();
        registry.register(
            "jade_batches_completed_total",
            "Total batches observed complete",
            batches_completed.clone(),
        );

        let jobs_completed = Counter::default();
        registry.register(
            "jade_jobs_completed_total",
            "Total jobs observed complete by the results aggregator",
            jobs_completed.clone(),
        );

        Self {
            in_flight_batches,
            ready_jobs,
            batches_submitted,
            batches_completed,
            jobs_completed,
            registry: Arc::new(registry),
        }
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        encode(&mut buf, &self.registry).unwrap();
        buf
    }
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
