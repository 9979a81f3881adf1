//! Bounded pool of in-flight batches, polled on a fixed interval
//! (SPEC_FULL.md §4.6).

use std::time::Duration;

use crate::async_batch::AsyncBatch;

/// Holds at most `queue_depth` batches at once. The Scheduler is the only
/// caller, and always checks `is_full()` before `submit` — exceeding the
/// bound here is a programmer error, not a documented failure mode, so it's
/// enforced with `debug_assert!` rather than a new `Error` variant.
pub struct SubmissionQueue {
    queue_depth: usize,
    poll_interval: Duration,
    in_flight: Vec<AsyncBatch>,
}

impl SubmissionQueue {
    pub fn new(queue_depth: usize, poll_interval: Duration) -> Self {
        Self {
            queue_depth,
            poll_interval,
            in_flight: Vec::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.in_flight.len() >= self.queue_depth
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// Runs the batch's one-time submission and, on success, adds it to the
    /// in-flight set. Caller must have already confirmed `!is_full()`.
    pub fn submit(&mut self, mut batch: AsyncBatch) -> crate::error::Result<()> {
        debug_assert!(!self.is_full(), "submission queue overflowed queue_depth");
        batch.run()?;
        self.in_flight.push(batch);
        Ok(())
    }

    /// Poll every in-flight batch once, dropping those that have completed.
    /// Returns the number still in flight after the pass.
    pub fn process_queue(&mut self) -> usize {
        self.in_flight.retain_mut(|batch| !batch.poll());
        self.in_flight.len()
    }

    /// Poll-and-sleep until every in-flight batch has completed.
    pub fn wait(&mut self) {
        while !self.is_empty() {
            self.process_queue();
            if !self.is_empty() {
                std::thread::sleep(self.poll_interval);
            }
        }
    }
}
