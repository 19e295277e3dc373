//! Bounded priority job queue.
//!
//! Ordering is by *effective priority* computed at enqueue time (0 is
//! highest): `ReadAll` pins to 0, `WriteAll` to 1, and a per-block job
//! flagged immediate is boosted by two levels. Jobs of equal effective
//! priority dequeue in submission order.

use tracing::{debug, warn};

use crate::block::BlockId;
use crate::error::{Error, Result};
use std::collections::VecDeque;

/// Default queue capacity.
pub const JOB_QUEUE_CAPACITY: usize = 32;

/// What a job does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Load one block from the medium into its mirror.
    ReadBlock,
    /// Flush one mirror to the medium.
    WriteBlock,
    /// Load every registered block.
    ReadAll,
    /// Flush every writable block.
    WriteAll,
}

/// What a job acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTarget {
    /// A single registered block.
    Block(BlockId),
    /// The whole registry (`ReadAll`/`WriteAll`).
    All,
}

/// A queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    /// Operation kind.
    pub kind: JobKind,
    /// Target block or the whole registry.
    pub target: JobTarget,
    /// Configured priority copied from the block at enqueue time.
    pub priority: u8,
    /// Immediate flag copied from the block.
    pub immediate: bool,
    /// Tick at which the job was submitted.
    pub submit_tick: u64,
    /// Ticks the job may wait before it counts as timed out; 0 disables.
    pub timeout_ticks: u64,
    /// Timeout strikes so far.
    pub retry_count: u8,
    /// Strikes after which the job is dropped.
    pub max_retries: u8,
}

impl Job {
    /// Priority used for queue ordering, 0 highest.
    #[must_use]
    pub fn effective_priority(&self) -> u8 {
        match self.kind {
            JobKind::ReadAll => 0,
            JobKind::WriteAll => 1,
            JobKind::ReadBlock | JobKind::WriteBlock => {
                if self.immediate && self.priority > 2 {
                    self.priority - 2
                } else {
                    self.priority
                }
            }
        }
    }
}

/// Result of a timeout sweep.
#[derive(Debug, Default)]
pub struct TimeoutSweep {
    /// Timeout strikes recorded this sweep.
    pub retried: u32,
    /// Jobs dropped after exceeding their retry budget.
    pub dropped: Vec<Job>,
}

/// The bounded priority queue.
#[derive(Debug)]
pub struct JobQueue {
    jobs: VecDeque<Job>,
    capacity: usize,
    watermark: usize,
    overflows: u64,
}

impl JobQueue {
    /// Creates an empty queue with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: VecDeque::with_capacity(capacity),
            capacity,
            watermark: 0,
            overflows: 0,
        }
    }

    /// Inserts a job at its priority position.
    ///
    /// FIFO within a priority class: the new job goes behind every queued
    /// job of equal or higher effective priority.
    pub fn enqueue(&mut self, job: Job) -> Result<()> {
        if self.jobs.len() >= self.capacity {
            self.overflows += 1;
            warn!(
                overflows = self.overflows,
                "job queue overflow, rejecting enqueue"
            );
            return Err(Error::QueueFull);
        }

        let priority = job.effective_priority();
        let position = self
            .jobs
            .iter()
            .position(|queued| queued.effective_priority() > priority)
            .unwrap_or(self.jobs.len());
        self.jobs.insert(position, job);

        if self.jobs.len() > self.watermark {
            self.watermark = self.jobs.len();
        }
        debug!(
            kind = ?job.kind,
            target = ?job.target,
            priority,
            depth = self.jobs.len(),
            "job enqueued"
        );
        Ok(())
    }

    /// Removes and returns the head job (highest priority, earliest tie).
    pub fn dequeue(&mut self) -> Option<Job> {
        let job = self.jobs.pop_front();
        if let Some(job) = job {
            debug!(kind = ?job.kind, target = ?job.target, depth = self.jobs.len(), "job dequeued");
        }
        job
    }

    /// Strikes every deadline-expired job and drops those out of retries.
    pub fn check_timeouts(&mut self, now: u64) -> TimeoutSweep {
        let mut sweep = TimeoutSweep::default();
        let mut i = 0;
        while i < self.jobs.len() {
            let job = &mut self.jobs[i];
            let expired =
                job.timeout_ticks > 0 && now.saturating_sub(job.submit_tick) > job.timeout_ticks;
            if expired {
                job.retry_count += 1;
                sweep.retried += 1;
                warn!(
                    kind = ?job.kind,
                    target = ?job.target,
                    retry = job.retry_count,
                    "queued job timed out"
                );
                if job.retry_count > job.max_retries {
                    let dropped = self.jobs.remove(i).expect("index in range");
                    sweep.dropped.push(dropped);
                    continue;
                }
            }
            i += 1;
        }
        sweep
    }

    /// Current depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Deepest the queue has ever been.
    #[must_use]
    pub fn watermark(&self) -> usize {
        self.watermark
    }

    /// Rejected enqueues so far.
    #[must_use]
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops all queued jobs, keeping the watermark for diagnostics.
    pub fn clear(&mut self) {
        self.jobs.clear();
    }
}
