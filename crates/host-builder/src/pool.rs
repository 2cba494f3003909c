//! Fixed-size pool of workers draining the job queue.
//!
//! Each worker loops: check for cancellation, take a job, process it, log
//! any failure and go again. A worker stops when the queue is empty or when
//! cancellation has been requested. Cancellation is only observed between
//! jobs; a create request that is already in flight always completes.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::processor::{HostJobProcessor, Outcome};
use crate::queue::JobQueue;

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 8;

/// Exit code when the batch ran to completion with failed jobs.
const EXIT_JOBS_FAILED: u8 = 3;

/// Exit code when the batch was interrupted by a signal.
const EXIT_INTERRUPTED: u8 = 130;

/// Lifecycle of a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Taking and processing jobs.
    Running,
    /// Asked to stop; honoured before the next take.
    CancelRequested,
    /// Finished.
    Stopped(WorkerExit),
}

/// Why a worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The queue was drained.
    QueueEmpty,
    /// Cancellation was requested; remaining jobs were left in the queue.
    Cancelled,
}

/// Per-job results counted by a worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    /// Hosts created.
    pub created: usize,
    /// Hosts skipped because they already existed.
    pub already_exists: usize,
    /// Create requests rejected by the API.
    pub failed: usize,
    /// Jobs abandoned on a lookup error, malformed field or panic.
    pub errored: usize,
}

impl Tally {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::AlreadyExists => self.already_exists += 1,
            Outcome::PartialFailure => self.failed += 1,
        }
    }

    /// Number of jobs this tally covers.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.created + self.already_exists + self.failed + self.errored
    }
}

/// What a worker reports when it stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    /// Worker index.
    pub id: usize,
    /// Terminal state.
    pub exit: WorkerExit,
    /// Results of the jobs it processed.
    pub tally: Tally,
}

/// Aggregate result of a pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Results across all workers.
    pub tally: Tally,
    /// Workers that stopped because of cancellation.
    pub workers_cancelled: usize,
    /// Jobs still queued when the last worker stopped.
    pub remaining: usize,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl RunSummary {
    fn absorb(&mut self, report: &WorkerReport) {
        self.tally.created += report.tally.created;
        self.tally.already_exists += report.tally.already_exists;
        self.tally.failed += report.tally.failed;
        self.tally.errored += report.tally.errored;
        if report.exit == WorkerExit::Cancelled {
            self.workers_cancelled += 1;
        }
    }

    /// Whether cancellation left jobs unprocessed.
    ///
    /// A signal that arrives after the last job was taken abandons nothing,
    /// so it does not count.
    #[must_use]
    pub fn interrupted(&self) -> bool {
        self.workers_cancelled > 0 && self.remaining > 0
    }

    /// Process exit code for this run.
    ///
    /// 130 if cancellation left jobs queued, 3 if any job failed or errored,
    /// 0 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.interrupted() {
            EXIT_INTERRUPTED
        } else if self.tally.failed + self.tally.errored > 0 {
            EXIT_JOBS_FAILED
        } else {
            0
        }
    }
}

/// One queue consumer.
struct Worker {
    id: usize,
    queue: Arc<JobQueue>,
    processor: HostJobProcessor,
    cancel: CancellationToken,
}

impl Worker {
    fn state(&self) -> WorkerState {
        if self.cancel.is_cancelled() {
            WorkerState::CancelRequested
        } else {
            WorkerState::Running
        }
    }

    async fn run(self) -> WorkerReport {
        let mut tally = Tally::default();

        let exit = loop {
            if self.state() == WorkerState::CancelRequested {
                debug!("Cancellation requested, terminating");
                break WorkerExit::Cancelled;
            }

            let Some(job) = self.queue.try_take() else {
                debug!("Queue is empty, we are done here");
                break WorkerExit::QueueEmpty;
            };

            let span = info_span!("host", name = %job.name());
            let result = AssertUnwindSafe(self.processor.process(&job))
                .catch_unwind()
                .instrument(span.clone())
                .await;

            span.in_scope(|| match result {
                Ok(Ok(outcome)) => tally.record(outcome),
                Ok(Err(e)) => {
                    error!(error = %e, status = ?e.status(), "Host job failed");
                    tally.errored += 1;
                }
                Err(payload) => {
                    error!(panic = %panic_message(payload.as_ref()), "Host job panicked");
                    tally.errored += 1;
                }
            });
        };

        debug!(state = ?WorkerState::Stopped(exit), processed = tally.processed(), "Worker stopped");

        WorkerReport {
            id: self.id,
            exit,
            tally,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// A fixed number of workers sharing one queue and one processor.
pub struct WorkerPool {
    size: usize,
    queue: Arc<JobQueue>,
    processor: HostJobProcessor,
}

impl WorkerPool {
    /// Create a pool of `size` workers. A size of zero is raised to one.
    #[must_use]
    pub fn new(size: usize, queue: Arc<JobQueue>, processor: HostJobProcessor) -> Self {
        Self {
            size: size.max(1),
            queue,
            processor,
        }
    }

    /// Number of workers the pool starts.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Start every worker and wait until all of them have stopped.
    ///
    /// Cancelling `cancel` asks each worker to stop after its current job.
    pub async fn run(&self, cancel: &CancellationToken) -> RunSummary {
        let started = Instant::now();
        info!(workers = self.size, queued = self.queue.len(), "Starting workers");

        let mut set = JoinSet::new();
        for id in 0..self.size {
            let worker = Worker {
                id,
                queue: Arc::clone(&self.queue),
                processor: self.processor.clone(),
                cancel: cancel.child_token(),
            };
            set.spawn(worker.run().instrument(info_span!("worker", id)));
        }

        let mut summary = RunSummary::default();
        while let Some(result) = set.join_next().await {
            match result {
                Ok(report) => {
                    debug!(worker = report.id, exit = ?report.exit, "Worker joined");
                    summary.absorb(&report);
                }
                Err(e) => error!(error = %e, "Worker task failed"),
            }
        }

        summary.remaining = self.queue.len();
        summary.elapsed = started.elapsed();
        summary
    }
}
