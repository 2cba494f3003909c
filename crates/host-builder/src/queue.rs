//! Shared queue of pending host jobs.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::job::Job;

/// Pool of jobs drained concurrently by the workers.
///
/// The queue is filled once at startup and only shrinks afterwards, so
/// [`JobQueue::try_take`] never waits: an empty queue means there is nothing
/// left to do.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<Job>>,
}

impl JobQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job to the back of the queue.
    pub fn enqueue(&self, job: Job) {
        self.lock().push_back(job);
    }

    /// Remove the job at the front, or `None` if the queue is drained.
    #[must_use]
    pub fn try_take(&self) -> Option<Job> {
        self.lock().pop_front()
    }

    /// Number of jobs not yet taken.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether every job has been taken.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A worker that panicked while holding the lock cannot leave the deque
    // half-updated, so the poisoned guard is still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FromIterator<Job> for JobQueue {
    fn from_iter<I: IntoIterator<Item = Job>>(iter: I) -> Self {
        Self {
            jobs: Mutex::new(iter.into_iter().collect()),
        }
    }
}
