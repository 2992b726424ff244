//! Job types for the event loop.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Fault;

/// Unique identifier for a deferred job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

impl JobId {
    /// Creates a new unique job ID.
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job({})", self.0)
    }
}

/// Order in which ready jobs are picked.
///
/// Invocation outcomes must not depend on this; running the same scenario
/// under several policies is how that is checked.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SchedulingPolicy {
    /// Oldest job first.
    #[default]
    Fifo,
    /// Newest job first.
    Lifo,
    /// Reproducible pseudo-random order from the given seed.
    SeededRandom(u64),
}

/// The body of a job. An `Err` is an asynchronous fault.
pub(crate) type JobFn = Box<dyn FnOnce() -> Result<(), Fault> + Send + 'static>;

/// A unit of deferred work.
pub(crate) struct Job {
    pub id: JobId,
    pub work: JobFn,
}

impl Job {
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce() -> Result<(), Fault> + Send + 'static,
    {
        Self {
            id: JobId::new(),
            work: Box::new(work),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("id", &self.id).finish_non_exhaustive()
    }
}
