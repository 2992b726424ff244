//! The `EventLoop` implementation.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::{MockClock, TimeSource, TimerId, TimerQueue};
use crate::error::{Error, Fault, Result};
use crate::event_loop::intercept::{InterceptHandle, InterceptStack};
use crate::event_loop::job::{Job, JobId, SchedulingPolicy};

/// Configuration for an [`EventLoop`].
///
/// # Example
///
/// ```rust
/// use step_invoker::event_loop::{EventLoopConfig, SchedulingPolicy};
///
/// let config = EventLoopConfig::new()
///     .with_policy(SchedulingPolicy::Lifo)
///     .with_max_steps(500);
/// assert_eq!(config.max_steps, 500);
/// ```
#[derive(Debug, Clone)]
pub struct EventLoopConfig {
    /// Order in which ready jobs are picked.
    pub policy: SchedulingPolicy,
    /// Steps a single `run_*` call may take before giving up.
    pub max_steps: usize,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            policy: SchedulingPolicy::Fifo,
            max_steps: 100_000,
        }
    }
}

impl EventLoopConfig {
    /// Create a new default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scheduling policy.
    #[must_use]
    pub fn with_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the step limit.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// A single-threaded cooperative event loop.
///
/// The loop owns three things: a queue of deferred jobs, a queue of timers,
/// and the interceptor stack that receives faults escaping from either.
/// Nothing runs until the loop is driven with [`step`](Self::step) or one
/// of the `run_*` methods, and every job runs on the driving thread.
///
/// # Example
///
/// ```rust
/// use step_invoker::event_loop::EventLoop;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::time::Duration;
///
/// let event_loop = EventLoop::new();
/// let fired = Arc::new(AtomicUsize::new(0));
///
/// let f = Arc::clone(&fired);
/// event_loop.set_timeout(Duration::from_millis(50), move || {
///     f.fetch_add(1, Ordering::SeqCst);
///     Ok(())
/// });
///
/// event_loop.run_until_idle().unwrap();
/// assert_eq!(fired.load(Ordering::SeqCst), 1);
/// assert_eq!(event_loop.now(), Duration::from_millis(50));
/// ```
#[derive(Clone)]
pub struct EventLoop {
    inner: Arc<LoopInner>,
}

struct LoopInner {
    /// Jobs ready to run.
    ready: Mutex<VecDeque<Job>>,
    /// Jobs waiting for a deadline.
    timers: Mutex<TimerQueue<Job>>,
    /// Interceptors for faults raised by jobs.
    intercepts: Arc<InterceptStack>,
    /// Faults no interceptor was installed to receive.
    uncaught: Mutex<Vec<Fault>>,
    clock: Arc<dyn TimeSource>,
    config: EventLoopConfig,
    /// Random state for seeded scheduling.
    random_state: Mutex<u64>,
}

impl EventLoop {
    /// Creates an event loop on a fresh [`MockClock`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(MockClock::new())
    }

    /// Creates an event loop on the given time source.
    ///
    /// Pass a clone of a [`MockClock`] to observe virtual time from the
    /// outside, or a [`SystemClock`](crate::clock::SystemClock) to wait in
    /// real time.
    #[must_use]
    pub fn with_clock(clock: impl TimeSource + 'static) -> Self {
        Self::with_config(clock, EventLoopConfig::default())
    }

    /// Creates an event loop with explicit configuration.
    #[must_use]
    pub fn with_config(clock: impl TimeSource + 'static, config: EventLoopConfig) -> Self {
        let seed = match &config.policy {
            // xorshift never leaves zero
            SchedulingPolicy::SeededRandom(0) => 0x9E37_79B9_7F4A_7C15,
            SchedulingPolicy::SeededRandom(s) => *s,
            _ => 0,
        };
        Self {
            inner: Arc::new(LoopInner {
                ready: Mutex::new(VecDeque::new()),
                timers: Mutex::new(TimerQueue::new()),
                intercepts: Arc::new(InterceptStack::default()),
                uncaught: Mutex::new(Vec::new()),
                clock: Arc::new(clock),
                config,
                random_state: Mutex::new(seed),
            }),
        }
    }

    /// Returns the loop's configuration.
    #[must_use]
    pub fn config(&self) -> &EventLoopConfig {
        &self.inner.config
    }

    /// Current time on the loop's clock.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.inner.clock.now()
    }

    /// Queues `work` to run on a later step.
    ///
    /// An `Err` returned by `work`, or a panic inside it, is routed to the
    /// innermost interceptor.
    pub fn defer<F>(&self, work: F) -> JobId
    where
        F: FnOnce() -> std::result::Result<(), Fault> + Send + 'static,
    {
        let job = Job::new(work);
        let id = job.id;
        self.inner.ready.lock().push_back(job);
        id
    }

    /// Schedules `work` to run once `delay` has elapsed on the loop's clock.
    ///
    /// Deadlines past the end of representable time saturate.
    pub fn set_timeout<F>(&self, delay: Duration, work: F) -> TimerId
    where
        F: FnOnce() -> std::result::Result<(), Fault> + Send + 'static,
    {
        let deadline = self.now().saturating_add(delay);
        self.inner.timers.lock().schedule(deadline, Job::new(work))
    }

    /// Cancels a timer.
    ///
    /// Returns `false` if it already fired or was already cancelled.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        self.inner.timers.lock().cancel(id)
    }

    /// Number of jobs ready to run.
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.inner.ready.lock().len()
    }

    /// Number of live timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.inner.timers.lock().len()
    }

    /// Returns `true` if no jobs or timers remain.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending_jobs() == 0 && self.pending_timers() == 0
    }

    /// Installs `interceptor` as the innermost receiver of faults raised by
    /// jobs.
    ///
    /// The previous interceptor is restored when the returned handle is
    /// uninstalled or dropped.
    pub fn install_interceptor<F>(&self, interceptor: F) -> InterceptHandle
    where
        F: Fn(Fault) + Send + Sync + 'static,
    {
        let id = self.inner.intercepts.push(Arc::new(interceptor));
        InterceptHandle::new(id, Arc::clone(&self.inner.intercepts))
    }

    /// Number of installed interceptors.
    #[must_use]
    pub fn interceptor_depth(&self) -> usize {
        self.inner.intercepts.depth()
    }

    /// Routes a fault to the innermost interceptor, or records it as
    /// uncaught when none is installed.
    pub fn raise(&self, fault: Fault) {
        match self.inner.intercepts.innermost() {
            Some(interceptor) => interceptor(fault),
            None => {
                tracing::warn!(error = %fault, origin = %fault.origin(), "event_loop.uncaught");
                self.inner.uncaught.lock().push(fault);
            }
        }
    }

    /// Faults that were raised with no interceptor installed.
    #[must_use]
    pub fn uncaught(&self) -> Vec<Fault> {
        self.inner.uncaught.lock().clone()
    }

    /// Takes and clears the uncaught faults.
    pub fn take_uncaught(&self) -> Vec<Fault> {
        std::mem::take(&mut *self.inner.uncaught.lock())
    }

    /// Runs one job: a ready job if there is one, otherwise the earliest
    /// timer that has already expired.
    ///
    /// Returns `false` if there was nothing to run without advancing time.
    pub fn step(&self) -> bool {
        match self.next_ready().or_else(|| self.next_expired()) {
            Some(job) => {
                self.execute(job);
                true
            }
            None => false,
        }
    }

    /// Runs jobs until none can run without advancing time.
    ///
    /// Returns the number of jobs run.
    pub fn run_until_stalled(&self) -> usize {
        let mut count = 0;
        while self.step() {
            count += 1;
        }
        count
    }

    /// Waits on the clock until the earliest timer is due.
    ///
    /// On a [`MockClock`] this jumps time forward instantly. Returns `false`
    /// if no timers are scheduled.
    pub fn advance_to_next_timer(&self) -> bool {
        let deadline = self.inner.timers.lock().next_deadline();
        match deadline {
            Some(deadline) => {
                self.inner.clock.wait_until(deadline);
                true
            }
            None => false,
        }
    }

    /// Runs jobs and timers until nothing is left.
    ///
    /// Returns the number of jobs run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StepLimit`] if the configured step limit is exceeded.
    pub fn run_until_idle(&self) -> Result<usize> {
        let mut steps = 0;
        self.drive(&mut steps, || false)?;
        Ok(steps)
    }

    /// Runs jobs and timers until `done` returns `true` or nothing is left.
    ///
    /// `done` is checked before every step. Returns its final value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StepLimit`] if the configured step limit is exceeded.
    pub fn run_until<P>(&self, done: P) -> Result<bool>
    where
        P: FnMut() -> bool,
    {
        let mut steps = 0;
        self.drive(&mut steps, done)
    }

    fn drive<P>(&self, steps: &mut usize, mut done: P) -> Result<bool>
    where
        P: FnMut() -> bool,
    {
        let max_steps = self.inner.config.max_steps;
        loop {
            if done() {
                return Ok(true);
            }
            if self.step() {
                *steps += 1;
                if *steps > max_steps {
                    return Err(Error::StepLimit(max_steps));
                }
            } else if !self.advance_to_next_timer() {
                return Ok(done());
            }
        }
    }

    fn execute(&self, job: Job) {
        let Job { id, work } = job;
        tracing::trace!(job = %id, "event_loop.run");
        let fault = match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(())) => return,
            Ok(Err(fault)) => fault,
            Err(payload) => Fault::from_panic(payload),
        };
        tracing::debug!(job = %id, error = %fault, "event_loop.job_fault");
        self.raise(fault);
    }

    fn next_expired(&self) -> Option<Job> {
        let now = self.now();
        self.inner
            .timers
            .lock()
            .pop_expired(now)
            .map(|(_, job)| job)
    }

    /// Gets the next ready job based on the scheduling policy.
    fn next_ready(&self) -> Option<Job> {
        let mut ready = self.inner.ready.lock();
        if ready.is_empty() {
            return None;
        }

        match &self.inner.config.policy {
            SchedulingPolicy::Fifo => ready.pop_front(),
            SchedulingPolicy::Lifo => ready.pop_back(),
            SchedulingPolicy::SeededRandom(_) => {
                if ready.len() == 1 {
                    ready.pop_front()
                } else {
                    let mut state = self.inner.random_state.lock();
                    let mut x = *state;
                    x ^= x << 13;
                    x ^= x >> 7;
                    x ^= x << 17;
                    *state = x;

                    #[allow(clippy::cast_possible_truncation)]
                    let idx = (x as usize) % ready.len();
                    ready.remove(idx)
                }
            }
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("now", &self.now())
            .field("jobs", &self.pending_jobs())
            .field("timers", &self.pending_timers())
            .field("interceptors", &self.interceptor_depth())
            .finish()
    }
}
