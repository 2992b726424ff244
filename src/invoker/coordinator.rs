//! The first-wins completion race.
//!
//! A pending invocation can be finished by three triggers: its own
//! completion signal, its timer, or a fault intercepted from deferred work.
//! All three go through [`Coordinator::finish`], which lets exactly one of
//! them through, runs cleanup once, and counts the rest as late signals.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::TimerId;
use crate::event_loop::{EventLoop, InterceptHandle};
use crate::invoker::convention::CallingConvention;
use crate::invoker::outcome::InvocationError;
use crate::invoker::LateSignalPolicy;

/// Unique identifier for an invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InvocationId(u64);

impl InvocationId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invocation({})", self.0)
    }
}

/// Lifecycle of one invocation.
///
/// `Created → Dispatched → Pending → Finished`, or straight from
/// `Dispatched` to `Finished` when the outcome is known immediately.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Request accepted, function not yet called.
    Created,
    /// Function is being called.
    Dispatched,
    /// Waiting for a completion trigger.
    Pending,
    /// Outcome delivered. Terminal.
    Finished,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Created => write!(f, "Created"),
            Phase::Dispatched => write!(f, "Dispatched"),
            Phase::Pending => write!(f, "Pending"),
            Phase::Finished => write!(f, "Finished"),
        }
    }
}

/// Type-independent bookkeeping, shared with [`InvocationHandle`].
struct Tracker {
    id: InvocationId,
    name: Option<String>,
    phase: Mutex<Phase>,
    convention: Mutex<Option<CallingConvention>>,
    went_pending: AtomicBool,
    timer_created: AtomicBool,
    interceptor_installed: AtomicBool,
    late_signals: AtomicUsize,
    cleanups: AtomicUsize,
}

/// Read-only view of an invocation's state.
///
/// # Example
///
/// ```rust
/// use step_invoker::event_loop::EventLoop;
/// use step_invoker::invoker::{InvocationRequest, Invoker, Phase, Returned, UserFunction};
///
/// let invoker = Invoker::new(EventLoop::new());
/// let function: UserFunction<i32> = UserFunction::new(0, |_| Ok(Returned::Value(42)));
///
/// let handle = invoker.invoke(InvocationRequest::new(function), |_| {});
/// assert_eq!(handle.phase(), Phase::Finished);
/// assert!(handle.completed_immediately());
/// assert!(!handle.timer_created());
/// ```
#[derive(Clone)]
pub struct InvocationHandle {
    tracker: Arc<Tracker>,
}

impl InvocationHandle {
    /// The invocation's ID.
    #[must_use]
    pub fn id(&self) -> InvocationId {
        self.tracker.id
    }

    /// The function's name, if it had one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.tracker.name.as_deref()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.tracker.phase.lock()
    }

    /// Returns `true` once the outcome has been delivered.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.phase() == Phase::Finished
    }

    /// The detected convention; `None` if the call failed before the
    /// return value could be inspected.
    #[must_use]
    pub fn convention(&self) -> Option<CallingConvention> {
        *self.tracker.convention.lock()
    }

    /// Returns `true` if the invocation finished without ever waiting.
    #[must_use]
    pub fn completed_immediately(&self) -> bool {
        self.is_finished() && !self.tracker.went_pending.load(Ordering::Acquire)
    }

    /// Returns `true` if a timeout timer was ever scheduled.
    #[must_use]
    pub fn timer_created(&self) -> bool {
        self.tracker.timer_created.load(Ordering::Acquire)
    }

    /// Returns `true` if an interceptor was ever installed.
    #[must_use]
    pub fn interceptor_installed(&self) -> bool {
        self.tracker.interceptor_installed.load(Ordering::Acquire)
    }

    /// Completion signals that arrived after the invocation had finished
    /// and were dropped.
    #[must_use]
    pub fn late_signals(&self) -> usize {
        self.tracker.late_signals.load(Ordering::Acquire)
    }

    /// Times cleanup ran. Never more than one.
    #[must_use]
    pub fn cleanups(&self) -> usize {
        self.tracker.cleanups.load(Ordering::Acquire)
    }
}

impl fmt::Debug for InvocationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationHandle")
            .field("id", &self.tracker.id)
            .field("name", &self.tracker.name)
            .field("phase", &self.phase())
            .field("convention", &self.convention())
            .field("late_signals", &self.late_signals())
            .finish()
    }
}

/// Whole milliseconds for reporting, rounded up so a sub-millisecond
/// timeout never reads as zero.
fn timeout_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

type Handler<T> = Box<dyn FnOnce(Result<T, InvocationError>) + Send>;

/// Owns the race for one invocation.
pub(crate) struct Coordinator<T> {
    tracker: Arc<Tracker>,
    finished: AtomicBool,
    handler: Mutex<Option<Handler<T>>>,
    timer: Mutex<Option<TimerId>>,
    intercept: Mutex<Option<InterceptHandle>>,
    event_loop: EventLoop,
    late_policy: LateSignalPolicy,
}

impl<T: Send + 'static> Coordinator<T> {
    pub fn new(
        event_loop: EventLoop,
        name: Option<String>,
        late_policy: LateSignalPolicy,
        handler: Handler<T>,
    ) -> Arc<Self> {
        Arc::new(Self {
            tracker: Arc::new(Tracker {
                id: InvocationId::new(),
                name,
                phase: Mutex::new(Phase::Created),
                convention: Mutex::new(None),
                went_pending: AtomicBool::new(false),
                timer_created: AtomicBool::new(false),
                interceptor_installed: AtomicBool::new(false),
                late_signals: AtomicUsize::new(0),
                cleanups: AtomicUsize::new(0),
            }),
            finished: AtomicBool::new(false),
            handler: Mutex::new(Some(handler)),
            timer: Mutex::new(None),
            intercept: Mutex::new(None),
            event_loop,
            late_policy,
        })
    }

    pub fn handle(&self) -> InvocationHandle {
        InvocationHandle {
            tracker: Arc::clone(&self.tracker),
        }
    }

    pub fn id(&self) -> InvocationId {
        self.tracker.id
    }

    pub fn name(&self) -> Option<&str> {
        self.tracker.name.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn mark_dispatched(&self) {
        self.set_phase(Phase::Dispatched);
    }

    pub fn set_convention(&self, convention: CallingConvention) {
        *self.tracker.convention.lock() = Some(convention);
    }

    /// Delivers `result` if nothing has been delivered yet.
    ///
    /// Returns `false` when another trigger already won; the result is then
    /// dropped and counted as a late signal.
    pub fn finish(&self, result: Result<T, InvocationError>) -> bool {
        if self
            .finished
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.record_late(&result);
            return false;
        }

        self.release();
        self.tracker.cleanups.fetch_add(1, Ordering::AcqRel);
        self.set_phase(Phase::Finished);

        match &result {
            Ok(_) => tracing::debug!(invocation = %self.id(), name = ?self.tracker.name, "invoke.finish"),
            Err(err) => tracing::debug!(
                invocation = %self.id(),
                name = ?self.tracker.name,
                kind = %err.kind(),
                error = %err,
                "invoke.finish"
            ),
        }

        let handler = self.handler.lock().take();
        if let Some(handler) = handler {
            handler(result);
        }
        true
    }

    /// Enters the pending state: installs the interceptor, then arms the
    /// timer when there is a timeout.
    ///
    /// Does nothing if the function already signalled completion during the
    /// initial call.
    pub fn await_completion(self: &Arc<Self>, timeout: Option<Duration>) {
        if self.is_finished() {
            return;
        }
        self.tracker.went_pending.store(true, Ordering::Release);
        self.set_phase(Phase::Pending);

        self.install_interceptor();
        if let Some(timeout) = timeout {
            self.arm_timeout(timeout);
        }
        tracing::debug!(invocation = %self.id(), timeout = ?timeout, "invoke.pending");
    }

    fn install_interceptor(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = self.event_loop.install_interceptor(move |fault| {
            this.finish(Err(InvocationError::Async(fault)));
        });
        self.tracker
            .interceptor_installed
            .store(true, Ordering::Release);
        *self.intercept.lock() = Some(handle);
        // a finish racing the install would have found the slot empty
        if self.is_finished() {
            self.release();
        }
    }

    fn arm_timeout(self: &Arc<Self>, timeout: Duration) {
        let millis = timeout_millis(timeout);
        let this = Arc::clone(self);
        let id = self.event_loop.set_timeout(timeout, move || {
            this.finish(Err(InvocationError::Timeout { millis }));
            Ok(())
        });
        self.tracker.timer_created.store(true, Ordering::Release);
        *self.timer.lock() = Some(id);
        if self.is_finished() {
            self.release();
        }
    }

    /// Cancels the timer and uninstalls the interceptor. Idempotent.
    fn release(&self) {
        let timer = self.timer.lock().take();
        if let Some(id) = timer {
            self.event_loop.clear_timeout(id);
        }
        let intercept = self.intercept.lock().take();
        if let Some(handle) = intercept {
            handle.uninstall();
        }
    }

    fn record_late(&self, result: &Result<T, InvocationError>) {
        let count = self.tracker.late_signals.fetch_add(1, Ordering::AcqRel) + 1;
        let signal = match result {
            Ok(_) => "success".to_string(),
            Err(err) => err.to_string(),
        };
        match self.late_policy {
            LateSignalPolicy::Drop => tracing::debug!(
                invocation = %self.id(),
                signal = %signal,
                count,
                "invoke.late_signal"
            ),
            LateSignalPolicy::Log => tracing::warn!(
                invocation = %self.id(),
                name = ?self.tracker.name,
                signal = %signal,
                count,
                "invoke.late_signal"
            ),
        }
    }

    fn set_phase(&self, phase: Phase) {
        let mut current = self.tracker.phase.lock();
        if *current != Phase::Finished {
            *current = phase;
        }
    }
}
