//! Exactly-once invocation of user functions
//!
//! The [`Invoker`] calls a [`UserFunction`] once, works out how it signals
//! completion, and reduces every possible signal to a single
//! `Result<T, InvocationError>` handed to the caller:
//!
//! - a plain return value completes immediately;
//! - a function declaring one extra parameter receives a [`Done`] callback;
//! - a returned [`Thenable`](crate::promise::Thenable) is awaited.
//!
//! Deferred conventions race the function's own signal against a timeout
//! and against faults raised by deferred work on the [`EventLoop`]. The
//! first trigger wins; the rest are dropped.
//!
//! # Example
//!
//! ```rust
//! use step_invoker::event_loop::EventLoop;
//! use step_invoker::invoker::{InvocationError, InvocationRequest, Invoker, Returned, UserFunction};
//! use std::time::Duration;
//!
//! let event_loop = EventLoop::new();
//! let invoker = Invoker::new(event_loop.clone());
//!
//! // Declares one parameter beyond its arguments, so it gets a callback
//! // it never calls.
//! let silent: UserFunction<&str> = UserFunction::new(1, |_| Ok(Returned::Value("ignored")));
//! let completion = invoker.run(InvocationRequest::new(silent).with_timeout_millis(50));
//!
//! assert_eq!(completion.result, Err(InvocationError::Timeout { millis: 50 }));
//! assert_eq!(completion.duration, Duration::from_millis(50));
//! ```

mod convention;
mod coordinator;
mod dispatch;
mod outcome;
mod request;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

pub use convention::{accepts_callback, CallingConvention};
pub use coordinator::{InvocationHandle, InvocationId, Phase};
pub use outcome::{Completion, FailureKind, InvocationError};
pub use request::{Body, Call, Done, InvocationRequest, Returned, UserFunction};

use crate::error::Fault;
use crate::event_loop::EventLoop;
use coordinator::Coordinator;

/// What happens to completion signals that arrive after an invocation has
/// already finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LateSignalPolicy {
    /// Drop them, recording a `debug` event.
    #[default]
    Drop,
    /// Drop them, recording a `warn` event.
    Log,
}

/// Configuration for an [`Invoker`].
///
/// # Example
///
/// ```rust
/// use step_invoker::invoker::{InvokerConfig, LateSignalPolicy};
/// use std::time::Duration;
///
/// let config = InvokerConfig::new()
///     .with_default_timeout(Duration::from_secs(5))
///     .with_late_signals(LateSignalPolicy::Log);
/// assert_eq!(config.default_timeout, Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InvokerConfig {
    /// Timeout for requests that do not set their own.
    pub default_timeout: Option<Duration>,
    /// Handling of signals that lose the race.
    pub late_signals: LateSignalPolicy,
}

impl InvokerConfig {
    /// No default timeout; late signals dropped quietly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout used when a request has none. Zero disables it.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Sets the late-signal policy.
    #[must_use]
    pub fn with_late_signals(mut self, policy: LateSignalPolicy) -> Self {
        self.late_signals = policy;
        self
    }

    /// The timeout that applies to a request, `None` meaning no timer.
    #[must_use]
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Option<Duration> {
        requested
            .or(self.default_timeout)
            .filter(|timeout| !timeout.is_zero())
    }
}

/// Calls user functions on an [`EventLoop`].
///
/// Cheap to clone; clones share the loop.
#[derive(Clone)]
pub struct Invoker {
    event_loop: EventLoop,
    config: InvokerConfig,
}

impl Invoker {
    /// An invoker with the default configuration.
    #[must_use]
    pub fn new(event_loop: EventLoop) -> Self {
        Self::with_config(event_loop, InvokerConfig::default())
    }

    /// An invoker with a custom configuration.
    #[must_use]
    pub fn with_config(event_loop: EventLoop, config: InvokerConfig) -> Self {
        Self { event_loop, config }
    }

    /// The loop invocations run on.
    #[must_use]
    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    /// Starts an invocation.
    ///
    /// `on_complete` is called exactly once. For direct returns, synchronous
    /// failures, arity errors and dual-interface functions that happens
    /// before `invoke` returns; otherwise it happens on a later step of the
    /// event loop, which the caller is responsible for driving.
    pub fn invoke<T, W, F>(&self, request: InvocationRequest<T, W>, on_complete: F) -> InvocationHandle
    where
        T: Send + 'static,
        W: Send + 'static,
        F: FnOnce(Result<T, InvocationError>) + Send + 'static,
    {
        self.start(request, Box::new(on_complete)).handle()
    }

    fn start<T, W>(
        &self,
        request: InvocationRequest<T, W>,
        on_complete: Box<dyn FnOnce(Result<T, InvocationError>) + Send>,
    ) -> Arc<Coordinator<T>>
    where
        T: Send + 'static,
        W: Send + 'static,
    {
        let InvocationRequest {
            function,
            arguments,
            receiver,
            timeout,
        } = request;
        let (name, declared, body) = function.into_parts();

        let coordinator = Coordinator::new(
            self.event_loop.clone(),
            name,
            self.config.late_signals,
            on_complete,
        );

        let wants_callback = match accepts_callback("function", declared, arguments.len()) {
            Ok(wants_callback) => wants_callback,
            Err(err) => {
                coordinator.finish(Err(err));
                return coordinator;
            }
        };

        let done = wants_callback.then(|| {
            let target = Arc::clone(&coordinator);
            Done::new(move |result: Result<T, Fault>| {
                target.finish(result.map_err(InvocationError::Callback));
            })
        });
        let call = Call::new(arguments, receiver, done, self.event_loop.clone());

        coordinator.mark_dispatched();
        tracing::debug!(
            invocation = %coordinator.id(),
            name = ?coordinator.name(),
            declared,
            callback = wants_callback,
            "invoke.dispatch"
        );

        let returned = match dispatch::dispatch(body, call) {
            Ok(returned) => returned,
            Err(fault) => {
                coordinator.finish(Err(InvocationError::Synchronous(fault)));
                return coordinator;
            }
        };

        let convention = CallingConvention::classify(wants_callback, returned.is_thenable());
        coordinator.set_convention(convention);
        let timeout = self.config.effective_timeout(timeout);

        // arms follow the `classify` table one to one
        match (wants_callback, returned) {
            // DualInterface: the thenable is dropped unobserved
            (true, Returned::Thenable(_)) => {
                coordinator.finish(Err(InvocationError::DualInterface));
            }
            // CallbackStyle: the return value is ignored
            (true, Returned::Value(_)) => {
                coordinator.await_completion(timeout);
            }
            // PromiseStyle
            (false, Returned::Thenable(thenable)) => {
                coordinator.await_completion(timeout);
                let fulfilled = Arc::clone(&coordinator);
                let rejected = Arc::clone(&coordinator);
                thenable.then(
                    Box::new(move |value: T| {
                        fulfilled.finish(Ok(value));
                    }),
                    Box::new(move |reason: Option<Fault>| {
                        rejected.finish(Err(
                            reason.map_or(InvocationError::RejectedWithoutReason, InvocationError::Rejected)
                        ));
                    }),
                );
            }
            // DirectReturn
            (false, Returned::Value(value)) => {
                coordinator.finish(Ok(value));
            }
        }

        coordinator
    }

    /// Invokes and drives the event loop until the invocation finishes.
    ///
    /// If the loop runs out of work first, the function can no longer
    /// signal and the invocation is finished with
    /// [`InvocationError::Stalled`]. A loop error such as hitting the step
    /// limit finishes it with [`InvocationError::Runtime`]. Either way the
    /// interceptor is released and any signal arriving later is dropped as
    /// late.
    pub fn run<T, W>(&self, request: InvocationRequest<T, W>) -> Completion<T>
    where
        T: Send + 'static,
        W: Send + 'static,
    {
        let started = self.event_loop.now();
        let slot: Arc<Mutex<Option<Result<T, InvocationError>>>> = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&slot);
        let coordinator = self.start(
            request,
            Box::new(move |result: Result<T, InvocationError>| {
                *sink.lock() = Some(result);
            }),
        );

        let abandoned = match self.event_loop.run_until(|| slot.lock().is_some()) {
            Ok(true) => None,
            Ok(false) => Some(InvocationError::Stalled),
            Err(err) => Some(InvocationError::Runtime(err)),
        };
        if let Some(err) = abandoned {
            tracing::warn!(invocation = %coordinator.id(), error = %err, "invoke.abandoned");
            coordinator.finish(Err(err));
        }

        let result = slot.lock().take().unwrap_or(Err(InvocationError::Stalled));
        let invocation = coordinator.handle();

        Completion {
            result,
            duration: self.event_loop.now().saturating_sub(started),
            invocation,
        }
    }
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoker")
            .field("config", &self.config)
            .field("now", &self.event_loop.now())
            .finish_non_exhaustive()
    }
}
