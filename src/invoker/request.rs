//! What the caller hands the invoker, and what the user function receives.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Fault;
use crate::event_loop::EventLoop;
use crate::promise::{Promise, Thenable};

/// What a user function returns from its initial call.
pub enum Returned<T> {
    /// A plain value.
    Value(T),
    /// A deferred result with a continuation contract.
    Thenable(Box<dyn Thenable<T>>),
}

impl<T> Returned<T> {
    /// Wraps any thenable.
    pub fn thenable(thenable: impl Thenable<T> + 'static) -> Self {
        Returned::Thenable(Box::new(thenable))
    }

    /// Returns `true` if the value exposes a continuation contract.
    #[must_use]
    pub fn is_thenable(&self) -> bool {
        matches!(self, Returned::Thenable(_))
    }
}

impl<T: Send + 'static> From<Promise<T>> for Returned<T> {
    fn from(promise: Promise<T>) -> Self {
        Returned::Thenable(Box::new(promise))
    }
}

impl<T: fmt::Debug> fmt::Debug for Returned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Returned::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Returned::Thenable(_) => f.write_str("Thenable(..)"),
        }
    }
}

/// The completion callback handed to callback-style functions.
///
/// Cloneable and callable any number of times; only the first call that
/// reaches the invocation counts.
pub struct Done<T> {
    deliver: Arc<dyn Fn(Result<T, Fault>) + Send + Sync>,
}

impl<T> Done<T> {
    pub(crate) fn new<F>(deliver: F) -> Self
    where
        F: Fn(Result<T, Fault>) + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Signals completion with an outcome.
    pub fn call(&self, result: Result<T, Fault>) {
        (self.deliver)(result);
    }

    /// Signals success.
    pub fn ok(&self, value: T) {
        self.call(Ok(value));
    }

    /// Signals failure.
    pub fn fail(&self, fault: impl Into<Fault>) {
        self.call(Err(fault.into()));
    }
}

impl<T> Clone for Done<T> {
    fn clone(&self) -> Self {
        Self {
            deliver: Arc::clone(&self.deliver),
        }
    }
}

impl<T> fmt::Debug for Done<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Done").finish_non_exhaustive()
    }
}

/// Everything a user function receives for one call.
pub struct Call<T, W = ()> {
    arguments: Vec<T>,
    receiver: Option<W>,
    done: Option<Done<T>>,
    event_loop: EventLoop,
}

impl<T, W> Call<T, W> {
    pub(crate) fn new(
        arguments: Vec<T>,
        receiver: Option<W>,
        done: Option<Done<T>>,
        event_loop: EventLoop,
    ) -> Self {
        Self {
            arguments,
            receiver,
            done,
            event_loop,
        }
    }

    /// The arguments, in order.
    #[must_use]
    pub fn arguments(&self) -> &[T] {
        &self.arguments
    }

    /// The object the function runs against.
    #[must_use]
    pub fn receiver(&self) -> Option<&W> {
        self.receiver.as_ref()
    }

    /// The completion callback; present only for callback-style calls.
    #[must_use]
    pub fn done(&self) -> Option<Done<T>> {
        self.done.clone()
    }

    /// The loop the invocation runs on, for scheduling deferred work.
    #[must_use]
    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// Splits the call into owned arguments, receiver and callback.
    #[must_use]
    pub fn into_parts(self) -> (Vec<T>, Option<W>, Option<Done<T>>) {
        (self.arguments, self.receiver, self.done)
    }
}

impl<T, W> fmt::Debug for Call<T, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("arguments", &self.arguments.len())
            .field("has_receiver", &self.receiver.is_some())
            .field("has_done", &self.done.is_some())
            .finish_non_exhaustive()
    }
}

/// The boxed body of a [`UserFunction`].
pub type Body<T, W> = Box<dyn FnOnce(Call<T, W>) -> Result<Returned<T>, Fault> + Send>;

/// An opaque user callable plus its declared parameter count.
///
/// The declared count stands in for the parameter list of the function the
/// user wrote: declaring one more parameter than the arguments supplied is
/// how a function asks for a completion callback.
pub struct UserFunction<T, W = ()> {
    name: Option<String>,
    declared_params: usize,
    body: Body<T, W>,
}

impl<T, W> UserFunction<T, W> {
    /// Wraps `body`, which declares `declared_params` parameters.
    ///
    /// Returning `Err` or panicking during the call is a synchronous
    /// failure.
    pub fn new<F>(declared_params: usize, body: F) -> Self
    where
        F: FnOnce(Call<T, W>) -> Result<Returned<T>, Fault> + Send + 'static,
    {
        Self {
            name: None,
            declared_params,
            body: Box::new(body),
        }
    }

    /// Attaches a name used in logs.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The function's name, if one was given.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The declared parameter count.
    #[must_use]
    pub fn declared_params(&self) -> usize {
        self.declared_params
    }

    pub(crate) fn into_parts(self) -> (Option<String>, usize, Body<T, W>) {
        (self.name, self.declared_params, self.body)
    }
}

impl<T, W> fmt::Debug for UserFunction<T, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserFunction")
            .field("name", &self.name)
            .field("declared_params", &self.declared_params)
            .finish_non_exhaustive()
    }
}

/// A description of one call.
///
/// # Timeouts
///
/// `None` defers to the invoker's default timeout. An explicit zero
/// duration disables the timeout even when a default is configured.
///
/// # Example
///
/// ```rust
/// use step_invoker::invoker::{InvocationRequest, Returned, UserFunction};
/// use std::time::Duration;
///
/// let add: UserFunction<i64> = UserFunction::new(2, |call| {
///     let sum: i64 = call.arguments().iter().sum();
///     Ok(Returned::Value(sum))
/// });
/// let request = InvocationRequest::new(add)
///     .with_arguments(vec![2, 3])
///     .with_timeout_millis(250);
///
/// assert_eq!(request.timeout(), Some(Duration::from_millis(250)));
/// ```
pub struct InvocationRequest<T, W = ()> {
    pub(crate) function: UserFunction<T, W>,
    pub(crate) arguments: Vec<T>,
    pub(crate) receiver: Option<W>,
    pub(crate) timeout: Option<Duration>,
}

impl<T, W> InvocationRequest<T, W> {
    /// A request with no arguments, no receiver, and the default timeout.
    #[must_use]
    pub fn new(function: UserFunction<T, W>) -> Self {
        Self {
            function,
            arguments: Vec::new(),
            receiver: None,
            timeout: None,
        }
    }

    /// Sets the arguments.
    #[must_use]
    pub fn with_arguments(mut self, arguments: Vec<T>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Sets the receiver.
    #[must_use]
    pub fn with_receiver(mut self, receiver: W) -> Self {
        self.receiver = Some(receiver);
        self
    }

    /// Sets the timeout. Zero means no timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the timeout in milliseconds. Zero means no timeout.
    #[must_use]
    pub fn with_timeout_millis(self, millis: u64) -> Self {
        self.with_timeout(Duration::from_millis(millis))
    }

    /// The function to call.
    #[must_use]
    pub fn function(&self) -> &UserFunction<T, W> {
        &self.function
    }

    /// The arguments.
    #[must_use]
    pub fn arguments(&self) -> &[T] {
        &self.arguments
    }

    /// The requested timeout, if one was set.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl<T, W> fmt::Debug for InvocationRequest<T, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationRequest")
            .field("function", &self.function)
            .field("arguments", &self.arguments.len())
            .field("has_receiver", &self.receiver.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}
