//! Step definitions: reusable step bodies keyed by pattern.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Fault;
use crate::invoker::{accepts_callback, Call, InvocationError, InvocationRequest, Returned, UserFunction};
use crate::support::SharedBody;

/// A step body bound to the pattern it was registered under.
///
/// Matching the pattern against step text happens elsewhere; this type only
/// turns captured arguments into invocation requests.
///
/// # Example
///
/// ```rust
/// use step_invoker::event_loop::EventLoop;
/// use step_invoker::invoker::{Invoker, Returned};
/// use step_invoker::support::StepDefinition;
///
/// let step: StepDefinition<u32> = StepDefinition::new("I have {int} cukes", 1, |call| {
///     Ok(Returned::Value(call.arguments()[0] * 2))
/// });
///
/// let invoker = Invoker::new(EventLoop::new());
/// let request = step.request(vec![21], None).unwrap();
/// assert_eq!(invoker.run(request).result, Ok(42));
///
/// assert!(step.request(vec![1, 2, 3], None).is_err());
/// ```
pub struct StepDefinition<T, W = ()> {
    pattern: String,
    declared_params: usize,
    timeout: Option<Duration>,
    body: SharedBody<T, W>,
}

impl<T, W> StepDefinition<T, W>
where
    T: Send + 'static,
    W: Send + 'static,
{
    /// Defines a step whose body declares `declared_params` parameters.
    pub fn new<F>(pattern: impl Into<String>, declared_params: usize, body: F) -> Self
    where
        F: Fn(Call<T, W>) -> Result<Returned<T>, Fault> + Send + Sync + 'static,
    {
        Self {
            pattern: pattern.into(),
            declared_params,
            timeout: None,
            body: Arc::new(body),
        }
    }

    /// Sets a timeout for every invocation of this step.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The registered pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The declared parameter count.
    #[must_use]
    pub fn declared_params(&self) -> usize {
        self.declared_params
    }

    /// The step's own timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Builds a request for one execution of the step.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::InvalidArity`] unless the body declares
    /// exactly as many parameters as `arguments`, or one more.
    pub fn request(
        &self,
        arguments: Vec<T>,
        receiver: Option<W>,
    ) -> Result<InvocationRequest<T, W>, InvocationError> {
        accepts_callback("step definition", self.declared_params, arguments.len())?;

        let body = Arc::clone(&self.body);
        let function = UserFunction::new(self.declared_params, move |call| body(call)).named(self.pattern.clone());

        let mut request = InvocationRequest::new(function).with_arguments(arguments);
        if let Some(receiver) = receiver {
            request = request.with_receiver(receiver);
        }
        if let Some(timeout) = self.timeout {
            request = request.with_timeout(timeout);
        }
        Ok(request)
    }
}

impl<T, W> Clone for StepDefinition<T, W> {
    fn clone(&self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            declared_params: self.declared_params,
            timeout: self.timeout,
            body: Arc::clone(&self.body),
        }
    }
}

impl<T, W> fmt::Debug for StepDefinition<T, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("pattern", &self.pattern)
            .field("declared_params", &self.declared_params)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
