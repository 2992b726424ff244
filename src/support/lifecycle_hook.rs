//! Before/after hooks that take no arguments.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Fault;
use crate::invoker::{accepts_callback, Call, InvocationError, InvocationRequest, Returned, UserFunction};
use crate::support::SharedBody;

/// A before/after hook.
///
/// Hooks receive no arguments. Declaring one parameter asks for a
/// completion callback; declaring none means the hook completes by return
/// value or promise.
pub struct LifecycleHook<T, W = ()> {
    name: Option<String>,
    declared_params: usize,
    timeout: Option<Duration>,
    body: SharedBody<T, W>,
}

impl<T, W> LifecycleHook<T, W>
where
    T: Send + 'static,
    W: Send + 'static,
{
    /// Defines a hook whose body declares `declared_params` parameters.
    pub fn new<F>(declared_params: usize, body: F) -> Self
    where
        F: Fn(Call<T, W>) -> Result<Returned<T>, Fault> + Send + Sync + 'static,
    {
        Self {
            name: None,
            declared_params,
            timeout: None,
            body: Arc::new(body),
        }
    }

    /// Attaches a name used in logs.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets a timeout for every run of this hook.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds a request for one run of the hook.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::InvalidArity`] unless the body declares
    /// zero or one parameters.
    pub fn request(&self, receiver: Option<W>) -> Result<InvocationRequest<T, W>, InvocationError> {
        accepts_callback("lifecycle hook", self.declared_params, 0)?;

        let body = Arc::clone(&self.body);
        let mut function = UserFunction::new(self.declared_params, move |call| body(call));
        if let Some(name) = &self.name {
            function = function.named(name.clone());
        }

        let mut request = InvocationRequest::new(function);
        if let Some(receiver) = receiver {
            request = request.with_receiver(receiver);
        }
        if let Some(timeout) = self.timeout {
            request = request.with_timeout(timeout);
        }
        Ok(request)
    }
}

impl<T, W> Clone for LifecycleHook<T, W> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            declared_params: self.declared_params,
            timeout: self.timeout,
            body: Arc::clone(&self.body),
        }
    }
}

impl<T, W> fmt::Debug for LifecycleHook<T, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHook")
            .field("name", &self.name)
            .field("declared_params", &self.declared_params)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
