//! Invocation outcomes and the failure taxonomy.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::error::{Error, Fault};
use crate::invoker::convention::CallingConvention;
use crate::invoker::coordinator::InvocationHandle;

/// Why an invocation failed.
///
/// Every variant is terminal for its invocation; nothing is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    /// The function declared a completion callback and also returned a
    /// thenable. Detected before any waiting starts.
    #[error("function accepts a callback and also returns a promise")]
    DualInterface,

    /// The function failed during the initial call.
    #[error("{0}")]
    Synchronous(Fault),

    /// The function passed an error to its completion callback.
    #[error("{0}")]
    Callback(Fault),

    /// The timeout elapsed before the function signalled completion.
    #[error("function timed out after {millis} milliseconds")]
    Timeout {
        /// The configured timeout.
        millis: u64,
    },

    /// A fault surfaced from deferred work while the invocation was pending.
    #[error("{0}")]
    Async(Fault),

    /// The returned promise rejected.
    #[error("{0}")]
    Rejected(Fault),

    /// The returned promise rejected without a reason.
    #[error("function returned a promise that rejected without a reason")]
    RejectedWithoutReason,

    /// The declared parameter count fits neither calling convention.
    #[error("{definition} has {declared} parameters, should have {expected}")]
    InvalidArity {
        /// What kind of definition was checked.
        definition: String,
        /// Parameters the definition declares.
        declared: usize,
        /// Human-readable accepted counts, e.g. `0 or 1`.
        expected: String,
    },

    /// The event loop ran out of work before the function signalled
    /// completion, so it never can.
    #[error("function never signalled completion and no work remains")]
    Stalled,

    /// The event loop itself failed while waiting.
    #[error(transparent)]
    Runtime(#[from] Error),
}

impl InvocationError {
    /// Coarse classification for reporting.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            InvocationError::DualInterface => FailureKind::DualInterface,
            InvocationError::Timeout { .. } => FailureKind::Timeout,
            _ => FailureKind::Error,
        }
    }

    /// The user fault behind this error, if there is one.
    #[must_use]
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            InvocationError::Synchronous(fault)
            | InvocationError::Callback(fault)
            | InvocationError::Async(fault)
            | InvocationError::Rejected(fault) => Some(fault),
            _ => None,
        }
    }
}

/// The failure kinds downstream reporting distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The function threw, rejected, or reported an error.
    Error,
    /// The function was too slow.
    Timeout,
    /// The function is written wrong: callback and promise at once.
    DualInterface,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Error => write!(f, "Error"),
            FailureKind::Timeout => write!(f, "TimeoutError"),
            FailureKind::DualInterface => write!(f, "DualInterfaceError"),
        }
    }
}

/// The record handed to reporting once an invocation has finished.
#[derive(Debug)]
pub struct Completion<T> {
    /// The single outcome of the invocation.
    pub result: Result<T, InvocationError>,
    /// Time between dispatch and completion on the event loop's clock.
    pub duration: Duration,
    /// State of the finished invocation.
    pub invocation: InvocationHandle,
}

impl<T> Completion<T> {
    /// Returns `true` if the invocation succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The failure kind, if the invocation failed.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.result.as_ref().err().map(InvocationError::kind)
    }

    /// The detected calling convention, if dispatch got that far.
    #[must_use]
    pub fn convention(&self) -> Option<CallingConvention> {
        self.invocation.convention()
    }

    /// Discards the bookkeeping and returns the outcome.
    ///
    /// # Errors
    ///
    /// Returns the invocation's failure.
    pub fn into_result(self) -> Result<T, InvocationError> {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(InvocationError::DualInterface.kind(), FailureKind::DualInterface);
        assert_eq!(InvocationError::Timeout { millis: 5 }.kind(), FailureKind::Timeout);
        assert_eq!(InvocationError::RejectedWithoutReason.kind(), FailureKind::Error);
        assert_eq!(
            InvocationError::Async(Fault::new("late throw")).kind(),
            FailureKind::Error
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            InvocationError::DualInterface.to_string(),
            "function accepts a callback and also returns a promise"
        );
        assert_eq!(
            InvocationError::Timeout { millis: 50 }.to_string(),
            "function timed out after 50 milliseconds"
        );
        assert_eq!(
            InvocationError::RejectedWithoutReason.to_string(),
            "function returned a promise that rejected without a reason"
        );
        assert_eq!(InvocationError::Rejected(Fault::new("boom")).to_string(), "boom");
        assert_eq!(
            InvocationError::InvalidArity {
                definition: "lifecycle hook".to_string(),
                declared: 3,
                expected: "0 or 1".to_string(),
            }
            .to_string(),
            "lifecycle hook has 3 parameters, should have 0 or 1"
        );
    }

    #[test]
    fn test_fault_accessor() {
        let fault = Fault::new("thrown");
        assert_eq!(
            InvocationError::Synchronous(fault.clone()).fault(),
            Some(&fault)
        );
        assert_eq!(InvocationError::Stalled.fault(), None);
    }

    #[test]
    fn test_runtime_from_error() {
        let err: InvocationError = Error::StepLimit(3).into();
        assert_eq!(err.to_string(), "Event loop exceeded 3 steps without settling");
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::Timeout.to_string(), "TimeoutError");
        assert_eq!(FailureKind::DualInterface.to_string(), "DualInterfaceError");
        assert_eq!(FailureKind::Error.to_string(), "Error");
    }
}
