//! Error definitions
//!
//! Two families of errors live here:
//!
//! - [`Fault`] is what *user code* raises: returned from a job or a user
//!   function, passed to a completion callback, or produced from a panic.
//! - [`Error`] is what the *runtime* reports about itself, such as an event
//!   loop that never settles.
//!
//! Invocation outcomes use [`InvocationError`](crate::invoker::InvocationError),
//! which wraps both.

use std::any::Any;
use std::fmt;

use thiserror::Error;

/// Main error type for the event loop and invoker runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The event loop ran the configured number of steps without going idle.
    #[error("Event loop exceeded {0} steps without settling")]
    StepLimit(usize),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Where a [`Fault`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultOrigin {
    /// Returned as an `Err` value.
    Raised,
    /// Caught while unwinding from a panic.
    Panic,
}

impl fmt::Display for FaultOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultOrigin::Raised => write!(f, "raised"),
            FaultOrigin::Panic => write!(f, "panic"),
        }
    }
}

/// An error raised by user code.
///
/// # Example
///
/// ```rust
/// use step_invoker::error::{Fault, FaultOrigin};
///
/// let fault = Fault::from("boom");
/// assert_eq!(fault.message(), "boom");
/// assert_eq!(fault.origin(), FaultOrigin::Raised);
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Fault {
    message: String,
    origin: FaultOrigin,
}

impl Fault {
    /// Create a fault with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            origin: FaultOrigin::Raised,
        }
    }

    /// Convert a panic payload into a fault.
    ///
    /// `&str` and `String` payloads keep their text; anything else gets a
    /// generic message.
    #[must_use]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panicked with a non-string payload".to_string()
        };
        Self {
            message,
            origin: FaultOrigin::Panic,
        }
    }

    /// Wrap any standard error, keeping its display text.
    #[must_use]
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        Self::new(error.to_string())
    }

    /// The fault's message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Where the fault came from.
    #[must_use]
    pub fn origin(&self) -> FaultOrigin {
        self.origin
    }

    /// Returns `true` if the fault was produced by a panic.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        self.origin == FaultOrigin::Panic
    }
}

impl From<&str> for Fault {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for Fault {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_from_str_payload() {
        let payload: Box<dyn Any + Send> = Box::new("exploded");
        let fault = Fault::from_panic(payload);
        assert_eq!(fault.message(), "exploded");
        assert!(fault.is_panic());
    }

    #[test]
    fn test_fault_from_string_payload() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("formatted 7"));
        let fault = Fault::from_panic(payload);
        assert_eq!(fault.message(), "formatted 7");
    }

    #[test]
    fn test_fault_from_opaque_payload() {
        let payload: Box<dyn Any + Send> = Box::new(17_u32);
        let fault = Fault::from_panic(payload);
        assert_eq!(fault.message(), "panicked with a non-string payload");
        assert_eq!(fault.origin(), FaultOrigin::Panic);
    }

    #[test]
    fn test_fault_display_is_message() {
        let fault = Fault::new("bad input");
        assert_eq!(fault.to_string(), "bad input");
        assert!(!fault.is_panic());
    }

    #[test]
    fn test_fault_from_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        assert_eq!(Fault::from_error(&io).message(), "disk gone");
    }

    #[test]
    fn test_step_limit_message() {
        assert_eq!(
            Error::StepLimit(10).to_string(),
            "Event loop exceeded 10 steps without settling"
        );
    }
}
