//! Calling-convention detection.

use std::fmt;

use crate::invoker::outcome::InvocationError;

/// How a user function signals completion.
///
/// Computed once per invocation from two facts: whether the function
/// declares a trailing completion parameter, and whether its return value
/// is a [`Thenable`](crate::promise::Thenable).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallingConvention {
    /// No completion parameter and a plain return value.
    DirectReturn,
    /// Completion parameter declared; the function calls it when done.
    CallbackStyle,
    /// No completion parameter; the function returned a thenable.
    PromiseStyle,
    /// Completion parameter declared *and* a thenable returned.
    DualInterface,
}

impl CallingConvention {
    /// Classifies a dispatched call.
    ///
    /// ```rust
    /// use step_invoker::invoker::CallingConvention;
    ///
    /// assert_eq!(CallingConvention::classify(false, false), CallingConvention::DirectReturn);
    /// assert_eq!(CallingConvention::classify(true, false), CallingConvention::CallbackStyle);
    /// assert_eq!(CallingConvention::classify(false, true), CallingConvention::PromiseStyle);
    /// assert_eq!(CallingConvention::classify(true, true), CallingConvention::DualInterface);
    /// ```
    #[must_use]
    pub fn classify(accepts_callback: bool, returned_thenable: bool) -> Self {
        match (accepts_callback, returned_thenable) {
            (false, false) => CallingConvention::DirectReturn,
            (true, false) => CallingConvention::CallbackStyle,
            (false, true) => CallingConvention::PromiseStyle,
            (true, true) => CallingConvention::DualInterface,
        }
    }

    /// Returns `true` for conventions that wait for a later signal.
    #[must_use]
    pub fn is_deferred(self) -> bool {
        matches!(
            self,
            CallingConvention::CallbackStyle | CallingConvention::PromiseStyle
        )
    }
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallingConvention::DirectReturn => write!(f, "direct-return"),
            CallingConvention::CallbackStyle => write!(f, "callback"),
            CallingConvention::PromiseStyle => write!(f, "promise"),
            CallingConvention::DualInterface => write!(f, "dual-interface"),
        }
    }
}

/// Decides whether a completion callback is appended to the arguments.
///
/// A definition declaring one parameter more than the arguments supplied
/// expects the callback last. Declaring exactly as many means it does not.
///
/// # Errors
///
/// Any other count is rejected with [`InvocationError::InvalidArity`],
/// naming `definition`.
pub fn accepts_callback(
    definition: &str,
    declared: usize,
    supplied: usize,
) -> Result<bool, InvocationError> {
    if declared == supplied + 1 {
        Ok(true)
    } else if declared == supplied {
        Ok(false)
    } else {
        Err(InvocationError::InvalidArity {
            definition: definition.to_string(),
            declared,
            expected: format!("{supplied} or {}", supplied + 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_parameter_means_callback() {
        assert_eq!(accepts_callback("function", 3, 2), Ok(true));
        assert_eq!(accepts_callback("function", 1, 0), Ok(true));
    }

    #[test]
    fn test_exact_parameters_means_no_callback() {
        assert_eq!(accepts_callback("function", 2, 2), Ok(false));
        assert_eq!(accepts_callback("function", 0, 0), Ok(false));
    }

    #[test]
    fn test_other_counts_rejected() {
        let err = accepts_callback("step definition", 4, 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "step definition has 4 parameters, should have 1 or 2"
        );
        assert!(accepts_callback("function", 0, 1).is_err());
    }

    #[test]
    fn test_deferred_conventions() {
        assert!(!CallingConvention::DirectReturn.is_deferred());
        assert!(CallingConvention::CallbackStyle.is_deferred());
        assert!(CallingConvention::PromiseStyle.is_deferred());
        assert!(!CallingConvention::DualInterface.is_deferred());
    }
}
