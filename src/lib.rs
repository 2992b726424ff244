//! # step-invoker
//!
//! > Exactly-once, deadline-bounded invocation of user functions
//!
//! **step-invoker** calls a user-supplied function (a test step, a hook, a
//! lifecycle callback) and reduces however it chooses to finish into a
//! single outcome. Plain return values, completion callbacks and returned
//! promises are all accepted; deferred ones are raced against a timeout and
//! against faults thrown by the work they scheduled.
//!
//! ## Quick Start
//!
//! ```rust
//! use step_invoker::prelude::*;
//! use std::time::Duration;
//!
//! let invoker = Invoker::new(EventLoop::new());
//!
//! // Declares one parameter more than it is given, so it receives a
//! // completion callback.
//! let step: UserFunction<&str> = UserFunction::new(1, |call| {
//!     let done = call.done().expect("callback style");
//!     call.event_loop().set_timeout(Duration::from_millis(5), move || {
//!         done.ok("ok");
//!         Ok(())
//!     });
//!     Ok(Returned::Value("ignored"))
//! });
//!
//! let completion = invoker.run(InvocationRequest::new(step).with_timeout_millis(1000));
//! assert_eq!(completion.result, Ok("ok"));
//! assert_eq!(completion.duration, Duration::from_millis(5));
//! ```
//!
//! ## Features
//!
//! - **Convention detection** - direct return, callback, or promise
//! - **First-wins completion** - one outcome per invocation, late signals dropped
//! - **Timeouts** - on a virtual [`MockClock`](clock::MockClock) or the wall clock
//! - **Async fault interception** - errors from deferred work fail the right invocation
//! - **Deterministic event loop** - FIFO, LIFO or seeded-random job order

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Time sources and timers
pub mod clock;

pub mod error;
pub mod event_loop;
pub mod invoker;
pub mod promise;
pub mod support;

/// Prelude for convenient imports
///
/// ```rust
/// use step_invoker::prelude::*;
/// ```
pub mod prelude {
    pub use crate::clock::{MockClock, SystemClock, TimeSource};
    pub use crate::error::{Error, Fault, Result};
    pub use crate::event_loop::{EventLoop, EventLoopConfig, SchedulingPolicy};
    pub use crate::invoker::{
        Call, CallingConvention, Completion, Done, FailureKind, InvocationError, InvocationHandle,
        InvocationRequest, Invoker, InvokerConfig, LateSignalPolicy, Returned, UserFunction,
    };
    pub use crate::promise::{Promise, Resolver, Thenable};
    pub use crate::support::{LifecycleHook, StepDefinition};
}

// Re-exports
pub use error::{Error, Result};
pub use invoker::{InvocationError, Invoker};
