//! Time sources and timers for the event loop
//!
//! The `clock` module provides [`MockClock`](crate::clock::MockClock) for
//! virtual time, [`SystemClock`] for wall-clock time, and the
//! [`TimerQueue`] the event loop uses for `set_timeout`-style callbacks.
//!
//! # Example
//!
//! ```rust
//! use step_invoker::clock::MockClock;
//! use std::time::Duration;
//!
//! let clock = MockClock::new();
//! assert_eq!(clock.now(), Duration::ZERO);
//!
//! clock.advance(Duration::from_secs(10));
//! assert_eq!(clock.now(), Duration::from_secs(10));
//! ```

mod mock_clock;
mod source;
mod timer;

pub use mock_clock::MockClock;
pub use source::{SystemClock, TimeSource};
pub use timer::{TimerId, TimerQueue};
