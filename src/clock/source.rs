//! The time abstraction shared by mock and real clocks.

use std::time::{Duration, Instant};

/// A source of time for the event loop.
///
/// Times are durations since the source's own epoch, so mock and real
/// clocks are interchangeable.
///
/// # Implementations
///
/// - [`MockClock`](crate::clock::MockClock) - virtual time, never blocks
/// - [`SystemClock`] - wall-clock time, blocks the calling thread
pub trait TimeSource: Send + Sync {
    /// Current time as a duration since the source's epoch.
    fn now(&self) -> Duration;

    /// Block until `deadline` has been reached.
    ///
    /// Returns immediately if the deadline is already in the past.
    fn wait_until(&self, deadline: Duration);
}

/// Wall-clock time measured from when the clock was created.
#[derive(Debug, Clone)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    /// Create a clock whose epoch is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn wait_until(&self, deadline: Duration) {
        let now = self.now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}
