//! `MockClock` implementation for virtual time control.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::TimeSource;

/// A virtual clock driven by the event loop instead of the wall clock.
///
/// When an [`EventLoop`](crate::event_loop::EventLoop) runs on a `MockClock`
/// and has nothing ready to do, it jumps the clock straight to the next timer
/// deadline. A 50ms timeout therefore elapses instantly while still being
/// observed, in order, at exactly 50ms.
///
/// # Thread Safety
///
/// Clones share the same underlying time.
///
/// # Example
///
/// ```rust
/// use step_invoker::clock::MockClock;
/// use std::time::Duration;
///
/// let clock = MockClock::new();
/// let clock2 = clock.clone();
///
/// clock.advance(Duration::from_millis(5));
/// assert_eq!(clock2.now(), Duration::from_millis(5));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<Duration>>,
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock {
    /// Creates a new `MockClock` starting at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::with_start_time(Duration::ZERO)
    }

    /// Creates a new `MockClock` starting at the specified time.
    ///
    /// ```rust
    /// use step_invoker::clock::MockClock;
    /// use std::time::Duration;
    ///
    /// let clock = MockClock::with_start_time(Duration::from_secs(100));
    /// assert_eq!(clock.now(), Duration::from_secs(100));
    /// ```
    #[must_use]
    pub fn with_start_time(start: Duration) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Returns the current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        *self.current.lock()
    }

    /// Moves the clock forward by `duration`.
    ///
    /// Timers are not fired here; the event loop notices expired deadlines
    /// on its next step.
    pub fn advance(&self, duration: Duration) {
        *self.current.lock() += duration;
    }

    /// Moves the clock forward to `time`.
    ///
    /// Time never goes backwards: a `time` at or before the current time is
    /// a no-op.
    pub fn advance_to(&self, time: Duration) {
        let mut current = self.current.lock();
        if time > *current {
            *current = time;
        }
    }
}

impl TimeSource for MockClock {
    fn now(&self) -> Duration {
        MockClock::now(self)
    }

    fn wait_until(&self, deadline: Duration) {
        self.advance_to(deadline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clock_starts_at_zero() {
        let clock = MockClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn test_advance() {
        let clock = MockClock::new();
        clock.advance(Duration::from_millis(10));
        clock.advance(Duration::from_millis(5));
        assert_eq!(clock.now(), Duration::from_millis(15));
    }

    #[test]
    fn test_advance_to_never_goes_backwards() {
        let clock = MockClock::new();
        clock.advance_to(Duration::from_secs(10));
        clock.advance_to(Duration::from_secs(5));
        assert_eq!(clock.now(), Duration::from_secs(10));
    }

    #[test]
    fn test_wait_until_jumps_instantly() {
        let clock = MockClock::new();
        let started = std::time::Instant::now();
        TimeSource::wait_until(&clock, Duration::from_secs(3600));
        assert_eq!(clock.now(), Duration::from_secs(3600));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_clone_shares_state() {
        let clock1 = MockClock::new();
        let clock2 = clock1.clone();

        clock1.advance(Duration::from_secs(10));
        assert_eq!(clock2.now(), Duration::from_secs(10));
    }

    #[test]
    fn test_thread_safety() {
        use std::thread;

        let clock = MockClock::new();
        let clock2 = clock.clone();

        let handle = thread::spawn(move || {
            for _ in 0..1000 {
                clock2.advance(Duration::from_millis(1));
            }
        });

        for _ in 0..1000 {
            clock.advance(Duration::from_millis(1));
        }

        handle.join().unwrap();
        assert_eq!(clock.now(), Duration::from_millis(2000));
    }
}
