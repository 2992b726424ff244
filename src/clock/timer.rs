//! Deadline-ordered timer queue with cancellation.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::time::Duration;

/// Heap size below which cancelled entries are left for lazy removal.
const COMPACT_MIN: usize = 32;

/// Identifier of a scheduled timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl TimerId {
    /// Returns the raw ID value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timer({})", self.0)
    }
}

/// A heap slot. The payload lives in the queue's map so that cancelling
/// does not have to rebuild the heap.
#[derive(Debug)]
struct TimerEntry {
    deadline: Duration,
    id: TimerId,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior; equal deadlines fire in creation order
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Timers ordered by deadline, each carrying a payload `J`.
///
/// # Example
///
/// ```rust
/// use step_invoker::clock::TimerQueue;
/// use std::time::Duration;
///
/// let mut timers = TimerQueue::new();
/// let late = timers.schedule(Duration::from_millis(50), "late");
/// timers.schedule(Duration::from_millis(10), "early");
///
/// assert!(timers.cancel(late));
/// assert!(!timers.cancel(late)); // already gone
///
/// assert_eq!(timers.next_deadline(), Some(Duration::from_millis(10)));
/// let (_, payload) = timers.pop_expired(Duration::from_millis(60)).unwrap();
/// assert_eq!(payload, "early");
/// assert!(timers.is_empty());
/// ```
pub struct TimerQueue<J> {
    heap: BinaryHeap<TimerEntry>,
    payloads: HashMap<TimerId, J>,
    next_id: u64,
}

impl<J> TimerQueue<J> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            payloads: HashMap::new(),
            next_id: 0,
        }
    }

    /// Schedules `payload` to expire at `deadline`.
    pub fn schedule(&mut self, deadline: Duration, payload: J) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.heap.push(TimerEntry { deadline, id });
        self.payloads.insert(id, payload);
        id
    }

    /// Cancels a timer, dropping its payload.
    ///
    /// Returns `false` if the timer already fired or was already cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let removed = self.payloads.remove(&id).is_some();
        if removed {
            self.compact();
        }
        removed
    }

    /// Returns `true` if the timer is still scheduled.
    #[must_use]
    pub fn contains(&self, id: TimerId) -> bool {
        self.payloads.contains_key(&id)
    }

    /// The earliest live deadline, if any.
    pub fn next_deadline(&mut self) -> Option<Duration> {
        self.discard_cancelled();
        self.heap.peek().map(|entry| entry.deadline)
    }

    /// Removes and returns the earliest timer whose deadline is at or
    /// before `now`.
    pub fn pop_expired(&mut self, now: Duration) -> Option<(TimerId, J)> {
        self.discard_cancelled();
        match self.heap.peek() {
            Some(entry) if entry.deadline <= now => {
                let entry = self.heap.pop()?;
                self.payloads
                    .remove(&entry.id)
                    .map(|payload| (entry.id, payload))
            }
            _ => None,
        }
    }

    /// Number of live timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    /// Returns `true` if no timers are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Drops every cancelled entry once they make up most of the heap.
    fn compact(&mut self) {
        if self.heap.len() > COMPACT_MIN && self.heap.len() > 2 * self.payloads.len() {
            let payloads = &self.payloads;
            self.heap.retain(|entry| payloads.contains_key(&entry.id));
        }
    }

    fn discard_cancelled(&mut self) {
        while let Some(entry) = self.heap.peek() {
            if self.payloads.contains_key(&entry.id) {
                break;
            }
            self.heap.pop();
        }
    }
}

impl<J> Default for TimerQueue<J> {
    fn default() -> Self {
        Self::new()
    }
}

impl<J> fmt::Debug for TimerQueue<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerQueue")
            .field("live", &self.payloads.len())
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_pops_in_deadline_order() {
        let mut timers = TimerQueue::new();
        timers.schedule(ms(30), 3);
        timers.schedule(ms(10), 1);
        timers.schedule(ms(20), 2);

        let order: Vec<i32> = std::iter::from_fn(|| timers.pop_expired(ms(100)))
            .map(|(_, p)| p)
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_equal_deadlines_fire_in_creation_order() {
        let mut timers = TimerQueue::new();
        timers.schedule(ms(5), "a");
        timers.schedule(ms(5), "b");

        assert_eq!(timers.pop_expired(ms(5)).map(|(_, p)| p), Some("a"));
        assert_eq!(timers.pop_expired(ms(5)).map(|(_, p)| p), Some("b"));
    }

    #[test]
    fn test_not_expired_stays() {
        let mut timers = TimerQueue::new();
        timers.schedule(ms(50), ());
        assert!(timers.pop_expired(ms(49)).is_none());
        assert_eq!(timers.len(), 1);
        assert!(timers.pop_expired(ms(50)).is_some());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut timers = TimerQueue::new();
        let id = timers.schedule(ms(5), ());
        assert!(timers.contains(id));
        assert!(timers.cancel(id));
        assert!(!timers.cancel(id));
        assert!(!timers.contains(id));
        assert!(timers.is_empty());
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let mut timers = TimerQueue::new();
        let first = timers.schedule(ms(5), 1);
        timers.schedule(ms(10), 2);
        timers.cancel(first);

        assert_eq!(timers.next_deadline(), Some(ms(10)));
        assert_eq!(timers.pop_expired(ms(100)).map(|(_, p)| p), Some(2));
        assert!(timers.pop_expired(ms(100)).is_none());
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let mut timers = TimerQueue::new();
        let id = timers.schedule(ms(1), ());
        assert!(timers.pop_expired(ms(1)).is_some());
        assert!(!timers.cancel(id));
    }

    #[test]
    fn test_cancelled_entries_under_live_one_are_compacted() {
        let mut timers = TimerQueue::new();
        let live = timers.schedule(ms(1), "live");
        let cancelled: Vec<TimerId> = (0..200).map(|n| timers.schedule(ms(1_000 + n), "long")).collect();

        for id in cancelled {
            assert!(timers.cancel(id));
        }

        assert_eq!(timers.len(), 1);
        assert!(timers.heap.len() <= COMPACT_MIN);
        assert_eq!(timers.pop_expired(ms(1)), Some((live, "live")));
        assert!(timers.is_empty());
    }
}
