//! # Discrete-Event Scheduler
//!
//! Single-threaded cooperative timeline. Guarantees:
//!
//! - events fire in non-decreasing time order;
//! - two events scheduled for the same instant fire in FIFO order of
//!   scheduling;
//! - cancellation is idempotent, and a canceled timer never fires.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

/// Handle to a scheduled event, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct Entry<E> {
    at: Duration,
    id: TimerId,
    event: E,
}

// Heap order: earliest time first, insertion order breaking ties. The id is
// the insertion counter, so (at, id) is a total order.
impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.id == other.id
    }
}

impl<E> Eq for Entry<E> {}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest entry on
        // top.
        (other.at, other.id.0).cmp(&(self.at, self.id.0))
    }
}

/// Event scheduler over a simulated clock.
pub struct Scheduler<E> {
    queue: BinaryHeap<Entry<E>>,
    canceled: HashSet<TimerId>,
    now: Duration,
    next_id: u64,
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            canceled: HashSet::new(),
            now: Duration::ZERO,
            next_id: 0,
        }
    }

    /// Current simulated time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedule `event` to fire `delay` after the current simulated time.
    pub fn schedule(&mut self, delay: Duration, event: E) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.queue.push(Entry {
            at: self.now + delay,
            id,
            event,
        });
        id
    }

    /// Cancel a scheduled event. Canceling twice, or canceling an event that
    /// already fired, is a no-op.
    pub fn cancel(&mut self, id: TimerId) {
        self.canceled.insert(id);
    }

    /// Pop the next live event, advancing the clock to its fire time.
    pub fn pop(&mut self) -> Option<(Duration, E)> {
        while let Some(entry) = self.queue.pop() {
            if self.canceled.remove(&entry.id) {
                continue;
            }
            self.now = entry.at;
            return Some((entry.at, entry.event));
        }
        None
    }

    /// Number of live (not canceled) pending events.
    pub fn pending(&self) -> usize {
        self.queue
            .iter()
            .filter(|entry| !self.canceled.contains(&entry.id))
            .count()
    }
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_time_order() {
        let mut sched = Scheduler::new();
        sched.schedule(Duration::from_millis(30), "c");
        sched.schedule(Duration::from_millis(10), "a");
        sched.schedule(Duration::from_millis(20), "b");

        let order: Vec<&str> = std::iter::from_fn(|| sched.pop()).map(|(_, e)| e).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn same_instant_fires_fifo() {
        let mut sched = Scheduler::new();
        let at = Duration::from_millis(5);
        for label in ["first", "second", "third"] {
            sched.schedule(at, label);
        }

        let order: Vec<&str> = std::iter::from_fn(|| sched.pop()).map(|(_, e)| e).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn clock_advances_to_fire_time() {
        let mut sched = Scheduler::new();
        sched.schedule(Duration::from_millis(10), ());
        let (at, _) = sched.pop().unwrap();
        assert_eq!(at, Duration::from_millis(10));
        assert_eq!(sched.now(), Duration::from_millis(10));

        // Delays are relative to the advanced clock.
        sched.schedule(Duration::from_millis(5), ());
        let (at, _) = sched.pop().unwrap();
        assert_eq!(at, Duration::from_millis(15));
    }

    #[test]
    fn canceled_timer_never_fires() {
        let mut sched = Scheduler::new();
        sched.schedule(Duration::from_millis(1), "keep");
        let doomed = sched.schedule(Duration::from_millis(2), "cancel");
        sched.schedule(Duration::from_millis(3), "keep");

        sched.cancel(doomed);
        let fired: Vec<&str> = std::iter::from_fn(|| sched.pop()).map(|(_, e)| e).collect();
        assert_eq!(fired, vec!["keep", "keep"]);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut sched = Scheduler::new();
        let id = sched.schedule(Duration::from_millis(1), ());
        sched.cancel(id);
        sched.cancel(id);
        assert_eq!(sched.pending(), 0);
        assert!(sched.pop().is_none());
    }

    #[test]
    fn pending_excludes_canceled() {
        let mut sched = Scheduler::new();
        sched.schedule(Duration::from_millis(1), ());
        let id = sched.schedule(Duration::from_millis(2), ());
        assert_eq!(sched.pending(), 2);
        sched.cancel(id);
        assert_eq!(sched.pending(), 1);
    }
}
