//! Time-ordered queue of pending actions.
//!
//! Actions fire in ascending simulation time. Equal-time actions fire in the
//! order they were scheduled (a monotonically increasing sequence number
//! breaks ties), so replays are deterministic.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug)]
struct Entry<A> {
    time: f64,
    seq: u64,
    action: A,
}

impl<A> PartialEq for Entry<A> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<A> Eq for Entry<A> {}

impl<A> PartialOrd for Entry<A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<A> Ord for Entry<A> {
    // Reversed: BinaryHeap is a max-heap and we want the earliest entry on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug)]
pub struct EventQueue<A> {
    heap: BinaryHeap<Entry<A>>,
    next_seq: u64,
}

impl<A> Default for EventQueue<A> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<A> EventQueue<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, time: f64, action: A) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { time, seq, action });
    }

    /// Time of the earliest pending action.
    pub fn next_time(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.time)
    }

    /// Pop the earliest action if it is due at or before `now`.
    pub fn pop_due(&mut self, now: f64) -> Option<(f64, A)> {
        if self.next_time()? > now {
            return None;
        }
        self.heap.pop().map(|e| (e.time, e.action))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_time_order_with_stable_ties() {
        let mut q = EventQueue::new();
        q.schedule(5.0, "late");
        q.schedule(1.0, "first");
        q.schedule(3.0, "tie-a");
        q.schedule(3.0, "tie-b");
        q.schedule(3.0, "tie-c");

        assert_eq!(q.next_time(), Some(1.0));
        assert_eq!(q.pop_due(0.5), None);
        let mut fired = Vec::new();
        while let Some((_, a)) = q.pop_due(4.0) {
            fired.push(a);
        }
        assert_eq!(fired, vec!["first", "tie-a", "tie-b", "tie-c"]);
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop_due(10.0), Some((5.0, "late")));
        assert!(q.is_empty());
    }
}
