//! Pending constraints, ordered by timeout and then by arrival.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use crate::types::NodeId;

/// A queued solver attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pending {
    pub timeout: Duration,
    /// Arrival number; breaks ties between equal timeouts.
    seq: u64,
    pub node: NodeId,
}

impl Pending {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Min-heap keyed by `(timeout, arrival)`.
#[derive(Debug, Default)]
pub struct PendingQueue {
    heap: BinaryHeap<Reverse<Pending>>,
    next_seq: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: NodeId, timeout: Duration) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Pending { timeout, seq, node }));
    }

    /// Puts back an entry taken with [`pop`][Self::pop], keeping its place.
    pub fn restore(&mut self, entry: Pending) {
        self.heap.push(Reverse(entry));
    }

    pub fn pop(&mut self) -> Option<Pending> {
        self.heap.pop().map(|Reverse(p)| p)
    }

    pub fn peek(&self) -> Option<&Pending> {
        self.heap.peek().map(|Reverse(p)| p)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.heap.iter().any(|Reverse(p)| p.node == node)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
