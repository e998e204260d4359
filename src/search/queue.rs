//! Bounded hand-off queue of matched doc ordinals.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct QueueState {
    items: VecDeque<u64>,
    completed: bool,
}

/// A bounded FIFO channel between one collector and one consumer.
///
/// `put` blocks while the queue is full, which is the backpressure
/// mechanism: a blocked collector callback stalls the query iteration
/// itself. `take` blocks until an item arrives or the queue is completed
/// with nothing left to drain.
///
/// Completion never discards queued items: after [`DocIdQueue::complete`]
/// the consumer still drains everything that was enqueued before observing
/// end-of-stream, and nothing can be enqueued any more.
#[derive(Debug)]
pub struct DocIdQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    not_full: Condvar,
    not_empty: Condvar,
}

impl DocIdQueue {
    /// Create a queue with the given capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        DocIdQueue {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.max(1)),
                completed: false,
            }),
            capacity: capacity.max(1),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Enqueue a doc ordinal, blocking while the queue is full.
    ///
    /// Returns false without enqueuing once the queue has been completed;
    /// the producer must stop at that point.
    pub fn put(&self, doc_id: u64) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.completed {
                return false;
            }
            if state.items.len() < self.capacity {
                state.items.push_back(doc_id);
                self.not_empty.notify_one();
                return true;
            }
            self.not_full.wait(&mut state);
        }
    }

    /// Dequeue the next ordinal, blocking while the queue is empty and not
    /// completed. Returns None exactly when the queue is completed and
    /// fully drained; every subsequent call also returns None.
    pub fn take(&self) -> Option<u64> {
        let mut state = self.state.lock();
        loop {
            if let Some(doc_id) = state.items.pop_front() {
                self.not_full.notify_one();
                return Some(doc_id);
            }
            if state.completed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Signal that no more items will be produced. Idempotent; wakes all
    /// blocked producers and consumers.
    pub fn complete(&self) {
        let mut state = self.state.lock();
        if !state.completed {
            state.completed = true;
            self.not_full.notify_all();
            self.not_empty.notify_all();
        }
    }

    /// True once `complete` has been called.
    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }
}
