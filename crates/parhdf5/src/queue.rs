//! Blocking FIFO hand-off between the chunk extractor and the workers.
//!
//! One producer, many consumers. A single mutex protects the item list,
//! the monotonic enqueue counter, and the closed latch; a condition
//! variable is signalled on every push and broadcast on close. `pop`
//! loops on its predicate, so spurious wakeups are harmless.
//!
//! End-of-work is a closed latch rather than per-worker sentinel items:
//! once the queue is both empty and closed, every blocked consumer wakes
//! and receives its own `None`, which plays the sentinel role — each
//! worker observes end-of-stream exactly once and exits symmetrically.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
    added: u64,
}

/// Unbounded blocking FIFO with a close latch.
///
/// Memory pressure is bounded by the producer: at most the chunks not yet
/// consumed are in flight at once.
#[derive(Debug)]
pub struct WorkQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        WorkQueue::new()
    }
}

impl<T> WorkQueue<T> {
    /// Create an empty, open queue.
    pub fn new() -> WorkQueue<T> {
        WorkQueue {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
                added: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Place `item` at the tail and wake one waiting consumer.
    ///
    /// Never blocks. Items pushed after [`close`](WorkQueue::close) are
    /// still delivered; the latch only governs what `pop` returns once
    /// the queue runs dry.
    pub fn push(&self, item: T) {
        let mut inner = self.inner.lock().expect("work queue poisoned");
        inner.items.push_back(item);
        inner.added += 1;
        self.available.notify_one();
    }

    /// Latch the queue closed and wake all waiting consumers.
    ///
    /// Idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("work queue poisoned");
        inner.closed = true;
        self.available.notify_all();
    }

    /// Take the head item, blocking while the queue is empty and open.
    ///
    /// Returns `None` once the queue is empty *and* closed.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock().expect("work queue poisoned");
        while inner.items.is_empty() && !inner.closed {
            inner = self
                .available
                .wait(inner)
                .expect("work queue poisoned");
        }
        inner.items.pop_front()
    }

    /// Monotonic count of items ever pushed.
    pub fn elements_added(&self) -> u64 {
        self.inner.lock().expect("work queue poisoned").added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_order() {
        let q = WorkQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        q.close();
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
        assert_eq!(q.elements_added(), 3);
    }

    #[test]
    fn pop_drains_before_reporting_closed() {
        let q = WorkQueue::new();
        q.push(7);
        q.close();
        // The closed latch must not hide items already queued.
        assert_eq!(q.pop(), Some(7));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn close_is_idempotent() {
        let q: WorkQueue<u8> = WorkQueue::new();
        q.close();
        q.close();
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn pop_blocks_until_push() {
        let q = Arc::new(WorkQueue::new());
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.pop())
        };
        // Give the consumer time to block.
        thread::sleep(Duration::from_millis(50));
        q.push(42u32);
        assert_eq!(consumer.join().unwrap(), Some(42));
    }

    #[test]
    fn close_wakes_all_blocked_consumers() {
        let q: Arc<WorkQueue<u8>> = Arc::new(WorkQueue::new());
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || q.pop())
            })
            .collect();
        thread::sleep(Duration::from_millis(50));
        q.close();
        for c in consumers {
            assert_eq!(c.join().unwrap(), None);
        }
    }

    #[test]
    fn many_consumers_share_items_exactly_once() {
        let q = Arc::new(WorkQueue::new());
        for i in 0..100u32 {
            q.push(i);
        }
        q.close();
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    let mut got = Vec::new();
                    while let Some(v) = q.pop() {
                        got.push(v);
                    }
                    got
                })
            })
            .collect();
        let mut all: Vec<u32> = consumers
            .into_iter()
            .flat_map(|c| c.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }
}
