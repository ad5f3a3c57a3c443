//! Bounded hand-off queue that never blocks the producer.
//!
//! When full, [`FrameQueue::push`] evicts the **oldest** entry so the
//! consumer always sees the freshest frames. Evictions are counted.
//!
//! ```text
//! capture thread ── push ──► [ oldest … newest ] ── pop().await ──► send task
//!                     └─ full: drop oldest, dropped += 1
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;

pub struct FrameQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl<T> FrameQueue<T> {
    /// A queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue `item`, returning the evicted oldest item if the queue was
    /// full. Pushing to a closed queue drops `item` and returns it.
    pub fn push(&self, item: T) -> Option<T> {
        if self.is_closed() {
            return Some(item);
        }
        let evicted = {
            let mut items = self.lock();
            let evicted = if items.len() >= self.capacity {
                items.pop_front()
            } else {
                None
            };
            items.push_back(item);
            evicted
        };
        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        evicted
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Wait for the next item. Returns `None` once the queue is closed and
    /// drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Wake all waiters; further pushes are refused.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        // A waiter between its check and `notified.await` still gets a permit.
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Total items evicted so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        // Items are plain values; a poisoned lock still holds a usable queue.
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn evicts_oldest_when_full() {
        let q = FrameQueue::new(2);
        assert_eq!(q.push(1), None);
        assert_eq!(q.push(2), None);
        assert_eq!(q.push(3), Some(1));
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn zero_capacity_is_one() {
        let q = FrameQueue::new(0);
        q.push('a');
        q.push('b');
        assert_eq!(q.capacity(), 1);
        assert_eq!(q.try_pop(), Some('b'));
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let q = Arc::new(FrameQueue::new(2));
        let producer = Arc::clone(&q);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push(42);
        });
        assert_eq!(q.pop().await, Some(42));
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let q = FrameQueue::new(4);
        q.push(1);
        q.close();
        assert_eq!(q.push(2), Some(2));
        assert_eq!(q.pop().await, Some(1));
        assert_eq!(q.pop().await, None);
    }

    #[tokio::test]
    async fn close_wakes_waiter() {
        let q = Arc::new(FrameQueue::<u8>::new(1));
        let waiter = Arc::clone(&q);
        let task = tokio::spawn(async move { waiter.pop().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.close();
        let got = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, None);
    }
}
