//! Bounded FIFO queue between producers and the flusher.
//!
//! This is the only structure shared across the producer/consumer boundary.
//! Any number of producers push concurrently; exactly one flusher drains.
//! The capacity is a hard memory ceiling: when the queue is full, the oldest
//! record is evicted to make room for the new one (head-drop), the drop is
//! counted, and the producer still sees success.
//!
//! Critical sections are a mutex around a `VecDeque`; no I/O or allocation
//! beyond the push happens under the lock, keeping the producer path
//! sub-millisecond.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use tracing::warn;

use crate::record::LogRecord;

/// A record held in the queue, stamped with its enqueue time.
///
/// The timestamp feeds queue-latency metrics only; it never reaches the
/// wire. Ownership transfers exclusively to the flusher once drained.
#[derive(Debug)]
pub(crate) struct QueueSlot {
    pub record: LogRecord,
    pub enqueued_at: Instant,
}

/// Thread-safe bounded FIFO with head-drop overflow.
#[derive(Debug)]
pub(crate) struct BoundedQueue {
    inner: Mutex<VecDeque<QueueSlot>>,
    capacity: usize,
    dropped_overflow: AtomicU64,
}

impl BoundedQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            dropped_overflow: AtomicU64::new(0),
        }
    }

    /// Pushes a record, evicting the oldest first if the queue is full.
    ///
    /// Returns the queue length after the push so the caller can decide
    /// whether the size trigger fired. Always succeeds.
    pub fn enqueue(&self, record: LogRecord) -> usize {
        let slot = QueueSlot { record, enqueued_at: Instant::now() };
        let (len, evicted) = {
            let mut queue = match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let evicted = if queue.len() >= self.capacity {
                queue.pop_front();
                true
            } else {
                false
            };
            queue.push_back(slot);
            (queue.len(), evicted)
        };
        if evicted {
            let dropped = self.dropped_overflow.fetch_add(1, Ordering::Relaxed) + 1;
            // One diagnostic line per 1000 drops.
            if dropped % 1000 == 1 {
                warn!(
                    capacity = self.capacity,
                    total_dropped = dropped,
                    "log queue full, dropping oldest record"
                );
            }
        }
        len
    }

    /// Removes and returns up to `max_n` records from the head, preserving
    /// FIFO order. Called only by the flusher.
    pub fn drain_batch(&self, max_n: usize) -> Vec<QueueSlot> {
        let mut queue = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let take = max_n.min(queue.len());
        queue.drain(..take).collect()
    }

    /// Restores a drained batch to the head of the queue, preserving its
    /// internal order, so the next drain yields the same logical batch.
    ///
    /// If producers filled the freed space in the meantime, the oldest
    /// records of the returned batch are dropped to keep the hard capacity
    /// ceiling (they are the oldest records in the queue, so this is the
    /// same head-drop policy as `enqueue`).
    pub fn requeue_front(&self, mut batch: Vec<QueueSlot>) {
        if batch.is_empty() {
            return;
        }
        let overflow = {
            let mut queue = match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let overflow = (queue.len() + batch.len()).saturating_sub(self.capacity);
            for slot in batch.drain(overflow..).rev() {
                queue.push_front(slot);
            }
            overflow
        };
        if overflow > 0 {
            self.dropped_overflow.fetch_add(overflow as u64, Ordering::Relaxed);
            warn!(dropped = overflow, "queue refilled during retry, dropping oldest requeued records");
        }
    }

    /// Current queue length.
    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hard capacity ceiling.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total records evicted by overflow since construction.
    pub fn dropped_overflow(&self) -> u64 {
        self.dropped_overflow.load(Ordering::Relaxed)
    }

    /// Discards everything still queued, returning how many records were
    /// abandoned. Used when a shutdown deadline expires.
    pub fn clear(&self) -> usize {
        let mut queue = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let abandoned = queue.len();
        queue.clear();
        abandoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{LogLevel, LogRecord};
    use std::sync::Arc;

    fn record(message: &str) -> LogRecord {
        LogRecord::new(LogLevel::Info, message)
    }

    fn messages(slots: &[QueueSlot]) -> Vec<String> {
        slots.iter().map(|s| s.record.message.clone()).collect()
    }

    #[test]
    fn test_enqueue_returns_length() {
        let queue = BoundedQueue::new(10);
        assert_eq!(queue.enqueue(record("a")), 1);
        assert_eq!(queue.enqueue(record("b")), 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(10);
        for i in 0..5 {
            queue.enqueue(record(&format!("m{i}")));
        }
        let batch = queue.drain_batch(5);
        assert_eq!(messages(&batch), vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let queue = BoundedQueue::new(10);
        for i in 0..15 {
            queue.enqueue(record(&format!("m{i}")));
        }
        assert_eq!(queue.len(), 10);
        assert_eq!(queue.dropped_overflow(), 5);
        let batch = queue.drain_batch(10);
        // Records 0-4 evicted; 5-14 survive in order.
        assert_eq!(messages(&batch)[0], "m5");
        assert_eq!(messages(&batch)[9], "m14");
    }

    #[test]
    fn test_drain_batch_respects_max() {
        let queue = BoundedQueue::new(10);
        for i in 0..8 {
            queue.enqueue(record(&format!("m{i}")));
        }
        let batch = queue.drain_batch(3);
        assert_eq!(batch.len(), 3);
        assert_eq!(queue.len(), 5);
    }

    #[test]
    fn test_drain_empty_queue() {
        let queue = BoundedQueue::new(10);
        assert!(queue.drain_batch(100).is_empty());
    }

    #[test]
    fn test_requeue_front_restores_order() {
        let queue = BoundedQueue::new(10);
        for i in 0..6 {
            queue.enqueue(record(&format!("m{i}")));
        }
        let batch = queue.drain_batch(3);
        queue.requeue_front(batch);
        let redrained = queue.drain_batch(6);
        assert_eq!(messages(&redrained), vec!["m0", "m1", "m2", "m3", "m4", "m5"]);
    }

    #[test]
    fn test_requeue_front_drops_oldest_when_refilled() {
        let queue = BoundedQueue::new(5);
        for i in 0..5 {
            queue.enqueue(record(&format!("old{i}")));
        }
        let batch = queue.drain_batch(3);
        // Producers fill the freed space while the batch is in flight.
        for i in 0..3 {
            queue.enqueue(record(&format!("new{i}")));
        }
        queue.requeue_front(batch);
        assert_eq!(queue.len(), 5);
        assert_eq!(queue.dropped_overflow(), 3);
        let all = queue.drain_batch(5);
        // old0-old2 were the oldest and got dropped.
        assert_eq!(messages(&all), vec!["old3", "old4", "new0", "new1", "new2"]);
    }

    #[test]
    fn test_clear_counts_abandoned() {
        let queue = BoundedQueue::new(10);
        for i in 0..7 {
            queue.enqueue(record(&format!("m{i}")));
        }
        assert_eq!(queue.clear(), 7);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_producers_bounded() {
        let queue = Arc::new(BoundedQueue::new(100));
        let mut handles = Vec::new();
        for producer in 0..8 {
            let queue = Arc::clone(&queue);
            handles.push(std::thread::spawn(move || {
                for i in 0..500 {
                    queue.enqueue(record(&format!("p{producer}-{i}")));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        // 4000 enqueued into capacity 100: the bound holds and every record
        // is accounted for.
        assert_eq!(queue.len(), 100);
        assert_eq!(queue.dropped_overflow(), 3900);
    }

    #[test]
    fn test_per_producer_fifo_preserved() {
        let queue = Arc::new(BoundedQueue::new(10_000));
        let mut handles = Vec::new();
        for producer in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    queue.enqueue(record(&format!("p{producer}-{i}")));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let all = messages(&queue.drain_batch(10_000));
        for producer in 0..4 {
            let ours: Vec<&String> =
                all.iter().filter(|m| m.starts_with(&format!("p{producer}-"))).collect();
            let expected: Vec<String> = (0..100).map(|i| format!("p{producer}-{i}")).collect();
            assert_eq!(ours.len(), 100);
            for (got, want) in ours.iter().zip(expected.iter()) {
                assert_eq!(*got, want);
            }
        }
    }
}
