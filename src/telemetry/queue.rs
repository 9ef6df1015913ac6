//! Bounded telemetry buffer between acquisition and delivery.
//!
//! Overflow is lossy: a plain [`TelemetryQueue::enqueue`] drops
//! the oldest sample, while [`TelemetryQueue::requeue_batch`] (used after a
//! failed publish) drops from the back so the retried batch keeps its place
//! at the front.  Every operation holds the lock only for its own duration.

use crate::config::DELIVERY_BATCH_SIZE;
use crate::telemetry::Telemetry;
use core::cell::RefCell;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::{Deque, Vec};

/// A delivery-sized batch removed by [`TelemetryQueue::pop_batch`].
pub type Batch = Vec<Telemetry, DELIVERY_BATCH_SIZE>;

struct Inner<const N: usize> {
    items: Deque<Telemetry, N>,
    evicted: u32,
}

pub struct TelemetryQueue<const N: usize> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Inner<N>>>,
}

impl<const N: usize> TelemetryQueue<N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                items: Deque::new(),
                evicted: 0,
            })),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Append a sample, evicting the oldest one when full.
    pub fn enqueue(&self, item: Telemetry) {
        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            if inner.items.is_full() {
                let _ = inner.items.pop_front();
                inner.evicted = inner.evicted.wrapping_add(1);
                warn!("Telemetry queue full, dropped oldest sample");
            }
            let _ = inner.items.push_back(item);
        });
    }

    /// Remove up to `max` samples from the front, oldest first.
    ///
    /// The caller picks the batch capacity `M`; it must be at least `max`
    /// for the full count to come back.
    pub fn pop_batch<const M: usize>(&self, max: usize) -> Vec<Telemetry, M> {
        let max = max.min(M);
        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            let mut batch = Vec::new();
            while batch.len() < max {
                let Some(item) = inner.items.pop_front() else {
                    break;
                };
                let _ = batch.push(item);
            }
            batch
        })
    }

    /// Put a previously popped batch back at the front, in its original
    /// order.  When there is no room the newest samples at the back are
    /// evicted instead.
    pub fn requeue_batch(&self, batch: &[Telemetry]) {
        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            let mut dropped = 0u32;
            for item in batch.iter().rev() {
                if inner.items.is_full() {
                    let _ = inner.items.pop_back();
                    dropped += 1;
                }
                let _ = inner.items.push_front(*item);
            }
            if dropped > 0 {
                inner.evicted = inner.evicted.wrapping_add(dropped);
                warn!("Requeue overflow, dropped {} newest samples", dropped);
            }
        });
    }

    /// Point-in-time length; may be stale by the time it is used.
    pub fn len(&self) -> usize {
        self.inner.lock(|cell| cell.borrow().items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples lost to overflow since boot.
    pub fn evicted(&self) -> u32 {
        self.inner.lock(|cell| cell.borrow().evicted)
    }
}

impl<const N: usize> Default for TelemetryQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TELEMETRY_QUEUE_CAPACITY;

    fn t(ts: i64) -> Telemetry {
        Telemetry {
            timestamp: ts,
            temperature: 20.0,
            humidity: 40.0,
            pressure: 1013.25,
            detections: 0,
        }
    }

    fn stamps<const N: usize>(q: &TelemetryQueue<N>) -> std::vec::Vec<i64> {
        let mut out = std::vec::Vec::new();
        loop {
            let batch: Batch = q.pop_batch(DELIVERY_BATCH_SIZE);
            if batch.is_empty() {
                return out;
            }
            out.extend(batch.iter().map(|x| x.timestamp));
        }
    }

    #[test]
    fn small_batch_drains_in_order() {
        let q: TelemetryQueue<TELEMETRY_QUEUE_CAPACITY> = TelemetryQueue::new();
        for i in 1..=3 {
            q.enqueue(t(i));
        }
        let batch: Batch = q.pop_batch(50);
        assert_eq!(batch.iter().map(|x| x.timestamp).collect::<std::vec::Vec<_>>(), [1, 2, 3]);
        assert!(q.is_empty());
    }

    #[test]
    fn overflow_evicts_oldest() {
        let q: TelemetryQueue<2> = TelemetryQueue::new();
        q.enqueue(t(1)); // A
        q.enqueue(t(2)); // B
        q.enqueue(t(3)); // C
        assert_eq!(q.len(), 2);
        assert_eq!(q.evicted(), 1);
        assert_eq!(stamps(&q), [2, 3]);
    }

    #[test]
    fn requeue_then_enqueue_evicts_front() {
        let q: TelemetryQueue<2> = TelemetryQueue::new();
        q.enqueue(t(1));
        q.enqueue(t(2));
        q.enqueue(t(3));
        let batch = q.pop_batch::<2>(2);
        assert_eq!(batch.iter().map(|x| x.timestamp).collect::<std::vec::Vec<_>>(), [2, 3]);
        q.requeue_batch(&batch);
        assert_eq!(q.len(), 2);
        q.enqueue(t(4)); // D
        assert_eq!(stamps(&q), [3, 4]);
    }

    #[test]
    fn empty_queue_pops_empty_batch() {
        let q: TelemetryQueue<4> = TelemetryQueue::new();
        assert!(q.pop_batch::<10>(10).is_empty());
        assert!(q.pop_batch::<10>(0).is_empty());
    }

    #[test]
    fn length_never_exceeds_capacity() {
        let q: TelemetryQueue<5> = TelemetryQueue::new();
        for i in 0..37 {
            q.enqueue(t(i));
            assert!(q.len() <= q.capacity());
            if i >= 5 {
                assert_eq!(q.evicted(), (i - 4) as u32);
            }
        }
        assert_eq!(stamps(&q), [32, 33, 34, 35, 36]);
    }

    #[test]
    fn every_item_exactly_once_without_overflow() {
        let q: TelemetryQueue<TELEMETRY_QUEUE_CAPACITY> = TelemetryQueue::new();
        for i in 0..TELEMETRY_QUEUE_CAPACITY as i64 {
            q.enqueue(t(i));
        }
        let all = stamps(&q);
        assert_eq!(all, (0..TELEMETRY_QUEUE_CAPACITY as i64).collect::<std::vec::Vec<_>>());
        assert_eq!(q.evicted(), 0);
    }

    #[test]
    fn pop_returns_the_full_count_requested() {
        let q: TelemetryQueue<128> = TelemetryQueue::new();
        for i in 0..100 {
            q.enqueue(t(i));
        }
        let batch = q.pop_batch::<128>(80);
        assert_eq!(batch.len(), 80);
        assert_eq!(batch.first().map(|x| x.timestamp), Some(0));
        assert_eq!(batch.last().map(|x| x.timestamp), Some(79));
        assert_eq!(q.len(), 20);
        assert_eq!(stamps(&q), (80..100).collect::<std::vec::Vec<_>>());
    }

    #[test]
    fn pop_stops_at_queue_length() {
        let q: TelemetryQueue<16> = TelemetryQueue::new();
        for i in 0..5 {
            q.enqueue(t(i));
        }
        assert_eq!(q.pop_batch::<16>(12).len(), 5);
        assert!(q.is_empty());
    }

    #[test]
    fn requeue_round_trip_is_identical() {
        let q: TelemetryQueue<16> = TelemetryQueue::new();
        for i in 0..10 {
            q.enqueue(t(i));
        }
        let first = q.pop_batch::<4>(4);
        q.requeue_batch(&first);
        assert_eq!(q.len(), 10);
        let again = q.pop_batch::<4>(4);
        assert_eq!(first, again);
        assert_eq!(stamps(&q), [4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn requeue_after_refill_evicts_newest() {
        // Capacity 4; pop 3, three fresh samples arrive, then requeue.
        for batch_len in 1..=4usize {
            let q: TelemetryQueue<4> = TelemetryQueue::new();
            for i in 0..4 {
                q.enqueue(t(i));
            }
            let batch: Batch = q.pop_batch(batch_len);
            for i in 0..batch_len as i64 {
                q.enqueue(t(100 + i));
            }
            assert_eq!(q.len(), 4);
            q.requeue_batch(&batch);
            assert_eq!(q.len(), 4, "batch {}", batch_len);
            assert_eq!(q.evicted(), batch_len as u32, "batch {}", batch_len);

            // The requeued batch leads, followed by whatever survived from
            // the front of the rest.
            let mut expected: std::vec::Vec<i64> = (0..batch_len as i64).collect();
            let rest: std::vec::Vec<i64> = (batch_len as i64..4)
                .chain(100..100 + batch_len as i64)
                .collect();
            expected.extend(rest.iter().take(4 - batch_len));
            assert_eq!(stamps(&q), expected, "batch {}", batch_len);
        }
    }

    #[test]
    fn requeue_larger_than_capacity_keeps_capacity() {
        let big: TelemetryQueue<64> = TelemetryQueue::new();
        for i in 0..10 {
            big.enqueue(t(i));
        }
        let batch = big.pop_batch::<10>(10);

        let q: TelemetryQueue<3> = TelemetryQueue::new();
        q.enqueue(t(50));
        q.requeue_batch(&batch);
        assert_eq!(q.len(), 3);
        // Newest slots give way each time, so the head of the batch
        // survives.
        assert_eq!(stamps(&q), [0, 1, 2]);
    }

    #[test]
    fn concurrent_producers_and_consumer_lose_nothing() {
        static Q: TelemetryQueue<TELEMETRY_QUEUE_CAPACITY> = TelemetryQueue::new();
        let producers: std::vec::Vec<_> = (0..4)
            .map(|p| {
                std::thread::spawn(move || {
                    for i in 0..200 {
                        Q.enqueue(t(p * 1000 + i));
                    }
                })
            })
            .collect();

        let mut seen = std::vec::Vec::new();
        while seen.len() < 800 {
            let batch: Batch = Q.pop_batch(DELIVERY_BATCH_SIZE);
            if batch.len() % 2 == 1 {
                // Exercise requeue under contention.
                Q.requeue_batch(&batch);
                continue;
            }
            seen.extend(batch.iter().map(|x| x.timestamp));
            std::thread::yield_now();
        }
        for p in producers {
            p.join().unwrap();
        }
        seen.extend(stamps(&Q));
        seen.sort_unstable();
        let mut expected: std::vec::Vec<i64> = (0..4)
            .flat_map(|p| (0..200).map(move |i| p * 1000 + i))
            .collect();
        expected.sort_unstable();
        assert_eq!(seen, expected);
        assert_eq!(Q.evicted(), 0);
    }
}
