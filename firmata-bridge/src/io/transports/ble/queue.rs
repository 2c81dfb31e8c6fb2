use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Inbound {
    entries: VecDeque<Vec<u8>>,
    /// Bytes held by `entries`.
    total: usize,
}

/// Inbound notifications waiting to be read.
///
/// Bounded by a number of entries: when full, the oldest entry is evicted to make room. Entries
/// are never split: a read takes whole entries only, an entry too large for a read stays at the
/// head of the queue.
#[derive(Debug)]
pub(crate) struct RxQueue {
    max_messages: usize,
    inbound: Mutex<Inbound>,
    arrived: Condvar,
}

impl RxQueue {
    pub(crate) fn new(max_messages: usize) -> Self {
        Self {
            max_messages: max_messages.max(1),
            inbound: Mutex::new(Inbound::default()),
            arrived: Condvar::new(),
        }
    }

    /// Appends an entry, evicting the oldest ones while the queue is full.
    ///
    /// # Returns
    /// The number of evicted entries.
    pub(crate) fn push(&self, entry: Vec<u8>) -> usize {
        let mut inbound = self.inbound.lock();
        let mut evicted = 0;
        while inbound.entries.len() >= self.max_messages {
            match inbound.entries.pop_front() {
                Some(oldest) => inbound.total -= oldest.len(),
                None => break,
            }
            evicted += 1;
        }
        inbound.total += entry.len();
        inbound.entries.push_back(entry);
        self.arrived.notify_all();
        evicted
    }

    /// Takes as many whole entries as fit in `max_bytes`, in arrival order.
    ///
    /// Waits up to `wait` while the head entry is missing or does not fit.
    pub(crate) fn read(&self, max_bytes: usize, wait: Duration) -> Vec<u8> {
        let deadline = Instant::now() + wait;
        let mut inbound = self.inbound.lock();
        while !inbound.entries.front().is_some_and(|head| head.len() <= max_bytes) {
            if wait.is_zero() || self.arrived.wait_until(&mut inbound, deadline).timed_out() {
                break;
            }
        }

        let mut out = vec![];
        while let Some(head) = inbound.entries.front() {
            if out.len() + head.len() > max_bytes {
                break;
            }
            if let Some(entry) = inbound.entries.pop_front() {
                inbound.total -= entry.len();
                out.extend(entry);
            }
        }
        out
    }

    /// Bytes waiting to be read.
    pub(crate) fn available(&self) -> usize {
        self.inbound.lock().total
    }

    /// Entries waiting to be read.
    pub(crate) fn len(&self) -> usize {
        self.inbound.lock().entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_overflow_evicts_oldest() {
        let queue = RxQueue::new(4);
        let evicted: usize = (1..=5u8).map(|i| queue.push(vec![i])).sum();
        assert_eq!(evicted, 1);
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.available(), 4);
        assert_eq!(queue.read(1024, Duration::ZERO), vec![2, 3, 4, 5]);
        assert!(queue.is_empty());
        assert_eq!(queue.available(), 0);
    }

    #[test]
    fn test_oversized_head_is_evicted_first() {
        let queue = RxQueue::new(2);
        queue.push(vec![1, 1, 1]);
        assert!(queue.read(2, Duration::ZERO).is_empty());
        assert_eq!(queue.len(), 1, "Too large entry stays queued");

        queue.push(vec![2]);
        queue.push(vec![3]);
        queue.push(vec![4]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.available(), 2);
        assert_eq!(queue.read(10, Duration::ZERO), vec![3, 4]);
    }

    #[test]
    fn test_oversized_head_waits_before_giving_up() {
        let queue = RxQueue::new(10);
        queue.push(vec![1, 1, 1]);
        let start = Instant::now();
        assert!(queue.read(2, Duration::from_millis(20)).is_empty());
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(queue.read(3, Duration::ZERO), vec![1, 1, 1]);
    }

    #[test]
    fn test_eviction_subtracts_evicted_bytes() {
        let queue = RxQueue::new(2);
        queue.push(vec![1, 1, 1]);
        queue.push(vec![2]);
        queue.push(vec![3, 3]);
        assert_eq!(queue.available(), 3);
        assert_eq!(queue.read(10, Duration::ZERO), vec![2, 3, 3]);
    }

    #[test]
    fn test_read_never_splits_entries() {
        let queue = RxQueue::new(10);
        queue.push(vec![1, 2]);
        queue.push(vec![3, 4, 5]);
        queue.push(vec![6]);

        assert_eq!(queue.read(4, Duration::ZERO), vec![1, 2]);
        assert_eq!(queue.available(), 4);
        assert_eq!(queue.len(), 2);

        // Too large for this read: kept for a later one.
        assert!(queue.read(2, Duration::ZERO).is_empty());
        assert_eq!(queue.read(4, Duration::ZERO), vec![3, 4, 5, 6]);
        assert_eq!(queue.available(), 0);
    }

    #[test]
    fn test_read_waits_for_first_entry() {
        let queue = RxQueue::new(10);
        let start = Instant::now();
        assert!(queue.read(10, Duration::from_millis(20)).is_empty());
        assert!(start.elapsed() >= Duration::from_millis(20));

        let queue = Arc::new(queue);
        let producer = queue.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            producer.push(vec![0xF9]);
        });
        assert_eq!(queue.read(10, Duration::from_secs(2)), vec![0xF9]);
        handle.join().unwrap();
    }

    #[test]
    fn test_concurrent_producer_keeps_order() {
        let queue = Arc::new(RxQueue::new(1000));
        let producer = queue.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..200u8 {
                producer.push(vec![i]);
            }
        });
        let mut received = vec![];
        while received.len() < 200 {
            received.extend(queue.read(7, Duration::from_millis(10)));
        }
        handle.join().unwrap();
        assert_eq!(received, (0..200u8).collect::<Vec<u8>>());
        assert_eq!(queue.available(), 0);
    }
}
