//! Priority read queue (part of C2, spec.md §4.2).
//!
//! Grounded on `AsyncIoOptimizer` in the jcn363-AI_IDE async I/O optimizer: a
//! `tokio::sync::Semaphore` caps in-flight reads, with an explicit queue of pending
//! work ahead of the semaphore so callers get deterministic `QueueFull` backpressure
//! instead of an unbounded pile of blocked futures. Dispatch is priority-ordered: a
//! freed permit always goes to the highest-priority backlog entry (FIFO among equal
//! priorities), not to whichever waiter happens to race the semaphore first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};

use crate::error::IceError;
use crate::types::FilePath;

/// Higher numeric value is served first; ties fall back to FIFO arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadPriority {
    Low,
    Normal,
    High,
}

struct Waiter {
    priority: ReadPriority,
    arrival: u64,
    sender: oneshot::Sender<OwnedSemaphorePermit>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.arrival == other.arrival
    }
}
impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.arrival.cmp(&self.arrival))
    }
}

/// Admission control in front of the concurrency-limited read path. `acquire` parks
/// behind a priority ticket and only resolves once `dispatch_pending` has handed it a
/// real semaphore permit.
#[derive(Clone)]
pub struct ReadQueue {
    semaphore: Arc<Semaphore>,
    pending: Arc<Mutex<BinaryHeap<Waiter>>>,
    max_queue_size: usize,
    next_arrival: Arc<Mutex<u64>>,
    max_retries: u32,
    retry_delay: std::time::Duration,
}

pub struct ReadPermit {
    permit: Option<OwnedSemaphorePermit>,
    queue: ReadQueue,
}

impl Drop for ReadPermit {
    fn drop(&mut self) {
        // Release the real permit first so `dispatch_pending` sees it as available.
        drop(self.permit.take());
        self.queue.dispatch_pending();
    }
}

impl ReadQueue {
    pub fn new(max_concurrent_reads: usize, max_queue_size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent_reads)),
            pending: Arc::new(Mutex::new(BinaryHeap::new())),
            max_queue_size,
            next_arrival: Arc::new(Mutex::new(0)),
            max_retries: 3,
            retry_delay: std::time::Duration::from_millis(1000),
        }
    }

    pub fn with_retry(mut self, max_retries: u32, retry_delay: std::time::Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn queue_depth(&self) -> usize {
        self.pending.lock().len()
    }

    /// Hands every currently-available semaphore permit to the highest-priority
    /// backlog entries, highest priority then earliest arrival first. Called right
    /// after a ticket is enqueued and whenever a held permit is dropped.
    fn dispatch_pending(&self) {
        let mut pending = self.pending.lock();
        while !pending.is_empty() {
            match self.semaphore.clone().try_acquire_owned() {
                Ok(permit) => {
                    let waiter = pending.pop().expect("checked non-empty above");
                    if let Err(permit) = waiter.sender.send(permit) {
                        // Receiver dropped (its future was cancelled); the permit
                        // came back to us, so try again against the next waiter.
                        drop(permit);
                        continue;
                    }
                }
                Err(_) => break,
            }
        }
    }

    /// Admits one read at `priority`. Rejects with `QueueFull` if the ticket backlog
    /// is already at `max_queue_size` when called; otherwise parks until
    /// `dispatch_pending` grants this ticket a permit in priority order.
    pub async fn acquire(&self, path: &FilePath, priority: ReadPriority) -> Result<ReadPermit, IceError> {
        let (sender, receiver) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if pending.len() >= self.max_queue_size {
                return Err(IceError::QueueFull);
            }
            let arrival = {
                let mut n = self.next_arrival.lock();
                let v = *n;
                *n += 1;
                v
            };
            pending.push(Waiter { priority, arrival, sender });
        }
        self.dispatch_pending();

        match receiver.await {
            Ok(permit) => Ok(ReadPermit {
                permit: Some(permit),
                queue: self.clone(),
            }),
            Err(_) => Err(IceError::Timeout {
                path: path.clone(),
                after: self.retry_delay * self.max_retries,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_grants_up_to_the_concurrency_limit() {
        let queue = ReadQueue::new(2, 10);
        let p = FilePath::new("/a.ts");
        let permit1 = queue.acquire(&p, ReadPriority::Normal).await.unwrap();
        let permit2 = queue.acquire(&p, ReadPriority::Normal).await.unwrap();
        assert_eq!(queue.queue_depth(), 0);
        drop(permit1);
        drop(permit2);
    }

    #[tokio::test]
    async fn queue_full_rejects_beyond_backlog_bound() {
        let queue = Arc::new(ReadQueue::new(1, 1));
        let p = FilePath::new("/a.ts");
        let held = queue.acquire(&p, ReadPriority::Normal).await.unwrap();

        let q2 = queue.clone();
        let p2 = p.clone();
        let waiter = tokio::spawn(async move { q2.acquire(&p2, ReadPriority::Normal).await });
        tokio::task::yield_now().await;

        let err = queue.acquire(&p, ReadPriority::Normal).await;
        assert!(matches!(err, Err(IceError::QueueFull)));

        drop(held);
        let _ = waiter.await;
    }

    #[tokio::test]
    async fn higher_priority_waiter_is_served_before_earlier_low_priority_waiter() {
        let queue = Arc::new(ReadQueue::new(1, 4));
        let held = queue.acquire(&FilePath::new("/a.ts"), ReadPriority::Normal).await.unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));

        let q_low = queue.clone();
        let order_low = order.clone();
        let low = tokio::spawn(async move {
            let _permit = q_low.acquire(&FilePath::new("/low.ts"), ReadPriority::Low).await.unwrap();
            order_low.lock().push("low");
        });
        tokio::task::yield_now().await;

        let q_high = queue.clone();
        let order_high = order.clone();
        let high = tokio::spawn(async move {
            let _permit = q_high.acquire(&FilePath::new("/high.ts"), ReadPriority::High).await.unwrap();
            order_high.lock().push("high");
        });
        tokio::task::yield_now().await;

        assert_eq!(queue.queue_depth(), 2);
        drop(held);

        low.await.unwrap();
        high.await.unwrap();
        assert_eq!(*order.lock(), vec!["high", "low"]);
    }
}
