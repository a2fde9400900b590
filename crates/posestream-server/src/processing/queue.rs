//! Bounded drop-oldest frame queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::job::FrameJob;

/// Fixed-capacity FIFO. When full, `push` evicts the oldest job so the
/// consumer always works on the freshest frames.
///
/// Push and pop never block; only [`FrameQueue::next`] waits.
#[derive(Debug)]
pub struct FrameQueue {
    jobs: Mutex<VecDeque<FrameJob>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` jobs (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            jobs: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue a job. Returns the displaced oldest job when the queue was full.
    pub fn push(&self, job: FrameJob) -> Option<FrameJob> {
        let displaced = {
            let mut jobs = self.jobs.lock();
            let displaced = if jobs.len() >= self.capacity {
                jobs.pop_front()
            } else {
                None
            };
            jobs.push_back(job);
            displaced
        };
        self.notify.notify_one();
        displaced
    }

    /// Take the oldest job without waiting.
    pub fn pop(&self) -> Option<FrameJob> {
        self.jobs.lock().pop_front()
    }

    /// Wait for the next job. Returns `None` once the queue is closed.
    pub async fn next(&self) -> Option<FrameJob> {
        loop {
            let notified = self.notify.notified();
            if self.is_closed() {
                return None;
            }
            if let Some(job) = self.pop() {
                return Some(job);
            }
            notified.await;
        }
    }

    /// Discard every pending job. Returns how many were released.
    pub fn clear(&self) -> usize {
        let mut jobs = self.jobs.lock();
        let n = jobs.len();
        jobs.clear();
        n
    }

    /// Close the queue and wake any waiter.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Whether [`FrameQueue::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Pending job count.
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Whether no job is pending.
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Maximum pending jobs.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn job(seq: u64) -> FrameJob {
        FrameJob::new(seq, format!("frame-{seq}"), None)
    }

    #[test]
    fn fifo_below_capacity() {
        let q = FrameQueue::new(4);
        assert!(q.push(job(1)).is_none());
        assert!(q.push(job(2)).is_none());
        assert_eq!(q.pop().unwrap().sequence, 1);
        assert_eq!(q.pop().unwrap().sequence, 2);
        assert!(q.pop().is_none());
    }

    #[test]
    fn full_queue_drops_oldest() {
        let q = FrameQueue::new(2);
        assert!(q.push(job(1)).is_none());
        assert!(q.push(job(2)).is_none());
        let displaced = q.push(job(3)).unwrap();
        assert_eq!(displaced.sequence, 1);
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop().unwrap().sequence, 2);
        assert_eq!(q.pop().unwrap().sequence, 3);
    }

    #[test]
    fn zero_capacity_clamped_to_one() {
        let q = FrameQueue::new(0);
        assert_eq!(q.capacity(), 1);
        assert!(q.push(job(1)).is_none());
        assert_eq!(q.push(job(2)).unwrap().sequence, 1);
    }

    #[test]
    fn clear_releases_pending() {
        let q = FrameQueue::new(3);
        let _ = q.push(job(1));
        let _ = q.push(job(2));
        assert_eq!(q.clear(), 2);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn next_returns_queued_job() {
        let q = FrameQueue::new(2);
        let _ = q.push(job(5));
        assert_eq!(q.next().await.unwrap().sequence, 5);
    }

    #[tokio::test]
    async fn next_waits_for_push() {
        let q = Arc::new(FrameQueue::new(2));
        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.next().await.map(|j| j.sequence) });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = q.push(job(9));
        assert_eq!(waiter.await.unwrap(), Some(9));
    }

    #[tokio::test]
    async fn close_wakes_waiter() {
        let q = Arc::new(FrameQueue::new(2));
        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.next().await.is_none() });
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.close();
        assert!(waiter.await.unwrap());
        assert!(q.is_closed());
    }

    #[tokio::test]
    async fn closed_queue_yields_nothing() {
        let q = FrameQueue::new(2);
        let _ = q.push(job(1));
        q.close();
        assert!(q.next().await.is_none());
    }
}
