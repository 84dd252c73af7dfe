//! Unbounded FIFO of follower ids shared by the producer and the worker pool.
//!
//! The producer closes the queue once pagination stops. Consumers wait for
//! "item available, or closed and drained" instead of polling, so an empty
//! queue never by itself ends a worker.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::types::FollowerId;

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<FollowerId>,
    closed: bool,
    enqueued: u64,
}

#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panicking holder cannot leave the deque half-updated.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append ids in order. Ids pushed after `close` are dropped.
    pub fn extend<I>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = FollowerId>,
    {
        let added = {
            let mut state = self.lock();
            if state.closed {
                return 0;
            }
            let before = state.items.len();
            state.items.extend(ids);
            let added = state.items.len() - before;
            state.enqueued += added as u64;
            added
        };
        for _ in 0..added {
            self.notify.notify_one();
        }
        added
    }

    #[cfg(test)]
    pub(crate) fn push(&self, id: FollowerId) -> bool {
        self.extend(std::iter::once(id)) == 1
    }

    /// Mark that no more ids will arrive and wake every waiting consumer.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    #[cfg(test)]
    pub(crate) fn try_pop(&self) -> Option<FollowerId> {
        self.lock().items.pop_front()
    }

    /// Wait for the next id.
    ///
    /// Returns `None` once the queue is closed and drained, or when `cancel`
    /// fires.
    pub async fn pop(&self, cancel: &CancellationToken) -> Option<FollowerId> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a push or close between the
            // check and the await is not missed.
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(id) = state.items.pop_front() {
                    return Some(id);
                }
                if state.closed {
                    return None;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = &mut notified => {}
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Total ids ever accepted.
    pub fn enqueued(&self) -> u64 {
        self.lock().enqueued
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn ids(raw: &[u64]) -> Vec<FollowerId> {
        raw.iter().copied().map(FollowerId).collect()
    }

    #[test]
    fn preserves_insertion_order() {
        let q = WorkQueue::new();
        q.extend(ids(&[101, 102]));
        q.push(FollowerId(103));
        assert_eq!(q.try_pop(), Some(FollowerId(101)));
        assert_eq!(q.try_pop(), Some(FollowerId(102)));
        assert_eq!(q.try_pop(), Some(FollowerId(103)));
        assert_eq!(q.try_pop(), None);
        assert_eq!(q.enqueued(), 3);
    }

    #[test]
    fn duplicates_are_kept() {
        let q = WorkQueue::new();
        q.extend(ids(&[7, 7]));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn pushes_after_close_are_rejected() {
        let q = WorkQueue::new();
        q.close();
        assert!(!q.push(FollowerId(1)));
        assert!(q.is_empty());
        assert_eq!(q.enqueued(), 0);
    }

    #[tokio::test]
    async fn closed_queue_drains_before_ending() {
        let q = WorkQueue::new();
        let cancel = CancellationToken::new();
        q.extend(ids(&[1, 2]));
        q.close();
        assert_eq!(q.pop(&cancel).await, Some(FollowerId(1)));
        assert_eq!(q.pop(&cancel).await, Some(FollowerId(2)));
        assert_eq!(q.pop(&cancel).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn pop_waits_for_a_late_push() {
        let q = Arc::new(WorkQueue::new());
        let cancel = CancellationToken::new();

        let producer = q.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            producer.push(FollowerId(42));
        });

        let started = tokio::time::Instant::now();
        assert_eq!(q.pop(&cancel).await, Some(FollowerId(42)));
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn close_wakes_every_waiter() {
        let q = Arc::new(WorkQueue::new());
        let cancel = CancellationToken::new();

        let mut waiters = Vec::new();
        for _ in 0..3 {
            let q = q.clone();
            let cancel = cancel.clone();
            waiters.push(tokio::spawn(async move { q.pop(&cancel).await }));
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        q.close();

        for w in waiters {
            assert_eq!(w.await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn cancellation_releases_waiter() {
        let q = WorkQueue::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(q.pop(&cancel).await, None);
        assert!(!q.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_item_is_taken_exactly_once() {
        let q = Arc::new(WorkQueue::new());
        let cancel = CancellationToken::new();

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let q = q.clone();
            let cancel = cancel.clone();
            consumers.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(id) = q.pop(&cancel).await {
                    got.push(id.0);
                }
                got
            }));
        }

        for chunk in (0..500u64).collect::<Vec<_>>().chunks(50) {
            q.extend(ids(chunk));
            tokio::task::yield_now().await;
        }
        q.close();

        let mut all = Vec::new();
        for c in consumers {
            all.extend(c.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..500u64).collect::<Vec<_>>());
    }
}
