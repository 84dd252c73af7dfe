use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::countdown::Countdown;
use crate::queue::WorkQueue;
use crate::retry::{Outcome, RetryPolicy};
use crate::traits::{DocumentStore, SocialGraph};
use crate::types::{FailureKind, FollowerFailure, FollowerId};

/// Pulls follower ids off the shared queue and persists each follower's
/// recent activity, using one credential for the whole run.
pub struct ActivityWorker {
    index: usize,
    graph: Arc<dyn SocialGraph>,
    store: Arc<dyn DocumentStore>,
    queue: Arc<WorkQueue>,
    countdown: Arc<Countdown>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Followers dequeued and settled (success or definitive failure).
    pub processed: u64,
    pub items_persisted: u64,
    pub items_failed: u64,
    pub failures: Vec<FollowerFailure>,
}

impl WorkerStats {
    pub fn merge(&mut self, other: WorkerStats) {
        self.processed += other.processed;
        self.items_persisted += other.items_persisted;
        self.items_failed += other.items_failed;
        self.failures.extend(other.failures);
    }
}

pub struct ActivityWorkerParams {
    pub index: usize,
    pub graph: Arc<dyn SocialGraph>,
    pub store: Arc<dyn DocumentStore>,
    pub queue: Arc<WorkQueue>,
    pub countdown: Arc<Countdown>,
    pub policy: RetryPolicy,
    pub cancel: CancellationToken,
}

impl ActivityWorker {
    pub fn new(params: ActivityWorkerParams) -> Self {
        Self {
            index: params.index,
            graph: params.graph,
            store: params.store,
            queue: params.queue,
            countdown: params.countdown,
            policy: params.policy,
            cancel: params.cancel,
        }
    }

    pub async fn run(self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        let worker = self.index;

        while let Some(follower) = self.queue.pop(&self.cancel).await {
            info!(worker, %follower, "Fetching recent activity");

            if let Some(kind) = self.process(follower, &mut stats).await {
                stats.failures.push(FollowerFailure { follower, kind });
                if kind == FailureKind::Cancelled {
                    // Not settled, so not counted down.
                    break;
                }
            }

            stats.processed += 1;
            let remaining = self.countdown.decrement();
            debug!(worker, remaining, "Followers left to crawl");
        }

        if self.cancel.is_cancelled() {
            warn!(worker, processed = stats.processed, "Worker cancelled");
        } else {
            info!(
                worker,
                processed = stats.processed,
                items = stats.items_persisted,
                countdown_finished = self.countdown.finished(),
                "Follower queue drained, worker exiting"
            );
        }
        stats
    }

    /// Fetch and persist one follower's activity. Returns the failure kind
    /// when nothing could be fetched.
    async fn process(
        &self,
        follower: FollowerId,
        stats: &mut WorkerStats,
    ) -> Option<FailureKind> {
        let graph = &self.graph;
        let outcome = self
            .policy
            .run("recent_activity_of", &self.cancel, move || {
                graph.recent_activity_of(follower)
            })
            .await;

        let items = match outcome {
            Outcome::Success(items) => items,
            Outcome::Skipped => return Some(FailureKind::NotFound),
            Outcome::Aborted => return Some(FailureKind::Unauthorized),
            Outcome::Exhausted { .. } => return Some(FailureKind::Exhausted),
            Outcome::Cancelled => return Some(FailureKind::Cancelled),
        };

        for item in &items {
            match self.store.insert(item).await {
                Ok(()) => stats.items_persisted += 1,
                Err(e) => {
                    stats.items_failed += 1;
                    warn!(
                        worker = self.index,
                        %follower,
                        error = %e,
                        "Failed to persist activity item"
                    );
                }
            }
        }
        debug!(worker = self.index, %follower, count = items.len(), "Persisted activity");
        None
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::GraphError;
    use crate::testing::{tweet, MemoryDocumentStore, MockGraph};

    struct Fixture {
        graph: Arc<MockGraph>,
        store: Arc<MemoryDocumentStore>,
        queue: Arc<WorkQueue>,
        countdown: Arc<Countdown>,
    }

    impl Fixture {
        fn new(graph: MockGraph, followers: &[u64]) -> Self {
            let queue = Arc::new(WorkQueue::new());
            queue.extend(followers.iter().copied().map(FollowerId));
            queue.close();
            Self {
                graph: Arc::new(graph),
                store: Arc::new(MemoryDocumentStore::new()),
                queue,
                countdown: Arc::new(Countdown::new(followers.len() as u64)),
            }
        }

        fn worker(&self, cancel: CancellationToken) -> ActivityWorker {
            ActivityWorker::new(ActivityWorkerParams {
                index: 0,
                graph: self.graph.clone(),
                store: self.store.clone(),
                queue: self.queue.clone(),
                countdown: self.countdown.clone(),
                policy: RetryPolicy::new(Duration::from_secs(1), 2),
                cancel,
            })
        }
    }

    #[tokio::test]
    async fn drains_closed_queue_and_counts_down() {
        let graph = MockGraph::new(2)
            .on_activity(1, vec![tweet(1, 0), tweet(1, 1)])
            .on_activity(2, vec![tweet(2, 0)]);
        let f = Fixture::new(graph, &[1, 2]);

        let stats = f.worker(CancellationToken::new()).run().await;

        assert_eq!(stats.processed, 2);
        assert_eq!(stats.items_persisted, 3);
        assert!(stats.failures.is_empty());
        assert!(f.countdown.finished());
        assert!(f.queue.is_empty());
    }

    #[tokio::test]
    async fn definitive_failure_still_counts_down() {
        let graph = MockGraph::new(1).always_fail_activity(1, GraphError::NotFound("gone".into()));
        let f = Fixture::new(graph, &[1]);

        let stats = f.worker(CancellationToken::new()).run().await;

        assert_eq!(stats.processed, 1);
        assert_eq!(
            stats.failures,
            vec![FollowerFailure {
                follower: FollowerId(1),
                kind: FailureKind::NotFound,
            }]
        );
        assert!(f.countdown.finished());
    }

    #[tokio::test]
    async fn cancelled_worker_leaves_countdown_untouched() {
        let f = Fixture::new(MockGraph::new(2), &[1, 2]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stats = f.worker(cancel).run().await;

        assert_eq!(stats.processed, 0);
        assert_eq!(f.countdown.remaining(), 2);
    }

    #[test]
    fn stats_merge_adds_up() {
        let mut total = WorkerStats {
            processed: 1,
            items_persisted: 2,
            items_failed: 0,
            failures: vec![],
        };
        total.merge(WorkerStats {
            processed: 3,
            items_persisted: 4,
            items_failed: 1,
            failures: vec![FollowerFailure {
                follower: FollowerId(9),
                kind: FailureKind::Exhausted,
            }],
        });
        assert_eq!(total.processed, 4);
        assert_eq!(total.items_persisted, 6);
        assert_eq!(total.items_failed, 1);
        assert_eq!(total.failures.len(), 1);
    }
}
