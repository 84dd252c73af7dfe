use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::WorkQueue;
use crate::retry::{Outcome, RetryPolicy};
use crate::traits::SocialGraph;
use crate::types::Cursor;

/// Walks the seed account's follower list and feeds every id into the queue.
pub struct FollowerProducer {
    graph: Arc<dyn SocialGraph>,
    seed: String,
    queue: Arc<WorkQueue>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductionSummary {
    pub pages: u64,
    pub enqueued: u64,
    /// True when pagination reached the terminal cursor.
    pub complete: bool,
}

/// Closes the queue however the producer exits, so waiting workers are
/// always released.
struct CloseOnDrop(Arc<WorkQueue>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

impl FollowerProducer {
    pub fn new(
        graph: Arc<dyn SocialGraph>,
        seed: impl Into<String>,
        queue: Arc<WorkQueue>,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            graph,
            seed: seed.into(),
            queue,
            policy,
            cancel,
        }
    }

    pub async fn run(self) -> ProductionSummary {
        let _close = CloseOnDrop(self.queue.clone());
        let mut summary = ProductionSummary::default();
        let mut cursor = Cursor::START;

        info!(seed = self.seed.as_str(), "Filling queue of followers");

        while !cursor.is_end() {
            let graph = &self.graph;
            let seed = self.seed.as_str();
            let outcome = self
                .policy
                .run("followers_of", &self.cancel, move || {
                    graph.followers_of(seed, cursor)
                })
                .await;

            match outcome {
                Outcome::Success(page) => {
                    let added = self.queue.extend(page.ids);
                    summary.pages += 1;
                    summary.enqueued += added as u64;
                    debug!(
                        %cursor,
                        next_cursor = %page.next_cursor,
                        added,
                        queued = self.queue.len(),
                        "Enqueued follower page"
                    );
                    cursor = page.next_cursor;
                }
                Outcome::Skipped => {
                    error!(seed, %cursor, "Seed account not found; stopping follower listing");
                    return summary;
                }
                Outcome::Aborted => {
                    error!(seed, %cursor, "Credential refused for follower listing; stopping");
                    return summary;
                }
                Outcome::Exhausted {
                    attempts,
                    last_error,
                } => {
                    error!(
                        seed,
                        %cursor,
                        attempts,
                        error = last_error.as_str(),
                        "Follower listing kept failing; stopping"
                    );
                    return summary;
                }
                Outcome::Cancelled => {
                    warn!(seed, %cursor, "Follower listing cancelled");
                    return summary;
                }
            }
        }

        summary.complete = true;
        info!(
            pages = summary.pages,
            enqueued = summary.enqueued,
            "All followers already in queue"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::GraphError;
    use crate::testing::MockGraph;
    use crate::types::FollowerId;

    fn producer(
        graph: MockGraph,
        queue: &Arc<WorkQueue>,
        cancel: &CancellationToken,
    ) -> FollowerProducer {
        FollowerProducer::new(
            Arc::new(graph),
            "seed",
            queue.clone(),
            RetryPolicy::new(Duration::from_secs(1), 2),
            cancel.clone(),
        )
    }

    #[tokio::test]
    async fn walks_every_page_then_closes_queue() {
        let queue = Arc::new(WorkQueue::new());
        let graph = MockGraph::new(3).with_pages(&[&[1, 2], &[3]]);

        let summary = producer(graph, &queue, &CancellationToken::new()).run().await;

        assert_eq!(
            summary,
            ProductionSummary {
                pages: 2,
                enqueued: 3,
                complete: true,
            }
        );
        assert!(queue.is_closed());
        let drained: Vec<_> = std::iter::from_fn(|| queue.try_pop()).collect();
        assert_eq!(drained, vec![FollowerId(1), FollowerId(2), FollowerId(3)]);
    }

    #[tokio::test]
    async fn refused_credential_stops_listing_and_closes_queue() {
        let queue = Arc::new(WorkQueue::new());
        let graph = MockGraph::new(3)
            .with_pages(&[&[1, 2], &[3]])
            .fail_page_once(1, GraphError::Unauthorized("revoked".into()));

        let summary = producer(graph, &queue, &CancellationToken::new()).run().await;

        assert!(!summary.complete);
        assert_eq!(summary.enqueued, 2);
        assert!(queue.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_page_stops_listing() {
        let queue = Arc::new(WorkQueue::new());
        let graph = MockGraph::new(1)
            .with_pages(&[&[1]])
            .fail_page_once(0, GraphError::Other("HTTP 502".into()))
            .fail_page_once(0, GraphError::Other("HTTP 502".into()));

        let summary = producer(graph, &queue, &CancellationToken::new()).run().await;

        assert_eq!(summary.pages, 0);
        assert!(!summary.complete);
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn cancelled_before_start_enqueues_nothing() {
        let queue = Arc::new(WorkQueue::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = producer(MockGraph::new(1).with_pages(&[&[1]]), &queue, &cancel)
            .run()
            .await;

        assert_eq!(summary.enqueued, 0);
        assert!(queue.is_closed());
    }
}
