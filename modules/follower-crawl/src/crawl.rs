//! Orchestration of one crawl run.
//!
//! Resolve the seed's follower count → connect one client per credential →
//! spawn the producer and the worker pool → join everything → report.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::countdown::Countdown;
use crate::error::CrawlError;
use crate::producer::{FollowerProducer, ProductionSummary};
use crate::queue::WorkQueue;
use crate::retry::{Outcome, RetryPolicy};
use crate::traits::{DocumentStore, GraphConnector, SocialGraph};
use crate::types::{Credential, FollowerFailure};
use crate::worker::{ActivityWorker, ActivityWorkerParams, WorkerStats};

/// Summary of a finished (or cancelled) run.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub run_id: Uuid,
    pub seed: String,
    pub workers: usize,
    pub followers_expected: u64,
    pub enqueued: u64,
    pub processed: u64,
    pub items_persisted: u64,
    pub items_failed: u64,
    /// Countdown value at the end of the run. Non-zero when the graph
    /// yielded fewer ids than the profile announced, or the run was cancelled.
    pub remaining: u64,
    /// Followers processed beyond the announced count.
    pub surplus: u64,
    pub production_complete: bool,
    pub cancelled: bool,
    pub failures: Vec<FollowerFailure>,
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seed={} workers={} expected={} enqueued={} processed={} persisted={} \
             insert_failures={} follower_failures={} remaining={} complete={}",
            self.seed,
            self.workers,
            self.followers_expected,
            self.enqueued,
            self.processed,
            self.items_persisted,
            self.items_failed,
            self.failures.len(),
            self.remaining,
            self.production_complete && !self.cancelled,
        )
    }
}

impl CrawlReport {
    /// Err when the run was cancelled before every follower was settled.
    pub fn ensure_finished(&self) -> Result<(), CrawlError> {
        if self.cancelled {
            return Err(CrawlError::Interrupted {
                remaining: self.remaining,
            });
        }
        Ok(())
    }
}

/// Number of workers for `credentials` credentials under an optional ceiling.
pub fn pool_size(max_workers: Option<usize>, credentials: usize) -> usize {
    max_workers.map_or(credentials, |cap| cap.max(1).min(credentials))
}

pub struct Crawler {
    connector: Arc<dyn GraphConnector>,
    store: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
    max_workers: Option<usize>,
    run_id: Uuid,
    cancel: CancellationToken,
}

impl Crawler {
    pub fn new(connector: Arc<dyn GraphConnector>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            connector,
            store,
            policy: RetryPolicy::default(),
            max_workers: None,
            run_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Cap the pool below the number of credentials.
    pub fn with_max_workers(mut self, max_workers: Option<usize>) -> Self {
        self.max_workers = max_workers.map(|n| n.max(1));
        self
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the producer and every worker at their next wait.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Crawl `seed`'s followers using one worker per credential.
    ///
    /// Fails before spawning anything when there are no credentials, a client
    /// cannot be authenticated, or the follower count cannot be resolved.
    pub async fn run(
        &self,
        seed: &str,
        credentials: &[Credential],
    ) -> Result<CrawlReport, CrawlError> {
        let Some(seed_credential) = credentials.first() else {
            return Err(CrawlError::NoCredentials);
        };

        let pool_size = pool_size(self.max_workers, credentials.len());
        if pool_size < credentials.len() {
            warn!(
                credentials = credentials.len(),
                workers = pool_size,
                "More credentials than workers; surplus credentials stay idle"
            );
        }

        // 1. Follower count, through the same policy as every other call
        let seed_graph = self
            .connector
            .connect(seed_credential)
            .await
            .context("Failed to set up seed client")?;
        let followers_count = self.resolve_followers_count(&seed_graph, seed).await?;
        info!(seed, followers_count, run_id = %self.run_id, "Number of followers");

        // 2. One authenticated client per worker, before any task starts
        let mut worker_graphs = Vec::with_capacity(pool_size);
        for (index, credential) in credentials.iter().take(pool_size).enumerate() {
            let graph = self
                .connector
                .connect(credential)
                .await
                .with_context(|| format!("Failed to set up client for worker {index}"))?;
            worker_graphs.push(graph);
        }

        let queue = Arc::new(WorkQueue::new());
        let countdown = Arc::new(Countdown::new(followers_count));

        // 3. Producer
        let producer = FollowerProducer::new(
            seed_graph,
            seed,
            queue.clone(),
            self.policy,
            self.cancel.clone(),
        );
        let producer_handle = tokio::spawn(producer.run());

        // 4. Worker pool
        let worker_handles: Vec<_> = worker_graphs
            .into_iter()
            .enumerate()
            .map(|(index, graph)| {
                let worker = ActivityWorker::new(ActivityWorkerParams {
                    index,
                    graph,
                    store: self.store.clone(),
                    queue: queue.clone(),
                    countdown: countdown.clone(),
                    policy: self.policy,
                    cancel: self.cancel.clone(),
                });
                tokio::spawn(worker.run())
            })
            .collect();
        info!(workers = worker_handles.len(), "Workers started");

        // 5. Join
        let production = match producer_handle.await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "Follower producer task failed");
                ProductionSummary::default()
            }
        };

        let mut totals = WorkerStats::default();
        for (index, joined) in join_all(worker_handles).await.into_iter().enumerate() {
            match joined {
                Ok(stats) => totals.merge(stats),
                Err(e) => error!(worker = index, error = %e, "Worker task failed"),
            }
        }

        let report = CrawlReport {
            run_id: self.run_id,
            seed: seed.to_string(),
            workers: pool_size,
            followers_expected: followers_count,
            enqueued: queue.enqueued(),
            processed: totals.processed,
            items_persisted: totals.items_persisted,
            items_failed: totals.items_failed,
            remaining: countdown.remaining(),
            surplus: countdown.surplus(),
            production_complete: production.complete,
            cancelled: self.cancel.is_cancelled(),
            failures: totals.failures,
        };

        if !report.cancelled && report.remaining > 0 {
            warn!(
                remaining = report.remaining,
                "Follower listing ended before the countdown reached zero"
            );
        }

        Ok(report)
    }

    async fn resolve_followers_count(
        &self,
        graph: &Arc<dyn SocialGraph>,
        seed: &str,
    ) -> Result<u64, CrawlError> {
        let outcome = self
            .policy
            .run("profile", &self.cancel, move || graph.profile(seed))
            .await;

        let reason = match outcome {
            Outcome::Success(profile) => return Ok(profile.followers_count),
            Outcome::Skipped => "account not found".to_string(),
            Outcome::Aborted => "credential refused".to_string(),
            Outcome::Exhausted {
                attempts,
                last_error,
            } => format!("gave up after {attempts} attempts: {last_error}"),
            Outcome::Cancelled => "cancelled".to_string(),
        };
        Err(CrawlError::SeedLookup {
            account: seed.to_string(),
            reason,
        })
    }
}
