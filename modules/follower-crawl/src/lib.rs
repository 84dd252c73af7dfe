pub mod config;
pub mod countdown;
pub mod crawl;
pub mod error;
pub mod producer;
pub mod queue;
pub mod retry;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod types;
pub mod worker;

pub use config::{load_credentials, CrawlConfig};
pub use countdown::Countdown;
pub use crawl::{pool_size, CrawlReport, Crawler};
pub use error::{CrawlError, GraphError};
pub use producer::{FollowerProducer, ProductionSummary};
pub use queue::WorkQueue;
pub use retry::{Decision, Outcome, RetryPolicy};
pub use store::PgDocumentStore;
pub use traits::{DocumentStore, GraphConnector, SocialGraph, TwitterConnector};
pub use types::{
    ActivityItem, Credential, Cursor, FailureKind, FollowerFailure, FollowerId, FollowerPage,
    Profile,
};
pub use worker::{ActivityWorker, WorkerStats};
