// Test doubles for the crawl engine.
//
// Three mocks matching the three trait boundaries:
// - MockGraph (SocialGraph): scripted follower pages, timelines and failures
// - MockConnector (GraphConnector): hands out a shared MockGraph per credential
// - MemoryDocumentStore (DocumentStore): in-memory item log with failure injection

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::error::GraphError;
use crate::traits::{DocumentStore, GraphConnector, SocialGraph};
use crate::types::{ActivityItem, Credential, Cursor, FollowerId, FollowerPage, Profile};

/// Build follower ids from raw numbers.
pub fn follower_ids(raw: &[u64]) -> Vec<FollowerId> {
    raw.iter().copied().map(FollowerId).collect()
}

/// A fake tweet document for `follower`.
pub fn tweet(follower: u64, n: u64) -> serde_json::Value {
    serde_json::json!({
        "id": follower * 1000 + n,
        "user": { "id": follower },
        "text": format!("tweet {n} from {follower}"),
    })
}

/// A rate-limit error whose reset is `secs` from now.
pub fn rate_limited_for(secs: i64) -> GraphError {
    GraphError::RateLimited {
        resume_at: Utc::now() + chrono::Duration::seconds(secs),
    }
}

// ---------------------------------------------------------------------------
// MockGraph
// ---------------------------------------------------------------------------

/// Scripted social graph.
///
/// Follower pages are chained by cursor: page 0 is served at `Cursor::START`,
/// page *n* at `Cursor(n)`, and the last page points at `Cursor::END`.
/// Scripted failures are returned (in order) before the call succeeds.
pub struct MockGraph {
    followers_count: u64,
    pages: Vec<Vec<FollowerId>>,
    page_delay: Duration,
    timelines: HashMap<FollowerId, Vec<serde_json::Value>>,
    always_fail: HashMap<FollowerId, GraphError>,
    profile_failures: Mutex<VecDeque<GraphError>>,
    page_failures: Mutex<HashMap<usize, VecDeque<GraphError>>>,
    activity_failures: Mutex<HashMap<FollowerId, VecDeque<GraphError>>>,
    activity_calls: Mutex<Vec<FollowerId>>,
    page_calls: Mutex<Vec<Cursor>>,
}

impl MockGraph {
    pub fn new(followers_count: u64) -> Self {
        Self {
            followers_count,
            pages: Vec::new(),
            page_delay: Duration::ZERO,
            timelines: HashMap::new(),
            always_fail: HashMap::new(),
            profile_failures: Mutex::new(VecDeque::new()),
            page_failures: Mutex::new(HashMap::new()),
            activity_failures: Mutex::new(HashMap::new()),
            activity_calls: Mutex::new(Vec::new()),
            page_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pages(mut self, pages: &[&[u64]]) -> Self {
        self.pages = pages.iter().map(|p| follower_ids(p)).collect();
        self
    }

    /// Sleep this long before serving every follower page.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn on_activity(mut self, follower: u64, items: Vec<serde_json::Value>) -> Self {
        self.timelines.insert(FollowerId(follower), items);
        self
    }

    /// Register `count` generated tweets for each follower.
    pub fn with_tweets(mut self, followers: &[u64], count: u64) -> Self {
        for &f in followers {
            self.timelines
                .insert(FollowerId(f), (0..count).map(|n| tweet(f, n)).collect());
        }
        self
    }

    pub fn fail_profile_once(self, err: GraphError) -> Self {
        self.profile_failures.lock().unwrap().push_back(err);
        self
    }

    pub fn fail_page_once(self, page: usize, err: GraphError) -> Self {
        self.page_failures
            .lock()
            .unwrap()
            .entry(page)
            .or_default()
            .push_back(err);
        self
    }

    pub fn fail_activity_once(self, follower: u64, err: GraphError) -> Self {
        self.activity_failures
            .lock()
            .unwrap()
            .entry(FollowerId(follower))
            .or_default()
            .push_back(err);
        self
    }

    pub fn always_fail_activity(mut self, follower: u64, err: GraphError) -> Self {
        self.always_fail.insert(FollowerId(follower), err);
        self
    }

    /// Every `recent_activity_of` call, in call order.
    pub fn activity_calls(&self) -> Vec<FollowerId> {
        self.activity_calls.lock().unwrap().clone()
    }

    pub fn activity_call_count(&self, follower: u64) -> usize {
        self.activity_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.0 == follower)
            .count()
    }

    /// Every `followers_of` call, in call order.
    pub fn page_calls(&self) -> Vec<Cursor> {
        self.page_calls.lock().unwrap().clone()
    }

    fn page_index(&self, cursor: Cursor) -> Option<usize> {
        if cursor == Cursor::START {
            return Some(0);
        }
        usize::try_from(cursor.0)
            .ok()
            .filter(|i| *i > 0 && *i < self.pages.len())
    }
}

#[async_trait]
impl SocialGraph for MockGraph {
    async fn profile(&self, _account: &str) -> Result<Profile, GraphError> {
        if let Some(err) = self.profile_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(Profile {
            followers_count: self.followers_count,
        })
    }

    async fn followers_of(
        &self,
        account: &str,
        cursor: Cursor,
    ) -> Result<FollowerPage, GraphError> {
        self.page_calls.lock().unwrap().push(cursor);
        if !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }

        if self.pages.is_empty() {
            return Ok(FollowerPage {
                ids: Vec::new(),
                next_cursor: Cursor::END,
            });
        }

        let Some(index) = self.page_index(cursor) else {
            return Err(GraphError::NotFound(format!("{account} has no page at cursor {cursor}")));
        };

        let scripted = self
            .page_failures
            .lock()
            .unwrap()
            .get_mut(&index)
            .and_then(|q| q.pop_front());
        if let Some(err) = scripted {
            return Err(err);
        }

        let next_cursor = if index + 1 == self.pages.len() {
            Cursor::END
        } else {
            Cursor(index as i64 + 1)
        };
        Ok(FollowerPage {
            ids: self.pages[index].clone(),
            next_cursor,
        })
    }

    async fn recent_activity_of(
        &self,
        follower: FollowerId,
    ) -> Result<Vec<ActivityItem>, GraphError> {
        self.activity_calls.lock().unwrap().push(follower);

        if let Some(err) = self.always_fail.get(&follower) {
            return Err(err.clone());
        }
        let scripted = self
            .activity_failures
            .lock()
            .unwrap()
            .get_mut(&follower)
            .and_then(|q| q.pop_front());
        if let Some(err) = scripted {
            return Err(err);
        }

        Ok(self
            .timelines
            .get(&follower)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|document| ActivityItem { follower, document })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MockConnector
// ---------------------------------------------------------------------------

/// Returns the same `MockGraph` for every credential, so assertions can see
/// calls from all workers. Credentials listed via `reject` fail to connect.
pub struct MockConnector {
    graph: Arc<MockGraph>,
    rejected: HashSet<String>,
    connected: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(graph: Arc<MockGraph>) -> Self {
        Self {
            graph,
            rejected: HashSet::new(),
            connected: Mutex::new(Vec::new()),
        }
    }

    pub fn reject(mut self, app_key: &str) -> Self {
        self.rejected.insert(app_key.to_string());
        self
    }

    /// App keys of every successful `connect`, in order.
    pub fn connected(&self) -> Vec<String> {
        self.connected.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphConnector for MockConnector {
    async fn connect(&self, credential: &Credential) -> Result<Arc<dyn SocialGraph>> {
        if self.rejected.contains(&credential.app_key) {
            bail!("bearer token request refused for {}", credential.app_key);
        }
        self.connected
            .lock()
            .unwrap()
            .push(credential.app_key.clone());
        Ok(self.graph.clone())
    }
}

/// `n` distinct dummy credentials: key0/secret0, key1/secret1, ...
pub fn credentials(n: usize) -> Vec<Credential> {
    (0..n)
        .map(|i| Credential::new(format!("key{i}"), format!("secret{i}")))
        .collect()
}

// ---------------------------------------------------------------------------
// MemoryDocumentStore
// ---------------------------------------------------------------------------

/// In-memory document store. Thread-safe. Inserts for followers listed via
/// `fail_for` return an error and are not recorded.
#[derive(Default)]
pub struct MemoryDocumentStore {
    items: Mutex<Vec<ActivityItem>>,
    failing: HashSet<FollowerId>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(mut self, follower: u64) -> Self {
        self.failing.insert(FollowerId(follower));
        self
    }

    /// Every stored item, in insertion order.
    pub fn items(&self) -> Vec<ActivityItem> {
        self.items.lock().unwrap().clone()
    }

    pub fn items_for(&self, follower: u64) -> Vec<ActivityItem> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.follower.0 == follower)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, item: &ActivityItem) -> Result<()> {
        if self.failing.contains(&item.follower) {
            bail!("insert refused for follower {}", item.follower);
        }
        self.items.lock().unwrap().push(item.clone());
        Ok(())
    }
}
