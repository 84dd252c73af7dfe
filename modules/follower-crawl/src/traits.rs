// Trait seams for the crawl engine.
//
// SocialGraph: the three graph reads the crawl needs, one client per credential.
// GraphConnector: turns a credential into an authenticated SocialGraph.
// DocumentStore: where activity items land.
//
// The engine only ever sees these traits, so tests drive it with the in-memory
// doubles in `testing` and no network or database.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use twitter_client::TwitterClient;

use crate::error::GraphError;
use crate::types::{ActivityItem, Credential, Cursor, FollowerId, FollowerPage, Profile};

// ---------------------------------------------------------------------------
// SocialGraph
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SocialGraph: Send + Sync {
    /// Profile of `account`, used to size the crawl.
    async fn profile(&self, account: &str) -> Result<Profile, GraphError>;

    /// One page of `account`'s followers starting at `cursor`.
    async fn followers_of(&self, account: &str, cursor: Cursor)
        -> Result<FollowerPage, GraphError>;

    /// The follower's most recent activity (a single page).
    async fn recent_activity_of(
        &self,
        follower: FollowerId,
    ) -> Result<Vec<ActivityItem>, GraphError>;
}

#[async_trait]
impl SocialGraph for TwitterClient {
    async fn profile(&self, account: &str) -> Result<Profile, GraphError> {
        let user = self.show_user(account).await?;
        Ok(Profile {
            followers_count: user.followers_count,
        })
    }

    async fn followers_of(
        &self,
        account: &str,
        cursor: Cursor,
    ) -> Result<FollowerPage, GraphError> {
        let page = self.follower_ids(account, cursor.0).await?;
        Ok(FollowerPage {
            ids: page.ids.into_iter().map(FollowerId).collect(),
            next_cursor: Cursor(page.next_cursor),
        })
    }

    async fn recent_activity_of(
        &self,
        follower: FollowerId,
    ) -> Result<Vec<ActivityItem>, GraphError> {
        let tweets = self.user_timeline(follower.0).await?;
        Ok(tweets
            .into_iter()
            .map(|document| ActivityItem { follower, document })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// GraphConnector
// ---------------------------------------------------------------------------

#[async_trait]
pub trait GraphConnector: Send + Sync {
    async fn connect(&self, credential: &Credential) -> Result<Arc<dyn SocialGraph>>;
}

/// Authenticates one `TwitterClient` per credential (application-only OAuth2).
pub struct TwitterConnector;

#[async_trait]
impl GraphConnector for TwitterConnector {
    async fn connect(&self, credential: &Credential) -> Result<Arc<dyn SocialGraph>> {
        let client = TwitterClient::authenticate(&credential.app_key, &credential.app_secret)
            .await
            .with_context(|| {
                format!(
                    "Failed to obtain bearer token for app key {}",
                    credential.redacted_key()
                )
            })?;
        Ok(Arc::new(client))
    }
}

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert one item. Items are independent; there is no batching.
    async fn insert(&self, item: &ActivityItem) -> Result<()>;
}
