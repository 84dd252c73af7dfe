pub mod error;
pub mod types;

pub use error::{Result, TwitterError};
pub use types::{
    FollowerIdsPage, RawTweet, TokenResponse, UserProfile, INITIAL_CURSOR, TERMINAL_CURSOR,
};

use std::time::Duration;

use serde::de::DeserializeOwned;
use types::TokenRequest;

const BASE_URL: &str = "https://api.twitter.com";

const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";

/// Client bound to a single application bearer token. Every instance carries
/// its own rate-limit budget on the Twitter side.
#[derive(Clone)]
pub struct TwitterClient {
    client: reqwest::Client,
    base_url: String,
    bearer: String,
}

impl TwitterClient {
    /// Exchange an app key/secret pair for a bearer token (application-only OAuth2)
    /// and return a client bound to it.
    pub async fn authenticate(app_key: &str, app_secret: &str) -> Result<Self> {
        Self::authenticate_at(BASE_URL, app_key, app_secret).await
    }

    pub async fn authenticate_at(base_url: &str, app_key: &str, app_secret: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let resp = client
            .post(format!("{}/oauth2/token", base_url))
            .basic_auth(app_key, Some(app_secret))
            .form(&TokenRequest {
                grant_type: "client_credentials",
            })
            .send()
            .await?;

        let resp = check_status(resp).await?;
        let token: TokenResponse = resp.json().await?;
        if !token.token_type.eq_ignore_ascii_case("bearer") {
            return Err(TwitterError::Unauthorized(format!(
                "unexpected token type: {}",
                token.token_type
            )));
        }

        tracing::debug!("Obtained application bearer token");

        Ok(Self {
            client,
            base_url,
            bearer: token.access_token,
        })
    }

    /// `users/show`: profile of one account, including its follower count.
    pub async fn show_user(&self, screen_name: &str) -> Result<UserProfile> {
        self.get("/1.1/users/show.json", &[("screen_name", screen_name.to_string())])
            .await
    }

    /// `followers/ids`: one page of follower ids. Start with [`INITIAL_CURSOR`];
    /// a page whose `next_cursor` is [`TERMINAL_CURSOR`] is the last one.
    pub async fn follower_ids(&self, screen_name: &str, cursor: i64) -> Result<FollowerIdsPage> {
        tracing::debug!(screen_name, cursor, "Fetching follower ids page");
        self.get(
            "/1.1/followers/ids.json",
            &[
                ("screen_name", screen_name.to_string()),
                ("cursor", cursor.to_string()),
            ],
        )
        .await
    }

    /// `statuses/user_timeline`: the most recent page of a user's tweets.
    pub async fn user_timeline(&self, user_id: u64) -> Result<Vec<RawTweet>> {
        self.get(
            "/1.1/statuses/user_timeline.json",
            &[("user_id", user_id.to_string())],
        )
        .await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer)
            .query(query)
            .send()
            .await?;

        let resp = check_status(resp).await?;
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let reset = resp
        .headers()
        .get(RATE_LIMIT_RESET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp.text().await.unwrap_or_default();
    Err(TwitterError::from_status(
        status.as_u16(),
        reset.as_deref(),
        body,
    ))
}
