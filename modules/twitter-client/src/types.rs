use serde::{Deserialize, Serialize};

/// Cursor value that starts a `followers/ids` walk.
pub const INITIAL_CURSOR: i64 = -1;

/// Cursor value returned once the last page has been served.
pub const TERMINAL_CURSOR: i64 = 0;

/// Subset of `users/show` needed to size a crawl.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub screen_name: String,
    pub followers_count: u64,
}

/// One page of `followers/ids`.
#[derive(Debug, Clone, Deserialize)]
pub struct FollowerIdsPage {
    pub ids: Vec<u64>,
    pub next_cursor: i64,
}

impl FollowerIdsPage {
    pub fn is_last(&self) -> bool {
        self.next_cursor == TERMINAL_CURSOR
    }
}

/// Response body of `oauth2/token`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub token_type: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub grant_type: &'a str,
}

/// A tweet exactly as the API returned it. The crawler never looks inside.
pub type RawTweet = serde_json::Value;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follower_page_decodes_and_detects_last() {
        let body = r#"{"ids":[101,102],"next_cursor":1374004777531007833,"previous_cursor":0}"#;
        let page: FollowerIdsPage = serde_json::from_str(body).unwrap();
        assert_eq!(page.ids, vec![101, 102]);
        assert!(!page.is_last());

        let last: FollowerIdsPage =
            serde_json::from_str(r#"{"ids":[103],"next_cursor":0}"#).unwrap();
        assert!(last.is_last());
    }

    #[test]
    fn profile_ignores_unknown_fields() {
        let body = r#"{"id":7,"screen_name":"seed","followers_count":3,"verified":false}"#;
        let profile: UserProfile = serde_json::from_str(body).unwrap();
        assert_eq!(profile.followers_count, 3);
        assert_eq!(profile.screen_name, "seed");
    }
}
