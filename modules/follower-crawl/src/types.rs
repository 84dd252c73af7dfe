use std::fmt;

use serde::{Deserialize, Serialize};

// --- Graph identifiers ---

/// Numeric id of an account that follows the seed account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FollowerId(pub u64);

impl fmt::Display for FollowerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for FollowerId {
    fn from(id: u64) -> Self {
        FollowerId(id)
    }
}

/// Pagination token for the follower listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor(pub i64);

impl Cursor {
    /// Cursor that requests the first page.
    pub const START: Cursor = Cursor(twitter_client::INITIAL_CURSOR);
    /// Cursor returned after the last page.
    pub const END: Cursor = Cursor(twitter_client::TERMINAL_CURSOR);

    pub fn is_end(self) -> bool {
        self == Self::END
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub followers_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowerPage {
    pub ids: Vec<FollowerId>,
    pub next_cursor: Cursor,
}

// --- Activity ---

/// One unit of a follower's public activity. `document` is stored exactly as
/// the API returned it.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityItem {
    pub follower: FollowerId,
    pub document: serde_json::Value,
}

// --- Credentials ---

/// An app key/secret pair. Each one carries its own rate-limit budget.
#[derive(Clone, Deserialize)]
pub struct Credential {
    pub app_key: String,
    pub app_secret: String,
}

impl Credential {
    pub fn new(app_key: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            app_secret: app_secret.into(),
        }
    }

    /// App key with everything but the last four characters masked.
    pub fn redacted_key(&self) -> String {
        let chars: Vec<char> = self.app_key.chars().collect();
        let visible = chars.len().saturating_sub(4);
        let tail: String = chars[visible..].iter().collect();
        format!("{}{}", "*".repeat(visible.min(8)), tail)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("app_key", &self.redacted_key())
            .field("app_secret", &"[redacted]")
            .finish()
    }
}

// --- Failure audit ---

/// Why a follower's activity was not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The follower's activity does not exist (deleted or suspended account).
    NotFound,
    /// The worker's credential was refused for this follower.
    Unauthorized,
    /// Transient errors persisted past the retry cap.
    Exhausted,
    /// The run was cancelled while this follower was in flight.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowerFailure {
    pub follower: FollowerId,
    pub kind: FailureKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_debug_never_prints_secret() {
        let cred = Credential::new("abcdefghijkl", "topsecret");
        let shown = format!("{cred:?}");
        assert!(!shown.contains("topsecret"));
        assert!(!shown.contains("abcdefgh"));
        assert!(shown.contains("ijkl"));
    }

    #[test]
    fn short_keys_are_not_padded_out() {
        let cred = Credential::new("ab", "s");
        assert_eq!(cred.redacted_key(), "ab");
    }

    #[test]
    fn cursor_sentinels() {
        assert!(Cursor::END.is_end());
        assert!(!Cursor::START.is_end());
        assert!(!Cursor(1_374_004_777_531_007_833).is_end());
    }
}
