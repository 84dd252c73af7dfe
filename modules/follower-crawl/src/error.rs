use chrono::{DateTime, Utc};
use thiserror::Error;
use twitter_client::TwitterError;

/// Failure of a single social-graph call, reduced to the cases the retry
/// policy distinguishes.
#[derive(Debug, Clone, Error)]
pub enum GraphError {
    #[error("Rate limited until {resume_at}")]
    RateLimited { resume_at: DateTime<Utc> },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl From<TwitterError> for GraphError {
    fn from(err: TwitterError) -> Self {
        match err {
            TwitterError::RateLimited { reset_at } => GraphError::RateLimited {
                resume_at: reset_at,
            },
            TwitterError::Unauthorized(msg) => GraphError::Unauthorized(msg),
            TwitterError::NotFound(msg) => GraphError::NotFound(msg),
            other => GraphError::Other(other.to_string()),
        }
    }
}

/// Errors that end a crawl run before or instead of producing a report.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("No API credentials configured; nothing would consume the follower queue")]
    NoCredentials,

    #[error("Could not resolve follower count for {account}: {reason}")]
    SeedLookup { account: String, reason: String },

    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Crawl interrupted with {remaining} followers left")]
    Interrupted { remaining: u64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twitter_errors_map_onto_policy_cases() {
        let reset_at = Utc::now();
        assert!(matches!(
            GraphError::from(TwitterError::RateLimited { reset_at }),
            GraphError::RateLimited { resume_at } if resume_at == reset_at
        ));
        assert!(matches!(
            GraphError::from(TwitterError::Unauthorized("x".into())),
            GraphError::Unauthorized(_)
        ));
        assert!(matches!(
            GraphError::from(TwitterError::NotFound("x".into())),
            GraphError::NotFound(_)
        ));
        assert!(matches!(
            GraphError::from(TwitterError::Api {
                status: 503,
                message: "over capacity".into()
            }),
            GraphError::Other(m) if m.contains("503")
        ));
        assert!(matches!(
            GraphError::from(TwitterError::Network("reset".into())),
            GraphError::Other(_)
        ));
    }
}
