use chrono::{DateTime, Duration, TimeZone, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TwitterError>;

/// Length of one Twitter rate-limit window. Used when a throttled response
/// carries no usable reset header.
const RATE_LIMIT_WINDOW_MINUTES: i64 = 15;

#[derive(Debug, Error)]
pub enum TwitterError {
    #[error("Rate limited until {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl TwitterError {
    /// Classify a non-success HTTP response.
    ///
    /// `reset_header` is the raw `x-rate-limit-reset` value (epoch seconds).
    pub fn from_status(status: u16, reset_header: Option<&str>, message: String) -> Self {
        match status {
            420 | 429 => TwitterError::RateLimited {
                reset_at: parse_reset(reset_header)
                    .unwrap_or_else(|| Utc::now() + Duration::minutes(RATE_LIMIT_WINDOW_MINUTES)),
            },
            401 => TwitterError::Unauthorized(message),
            404 => TwitterError::NotFound(message),
            _ => TwitterError::Api { status, message },
        }
    }
}

fn parse_reset(header: Option<&str>) -> Option<DateTime<Utc>> {
    let secs: i64 = header?.trim().parse().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

impl From<reqwest::Error> for TwitterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TwitterError::Parse(err.to_string())
        } else {
            TwitterError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TwitterError {
    fn from(err: serde_json::Error) -> Self {
        TwitterError::Parse(err.to_string())
    }
}
