//! Outcome classification and the retry loop around social-graph calls.
//!
//! `RetryPolicy::classify` is a pure decision over one failed call;
//! `RetryPolicy::run` is the loop that acts on those decisions. Every delay
//! is a sleep on the calling task only.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::GraphError;

/// Default pause after an unclassified failure.
pub const DEFAULT_TRANSIENT_DELAY: Duration = Duration::from_secs(10);

/// Default number of unclassified failures tolerated per call.
pub const DEFAULT_MAX_TRANSIENT_ATTEMPTS: u32 = 5;

/// Wait applied when the service keeps throttling with a reset time that has
/// already passed (clock skew, stale header). The first stale reset retries
/// at once; consecutive ones wait this long.
pub const STALE_RESET_WAIT: Duration = Duration::from_secs(1);

/// What to do about one failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Throttled: wait until the service's reset time, then repeat the call.
    WaitForReset(Duration),
    /// Unclassified failure: wait a fixed delay, then repeat the call.
    Backoff(Duration),
    /// The resource does not exist. Treat as an empty result.
    Skip,
    /// The credential was refused. Do not repeat the call.
    Abort,
}

/// Final result of a call once the policy has stopped retrying it.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Skipped,
    Aborted,
    Exhausted { attempts: u32, last_error: String },
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    transient_delay: Duration,
    max_transient_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSIENT_DELAY, DEFAULT_MAX_TRANSIENT_ATTEMPTS)
    }
}

impl RetryPolicy {
    pub fn new(transient_delay: Duration, max_transient_attempts: u32) -> Self {
        Self {
            transient_delay,
            max_transient_attempts: max_transient_attempts.max(1),
        }
    }

    pub fn transient_delay(&self) -> Duration {
        self.transient_delay
    }

    pub fn max_transient_attempts(&self) -> u32 {
        self.max_transient_attempts
    }

    pub fn classify(&self, err: &GraphError, now: DateTime<Utc>) -> Decision {
        match err {
            GraphError::RateLimited { resume_at } => {
                Decision::WaitForReset(rate_limit_delay(*resume_at, now))
            }
            GraphError::Unauthorized(_) => Decision::Abort,
            GraphError::NotFound(_) => Decision::Skip,
            GraphError::Other(_) => Decision::Backoff(self.transient_delay),
        }
    }

    /// Drive `call` until it succeeds or the policy gives up.
    ///
    /// Rate-limit waits are not counted against `max_transient_attempts`.
    /// Repeated throttles with an already-elapsed reset wait
    /// [`STALE_RESET_WAIT`] each.
    pub async fn run<T, F, Fut>(
        &self,
        op: &str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GraphError>>,
    {
        let mut transient_failures = 0u32;
        let mut stale_resets = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Outcome::Cancelled;
            }

            let err = match call().await {
                Ok(value) => return Outcome::Success(value),
                Err(err) => err,
            };

            let delay = match self.classify(&err, Utc::now()) {
                Decision::Skip => {
                    debug!(op, error = %err, "Resource not found, not retrying");
                    return Outcome::Skipped;
                }
                Decision::Abort => {
                    warn!(op, error = %err, "Authentication failed, not retrying");
                    return Outcome::Aborted;
                }
                Decision::WaitForReset(delay) => {
                    let delay = if delay.is_zero() {
                        stale_resets += 1;
                        if stale_resets > 1 {
                            STALE_RESET_WAIT
                        } else {
                            Duration::ZERO
                        }
                    } else {
                        stale_resets = 0;
                        delay
                    };
                    warn!(
                        op,
                        delay_secs = delay.as_secs(),
                        stale_resets,
                        "Rate limit exceeded, sleeping until reset"
                    );
                    delay
                }
                Decision::Backoff(delay) => {
                    stale_resets = 0;
                    transient_failures += 1;
                    if transient_failures >= self.max_transient_attempts {
                        error!(
                            op,
                            attempts = transient_failures,
                            error = %err,
                            "Unexpected error, giving up"
                        );
                        return Outcome::Exhausted {
                            attempts: transient_failures,
                            last_error: err.to_string(),
                        };
                    }
                    error!(
                        op,
                        attempt = transient_failures,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "Unexpected error, retrying after delay"
                    );
                    delay
                }
            };

            if !pause(delay, cancel).await {
                return Outcome::Cancelled;
            }
        }
    }
}

/// Time left until `resume_at`, or zero if it has already passed.
pub fn rate_limit_delay(resume_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (resume_at - now).to_std().unwrap_or(Duration::ZERO)
}

/// Sleep for `delay` unless cancelled first. Returns false on cancellation.
///
/// A zero delay still yields once so other tasks on the runtime get a turn.
pub(crate) async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        tokio::task::yield_now().await;
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
