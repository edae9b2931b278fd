#![forbid(unsafe_code)]

//! Relay orchestration: audit-log-then-attempt with a bounded retry loop.
//!
//! Each attempt is injected as a closure so the policy can be exercised
//! without a network; the backend binary supplies a closure that calls the
//! extraction service.

use std::time::Duration;

use thiserror::Error;

use crate::store::RelayStore;

pub const MAX_ATTEMPTS: u32 = 3;
pub const RETRY_PAUSE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("missing url parameter")]
    MissingUrl,
    #[error("downloader service error")]
    Service,
    #[error("no downloadable video found")]
    NoVideoFound,
    #[error("internal relay failure")]
    Internal,
}

/// Outcome of one attempt against the extraction service.
#[derive(Debug, Clone)]
pub enum Attempt {
    Success(String),
    Retry(RetryReason),
}

/// Why an attempt did not produce a link. The reason of the *last* attempt
/// decides the terminal error after exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// The outbound call failed or the body did not parse.
    Transport,
    /// The upstream answered but its own status field was not success.
    ServiceStatus,
    /// The upstream answered success but no variant survived the filter.
    EmptySelection,
}

impl RetryReason {
    fn terminal_error(self) -> RelayError {
        match self {
            RetryReason::Transport => RelayError::Internal,
            RetryReason::ServiceStatus => RelayError::Service,
            RetryReason::EmptySelection => RelayError::NoVideoFound,
        }
    }
}

/// How many attempts to run and how long to pause between them. Production
/// uses the defaults; tests inject a zero pause.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: MAX_ATTEMPTS,
            pause: RETRY_PAUSE,
        }
    }
}

/// Runs one relay request to completion.
///
/// Order is fixed: validate the target URL, write exactly one audit-log row,
/// then run up to `policy.attempts` attempts. The log write happens once per
/// call no matter how the attempts end.
pub async fn resolve<F, Fut>(
    store: &RelayStore,
    policy: RetryPolicy,
    key: &str,
    target_url: Option<&str>,
    client_ip: &str,
    mut attempt: F,
) -> Result<String, RelayError>
where
    F: FnMut(String, u32) -> Fut,
    Fut: Future<Output = Attempt>,
{
    let url = target_url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or(RelayError::MissingUrl)?;

    // The audit row is a hard precondition of relaying; a request that cannot
    // be logged is not forwarded.
    store
        .record_request(key, url, client_ip)
        .await
        .map_err(|err| {
            log::error!("audit log write failed: {err:#}");
            RelayError::Internal
        })?;

    let mut last_reason = RetryReason::Transport;
    for number in 1..=policy.attempts.max(1) {
        if number > 1 {
            tokio::time::sleep(policy.pause).await;
        }
        match attempt(url.to_string(), number).await {
            Attempt::Success(link) => return Ok(link),
            Attempt::Retry(reason) => {
                log::warn!("relay attempt {number}/{} failed: {reason:?}", policy.attempts);
                last_reason = reason;
            }
        }
    }

    Err(last_reason.terminal_error())
}
