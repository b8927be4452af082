//! Retry policy for the fetch layer.
//!
//! The policy is plain data: how many attempts, how long to wait between
//! them, and which failures are worth another attempt. [`fetch_with_retry`]
//! applies it to any [`Fetch`] transport.

use crate::error::FetchError;
use crate::fetch::Fetch;
use std::time::Duration;
use tracing::{trace, warn};

/// Upper bound on any single wait between attempts.
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed { delay: Duration },
    /// `base * factor^retry`, capped at `max`.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Delay before retry number `retry` (0-based).
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential { base, factor, max } => {
                let seconds = base.as_secs_f64() * factor.powi(retry as i32);
                Duration::from_secs_f64(seconds.min(max.as_secs_f64()))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Exponential backoff doubling from `base`.
    pub fn exponential(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential {
                base,
                factor: 2.0,
                max: MAX_DELAY,
            },
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay },
        }
    }

    pub fn from_config(config: &crate::config::ScrapingConfig) -> Self {
        Self::exponential(config.retry_attempts, config.retry_delay())
    }

    /// Timeouts, dropped connections, rate limiting and server errors are
    /// transient; any other status is not.
    pub fn is_retriable(&self, err: &FetchError) -> bool {
        match err {
            FetchError::Timeout { .. } | FetchError::Connection { .. } => true,
            FetchError::HttpStatus { status, .. } => {
                matches!(status, 408 | 429) || (500..600).contains(status)
            }
        }
    }
}

/// Fetch `url`, retrying transient failures up to `policy.max_attempts`
/// attempts in total.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetch,
    policy: &RetryPolicy,
    url: &str,
) -> Result<String, FetchError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match fetcher.fetch(url).await {
            Ok(body) => {
                trace!("fetched {url} on attempt {attempt}");
                return Ok(body);
            }
            Err(err) if attempt < policy.max_attempts && policy.is_retriable(&err) => {
                let delay = policy.backoff.delay(attempt - 1);
                warn!(
                    "attempt {attempt}/{} failed, retrying in {delay:?}, error({err})",
                    policy.max_attempts
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(2),
            factor: 2.0,
            max: Duration::from_secs(10),
        };

        assert_eq!(backoff.delay(0), Duration::from_secs(2));
        assert_eq!(backoff.delay(1), Duration::from_secs(4));
        assert_eq!(backoff.delay(2), Duration::from_secs(8));
        assert_eq!(backoff.delay(3), Duration::from_secs(10));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(50));
        assert_eq!(policy.backoff.delay(0), Duration::from_millis(50));
        assert_eq!(policy.backoff.delay(7), Duration::from_millis(50));
    }

    #[test]
    fn retriable_errors() {
        let policy = RetryPolicy::exponential(3, Duration::ZERO);
        let status = |status| FetchError::HttpStatus {
            url: "u".into(),
            status,
        };

        assert!(policy.is_retriable(&FetchError::Timeout { url: "u".into() }));
        assert!(policy.is_retriable(&FetchError::Connection {
            url: "u".into(),
            reason: "reset".into()
        }));
        assert!(policy.is_retriable(&status(429)));
        assert!(policy.is_retriable(&status(500)));
        assert!(policy.is_retriable(&status(503)));
        assert!(!policy.is_retriable(&status(400)));
        assert!(!policy.is_retriable(&status(403)));
        assert!(!policy.is_retriable(&status(404)));
    }
}
