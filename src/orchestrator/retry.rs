//! Rate-limit retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::stats::Counters;
use super::throttle::DispatchThrottle;
use crate::error::StatusError;

/// Message fragments that identify a rate-limit failure when the transport
/// gives no status code.
const RATE_LIMIT_PHRASES: &[&str] = &[
    "rate limit",
    "rate-limit",
    "ratelimit",
    "too many requests",
    "status 429",
    "status code 429",
];

/// Whether `err` (or anything in its context chain) is rate limiting.
pub fn is_rate_limited(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(status) = cause.downcast_ref::<StatusError>() {
            return status.is_rate_limited();
        }
        let message = cause.to_string().to_lowercase();
        RATE_LIMIT_PHRASES
            .iter()
            .any(|phrase| contains_word(&message, phrase))
    })
}

/// Whether `phrase` occurs in `message` starting at a word boundary.
fn contains_word(message: &str, phrase: &str) -> bool {
    message.match_indices(phrase).any(|(at, _)| {
        message[..at]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric())
    })
}

/// Retry schedule for rate-limited producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one.
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Wait before retry number `retry` (0-based): `initial * 2^retry`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor)
    }

    /// Total attempts, first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Result of running a producer under the retry policy.
#[derive(Debug)]
pub(crate) enum Attempted<T> {
    Value(T),
    /// Still rate limited after the last retry.
    Exhausted,
}

/// Invoke `producer` until it succeeds, fails with a non rate-limit error,
/// or runs out of retries.
///
/// The dispatch timestamp is recorded before every attempt.
pub(crate) async fn run<T, F, Fut>(
    key: &str,
    policy: RetryPolicy,
    throttle: &DispatchThrottle,
    counters: &Counters,
    mut producer: F,
) -> anyhow::Result<Attempted<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut retry = 0;

    loop {
        throttle.record_dispatch(key);
        counters.dispatch();

        match producer().await {
            Ok(value) => return Ok(Attempted::Value(value)),
            Err(err) if is_rate_limited(&err) => {
                if retry >= policy.max_retries {
                    warn!(
                        "Rate limited on {} after {} attempts, resolving empty",
                        key,
                        policy.max_attempts()
                    );
                    return Ok(Attempted::Exhausted);
                }

                let delay = policy.backoff(retry);
                retry += 1;
                counters.retry();
                debug!(
                    "Rate limited on {} ({}), retry {}/{} in {:?}",
                    key, err, retry, policy.max_retries, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use anyhow::{Context, anyhow};
    use tokio::time::Instant;

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = policy();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.max_attempts(), 4);
        // no overflow panic on absurd retry counts
        assert!(policy.backoff(64) >= policy.backoff(31));
    }

    #[test]
    fn test_rate_limit_classification() {
        assert!(is_rate_limited(&StatusError::too_many_requests().into()));
        assert!(is_rate_limited(&anyhow!("Rate limit exceeded, slow down")));
        assert!(is_rate_limited(&anyhow!("HTTP error: Too Many Requests")));
        assert!(is_rate_limited(
            &anyhow::Error::from(StatusError::too_many_requests()).context("loading feed")
        ));

        assert!(!is_rate_limited(&StatusError::new(500, "internal").into()));
        assert!(!is_rate_limited(&anyhow!("company not found")));
        assert!(!is_rate_limited(&anyhow!("exceeded corporate limit for seats")));
        assert!(!is_rate_limited(&anyhow!("accurate limits unavailable")));
    }

    #[test]
    fn test_phrase_must_start_a_word() {
        assert!(contains_word("rate limit", "rate limit"));
        assert!(contains_word("error: rate limited", "rate limit"));
        assert!(contains_word("(ratelimit)", "ratelimit"));
        assert!(!contains_word("corporate limit", "rate limit"));
        // a later occurrence still counts
        assert!(contains_word("corporate limit, then rate limit", "rate limit"));
    }

    #[test]
    fn test_rate_limit_found_deep_in_context_chain() {
        let result: anyhow::Result<()> = Err(StatusError::too_many_requests())
            .context("fetching page 2")
            .context("loading listings");
        assert!(is_rate_limited(&result.unwrap_err()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_rate_limit_error_is_not_retried() {
        let throttle = DispatchThrottle::new(Duration::ZERO);
        let counters = Counters::default();
        let calls = Arc::new(AtomicU32::new(0));

        let result = run::<(), _, _>("k", policy(), &throttle, &counters, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(anyhow!("boom")) }
        })
        .await;

        assert_eq!(result.unwrap_err().to_string(), "boom");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(counters.snapshot(0).retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_all_attempts() {
        let throttle = DispatchThrottle::new(Duration::ZERO);
        let counters = Counters::default();
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = run::<u8, _, _>("k", policy(), &throttle, &counters, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow::Error::from(StatusError::too_many_requests())) }
        })
        .await
        .unwrap();

        assert!(matches!(result, Attempted::Exhausted));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(start.elapsed() >= Duration::from_secs(7));
        let stats = counters.snapshot(0);
        assert_eq!(stats.dispatches, 4);
        assert_eq!(stats.retries, 3);
    }
}
