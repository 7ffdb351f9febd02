//! Exponential backoff for redialing
//!
//! Delays grow by a constant multiplier up to a ceiling and are spread by a
//! random factor. A backoff gives up once the time spent since its start
//! (or last reset) would exceed the configured maximum elapsed time.

use rand::Rng;
use rct_core::{RctError, RctResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Backoff policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Growth factor applied after every retry
    pub multiplier: f64,
    /// Relative spread of each delay, 0 disables jitter
    pub randomization_factor: f64,
    /// Ceiling of the un-randomized delay
    pub max_interval: Duration,
    /// Give up after this much time; zero retries forever
    pub max_elapsed_time: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: Duration::from_secs(60),
        }
    }
}

/// Running backoff state for one series of attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current_interval: Duration,
    start: Instant,
}

impl Backoff {
    /// Start a new series of attempts
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            current_interval: policy.initial_interval,
            policy,
            start: Instant::now(),
        }
    }

    /// Restart the series from the initial interval
    pub fn reset(&mut self) {
        self.current_interval = self.policy.initial_interval;
        self.start = Instant::now();
    }

    /// Time spent since the series started
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the delay before the next attempt
    ///
    /// # Returns
    /// None once waiting the delay would exceed the maximum elapsed time.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let delay = self.randomize(self.current_interval);
        self.current_interval = self
            .current_interval
            .mul_f64(self.policy.multiplier)
            .min(self.policy.max_interval);

        let max_elapsed = self.policy.max_elapsed_time;
        if !max_elapsed.is_zero() && self.elapsed() + delay > max_elapsed {
            return None;
        }
        Some(delay)
    }

    fn randomize(&self, interval: Duration) -> Duration {
        let factor = self.policy.randomization_factor;
        if factor <= 0.0 || interval.is_zero() {
            return interval;
        }
        let delta = interval.as_secs_f64() * factor;
        let low = (interval.as_secs_f64() - delta).max(0.0);
        let high = interval.as_secs_f64() + delta;
        Duration::from_secs_f64(rand::thread_rng().gen_range(low..=high))
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        self.next_delay()
    }
}

/// Run `operation` until it succeeds, sleeping between failed attempts
///
/// # Errors
/// Returns `RctError::Cancelled` as soon as `token` is cancelled, and
/// `RctError::RetriesExhausted` carrying the last failure once the policy
/// gives up.
pub async fn retry<T, F, Fut>(
    policy: &BackoffPolicy,
    token: &CancellationToken,
    mut operation: F,
) -> RctResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RctResult<T>>,
{
    let mut backoff = Backoff::new(policy.clone());
    loop {
        let error = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(RctError::Cancelled),
            result = operation() => match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            },
        };

        let Some(delay) = backoff.next_delay() else {
            return Err(RctError::RetriesExhausted {
                elapsed: backoff.elapsed(),
                source: Box::new(error),
            });
        };
        log::debug!("attempt failed: {}, retrying in {:?}", error, delay);

        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(RctError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fixed_policy(initial_ms: u64, max_elapsed_ms: u64) -> BackoffPolicy {
        BackoffPolicy {
            initial_interval: Duration::from_millis(initial_ms),
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_interval: Duration::from_millis(initial_ms * 4),
            max_elapsed_time: Duration::from_millis(max_elapsed_ms),
        }
    }

    #[test]
    fn test_exponential_growth_is_capped() {
        let backoff = Backoff::new(fixed_policy(100, 0));
        let delays: Vec<u64> = backoff.take(5).map(|d| d.as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 400, 400]);
    }

    #[test]
    fn test_default_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.initial_interval, Duration::from_millis(500));
        assert_eq!(policy.max_elapsed_time, Duration::from_secs(60));

        let policy: BackoffPolicy = serde_json::from_str(r#"{"multiplier": 3.0}"#).unwrap();
        assert_eq!(policy.multiplier, 3.0);
        assert_eq!(policy.max_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let mut backoff = Backoff::new(BackoffPolicy {
            max_elapsed_time: Duration::ZERO,
            ..BackoffPolicy::default()
        });
        for _ in 0..100 {
            backoff.reset();
            let delay = backoff.next_delay().unwrap();
            assert!(delay >= Duration::from_millis(250));
            assert!(delay <= Duration::from_millis(750));
        }
    }

    #[test]
    fn test_gives_up_after_max_elapsed() {
        let mut backoff = Backoff::new(fixed_policy(10, 5));
        assert_eq!(backoff.next_delay(), None);

        let mut backoff = Backoff::new(fixed_policy(10, 35));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(20)));
        assert_eq!(backoff.next_delay(), None);
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let attempts = AtomicUsize::new(0);
        let token = CancellationToken::new();
        let result = retry(&fixed_policy(1, 0), &token, || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(RctError::Disconnected)
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted_keeps_last_error() {
        let token = CancellationToken::new();
        let result: RctResult<()> =
            retry(&fixed_policy(5, 20), &token, || async { Err(RctError::Timeout) }).await;
        match result {
            Err(RctError::RetriesExhausted { source, .. }) => {
                assert!(matches!(*source, RctError::Timeout))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let result: RctResult<()> =
            retry(&fixed_policy(5, 0), &token, || async { Err(RctError::Timeout) }).await;
        assert!(matches!(result, Err(RctError::Cancelled)));
    }
}
