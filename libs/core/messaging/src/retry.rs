use core_config::{env_parse_or, ConfigError, FromEnv};
use std::time::Duration;

/// Retry schedule for failed deliveries: exponential backoff with
/// independent random jitter per attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts before a message is dead-lettered.
    pub max_retries: u32,

    /// Base delay for the first retry.
    pub base_delay: Duration,

    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Whether a message with `retry_count` prior attempts gets another.
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Delay before attempt number `attempt` (0-based), with ±25% jitter
    /// drawn independently per call to avoid thundering-herd retries.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .as_millis()
            .saturating_mul(1u128 << attempt.min(20)) as u64;
        let capped = exp.min(self.max_delay.as_millis() as u64);

        let jitter: f64 = rand::random_range(-0.25..=0.25);
        let jittered = ((capped as f64) * (1.0 + jitter)).max(0.0) as u64;

        Duration::from_millis(jittered)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Load the retry schedule from environment variables.
///
/// - `MAX_RETRY_ATTEMPTS` (default 3)
/// - `RETRY_BASE_DELAY_MS` (default 1000)
/// - `RETRY_MAX_DELAY_MS` (default 60000)
impl FromEnv for RetryPolicy {
    fn from_env() -> Result<Self, ConfigError> {
        let max_retries = env_parse_or("MAX_RETRY_ATTEMPTS", 3)?;
        let base_delay_ms: u64 = env_parse_or("RETRY_BASE_DELAY_MS", 1000)?;
        let max_delay_ms: u64 = env_parse_or("RETRY_MAX_DELAY_MS", 60_000)?;

        Ok(Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry_respects_cap() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(10));
    }

    #[test]
    fn test_delay_grows_and_is_capped() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(60));

        // With ±25% jitter the bounds are [0.75x, 1.25x]
        let first = policy.delay_for_attempt(0);
        assert!(first >= Duration::from_millis(750));
        assert!(first <= Duration::from_millis(1250));

        let second = policy.delay_for_attempt(1);
        assert!(second >= Duration::from_millis(1500));
        assert!(second <= Duration::from_millis(2500));

        // Attempt far beyond the cap stays within the jittered ceiling
        let huge = policy.delay_for_attempt(15);
        assert!(huge <= Duration::from_millis(75_000));
    }

    #[test]
    fn test_jitter_varies_between_calls() {
        let policy = RetryPolicy::new(5, Duration::from_secs(10), Duration::from_secs(60));

        let samples: Vec<Duration> = (0..16).map(|_| policy.delay_for_attempt(0)).collect();
        let all_equal = samples.windows(2).all(|w| w[0] == w[1]);

        // Sixteen identical draws from a ±2.5 s window would mean the
        // jitter is not actually random.
        assert!(!all_equal);
    }

    #[test]
    fn test_retry_policy_from_env() {
        temp_env::with_vars(
            [
                ("MAX_RETRY_ATTEMPTS", Some("5")),
                ("RETRY_BASE_DELAY_MS", Some("200")),
                ("RETRY_MAX_DELAY_MS", Some("30000")),
            ],
            || {
                let policy = RetryPolicy::from_env().unwrap();
                assert_eq!(policy.max_retries, 5);
                assert_eq!(policy.base_delay, Duration::from_millis(200));
                assert_eq!(policy.max_delay, Duration::from_secs(30));
            },
        );
    }
}
