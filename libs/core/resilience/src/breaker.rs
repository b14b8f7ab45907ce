use crate::config::BreakerConfig;
use cache::{CacheClient, CacheResult};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Slack added on top of the breaker timeout before state keys expire.
/// An expired triple reads as CLOSED with zero failures.
const KEY_TTL_SLACK: Duration = Duration::from_secs(60);

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected immediately.
    Open,
    /// Probing whether the resource has recovered.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    /// Unknown values read as CLOSED so a corrupted key fails safe
    /// toward availability.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "open" => CircuitState::Open,
            "half_open" => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Snapshot of one resource's breaker, as reported by health endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub resource: String,
    pub state: CircuitState,
    pub failures: u32,
    /// When an OPEN circuit will next admit a probe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt: Option<DateTime<Utc>>,
}

/// Redis-coordinated circuit breaker.
///
/// State is keyed per resource under the configured scope:
/// `circuit:{scope}:{resource}:state | :failures | :successes | :open_time`.
/// No locks are taken; the state machine is monotone within a timeout
/// tick (OPEN wins over CLOSED), which is enough for replicas to agree.
#[derive(Clone)]
pub struct CircuitBreaker {
    cache: CacheClient,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(cache: CacheClient, config: BreakerConfig) -> Self {
        Self { cache, config }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Whether a call to `resource` may proceed.
    ///
    /// Lazily transitions OPEN → HALF_OPEN once the timeout has elapsed;
    /// the caller that observes the elapsed timeout becomes the probe.
    pub async fn allow(&self, resource: &str) -> CacheResult<bool> {
        match self.state(resource).await? {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(true),
            CircuitState::Open => {
                if self.timeout_elapsed(resource).await? {
                    info!(resource, "Circuit breaker probing recovery (half-open)");
                    self.set_state(resource, CircuitState::HalfOpen).await?;
                    self.cache.delete(&self.successes_key(resource)).await?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Record a successful call against `resource`.
    pub async fn record_success(&self, resource: &str) -> CacheResult<()> {
        match self.state(resource).await? {
            CircuitState::Closed => {
                self.cache.delete(&self.failures_key(resource)).await?;
            }
            CircuitState::HalfOpen => {
                let successes = self.cache.incr(&self.successes_key(resource)).await? as u32;

                if successes >= self.config.success_threshold {
                    self.close(resource).await?;
                    info!(resource, "Circuit breaker closed after recovery");
                } else {
                    debug!(
                        resource,
                        successes,
                        threshold = self.config.success_threshold,
                        "Circuit breaker recovery progressing"
                    );
                }
            }
            // OPEN should have short-circuited the call; nothing to record.
            CircuitState::Open => {}
        }

        Ok(())
    }

    /// Record a failed call against `resource`.
    pub async fn record_failure(&self, resource: &str) -> CacheResult<()> {
        match self.state(resource).await? {
            CircuitState::HalfOpen => {
                self.open(resource).await?;
                warn!(resource, "Circuit breaker reopened after failed probe");
            }
            // While OPEN, failures do not increment the counter.
            CircuitState::Open => {}
            CircuitState::Closed => {
                let key = self.failures_key(resource);
                let failures = self.cache.incr(&key).await? as u32;
                self.cache.expire(&key, self.key_ttl()).await?;

                debug!(
                    resource,
                    failures,
                    threshold = self.config.failure_threshold,
                    "Circuit breaker failure recorded"
                );

                if failures >= self.config.failure_threshold {
                    self.open(resource).await?;
                    warn!(resource, failures, "Circuit breaker opened");
                }
            }
        }

        Ok(())
    }

    /// Current breaker snapshot for `resource`.
    pub async fn status(&self, resource: &str) -> CacheResult<BreakerStatus> {
        let state = self.state(resource).await?;

        let failures = self
            .cache
            .get_string(&self.failures_key(resource))
            .await?
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let next_attempt = if state == CircuitState::Open {
            self.open_time(resource).await?.map(|opened| {
                opened + chrono::Duration::seconds(self.config.timeout.as_secs() as i64)
            })
        } else {
            None
        };

        Ok(BreakerStatus {
            resource: resource.to_string(),
            state,
            failures,
            next_attempt,
        })
    }

    /// Force the breaker closed and clear its counters.
    pub async fn reset(&self, resource: &str) -> CacheResult<()> {
        self.close(resource).await
    }

    async fn state(&self, resource: &str) -> CacheResult<CircuitState> {
        let value = self.cache.get_string(&self.state_key(resource)).await?;
        Ok(value
            .map(|s| CircuitState::from_str_lossy(&s))
            .unwrap_or(CircuitState::Closed))
    }

    async fn set_state(&self, resource: &str, state: CircuitState) -> CacheResult<()> {
        self.cache
            .set_string(
                &self.state_key(resource),
                state.as_str(),
                Some(self.key_ttl()),
            )
            .await
    }

    async fn open(&self, resource: &str) -> CacheResult<()> {
        self.set_state(resource, CircuitState::Open).await?;
        self.cache
            .set_string(
                &self.open_time_key(resource),
                &Utc::now().timestamp().to_string(),
                Some(self.key_ttl()),
            )
            .await?;
        self.cache.delete(&self.successes_key(resource)).await?;
        Ok(())
    }

    async fn close(&self, resource: &str) -> CacheResult<()> {
        self.set_state(resource, CircuitState::Closed).await?;
        self.cache.delete(&self.failures_key(resource)).await?;
        self.cache.delete(&self.successes_key(resource)).await?;
        self.cache.delete(&self.open_time_key(resource)).await?;
        Ok(())
    }

    async fn open_time(&self, resource: &str) -> CacheResult<Option<DateTime<Utc>>> {
        let raw = self.cache.get_string(&self.open_time_key(resource)).await?;
        Ok(raw
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()))
    }

    async fn timeout_elapsed(&self, resource: &str) -> CacheResult<bool> {
        match self.open_time(resource).await? {
            Some(opened) => {
                let elapsed = Utc::now().signed_duration_since(opened);
                Ok(elapsed.num_seconds() >= self.config.timeout.as_secs() as i64)
            }
            // Missing open_time (expired key): treat the timeout as over.
            None => Ok(true),
        }
    }

    fn key_ttl(&self) -> Duration {
        self.config.timeout + KEY_TTL_SLACK
    }

    fn state_key(&self, resource: &str) -> String {
        format!("circuit:{}:{}:state", self.config.scope, resource)
    }

    fn failures_key(&self, resource: &str) -> String {
        format!("circuit:{}:{}:failures", self.config.scope, resource)
    }

    fn successes_key(&self, resource: &str) -> String {
        format!("circuit:{}:{}:successes", self.config.scope, resource)
    }

    fn open_time_key(&self, resource: &str) -> String {
        format!("circuit:{}:{}:open_time", self.config.scope, resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::aio::ConnectionManager;

    #[test]
    fn test_state_round_trip() {
        assert_eq!(CircuitState::from_str_lossy("open"), CircuitState::Open);
        assert_eq!(
            CircuitState::from_str_lossy("half_open"),
            CircuitState::HalfOpen
        );
        assert_eq!(CircuitState::from_str_lossy("closed"), CircuitState::Closed);
        // Unknown values fail safe to closed
        assert_eq!(CircuitState::from_str_lossy("garbage"), CircuitState::Closed);

        for state in [
            CircuitState::Closed,
            CircuitState::Open,
            CircuitState::HalfOpen,
        ] {
            assert_eq!(CircuitState::from_str_lossy(state.as_str()), state);
        }
    }

    async fn test_breaker(config: BreakerConfig) -> CircuitBreaker {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let client = redis::Client::open(url).unwrap();
        let manager = ConnectionManager::new(client).await.unwrap();
        CircuitBreaker::new(CacheClient::new(manager), config)
    }

    fn unique_scope() -> String {
        format!("test-{}", uuid::Uuid::new_v4())
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_opens_after_threshold_failures() {
        let breaker =
            test_breaker(BreakerConfig::new(unique_scope()).with_failure_threshold(3)).await;

        assert!(breaker.allow("db").await.unwrap());

        breaker.record_failure("db").await.unwrap();
        breaker.record_failure("db").await.unwrap();
        assert!(breaker.allow("db").await.unwrap());

        breaker.record_failure("db").await.unwrap();
        assert!(!breaker.allow("db").await.unwrap());

        let status = breaker.status("db").await.unwrap();
        assert_eq!(status.state, CircuitState::Open);
        assert!(status.next_attempt.is_some());
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_success_clears_failure_streak() {
        let breaker =
            test_breaker(BreakerConfig::new(unique_scope()).with_failure_threshold(3)).await;

        breaker.record_failure("db").await.unwrap();
        breaker.record_failure("db").await.unwrap();
        breaker.record_success("db").await.unwrap();
        breaker.record_failure("db").await.unwrap();
        breaker.record_failure("db").await.unwrap();

        // Streak was broken: still closed
        assert!(breaker.allow("db").await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_half_open_recovery_closes() {
        let breaker = test_breaker(
            BreakerConfig::new(unique_scope())
                .with_failure_threshold(1)
                .with_success_threshold(2)
                .with_timeout(Duration::from_secs(0)),
        )
        .await;

        breaker.record_failure("smtp").await.unwrap();

        // Timeout of zero: first allow() probes half-open
        assert!(breaker.allow("smtp").await.unwrap());
        let status = breaker.status("smtp").await.unwrap();
        assert_eq!(status.state, CircuitState::HalfOpen);

        breaker.record_success("smtp").await.unwrap();
        assert_eq!(
            breaker.status("smtp").await.unwrap().state,
            CircuitState::HalfOpen
        );

        breaker.record_success("smtp").await.unwrap();
        assert_eq!(
            breaker.status("smtp").await.unwrap().state,
            CircuitState::Closed
        );
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_half_open_failure_reopens() {
        let breaker = test_breaker(
            BreakerConfig::new(unique_scope())
                .with_failure_threshold(1)
                .with_timeout(Duration::from_secs(0)),
        )
        .await;

        breaker.record_failure("fcm").await.unwrap();
        assert!(breaker.allow("fcm").await.unwrap()); // half-open probe

        breaker.record_failure("fcm").await.unwrap();
        assert_eq!(
            breaker.status("fcm").await.unwrap().state,
            CircuitState::Open
        );
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_replicas_share_state() {
        let scope = unique_scope();
        let a = test_breaker(BreakerConfig::new(scope.clone()).with_failure_threshold(2)).await;
        let b = test_breaker(BreakerConfig::new(scope).with_failure_threshold(2)).await;

        a.record_failure("db").await.unwrap();
        b.record_failure("db").await.unwrap();

        // Both replicas observe the open circuit
        assert!(!a.allow("db").await.unwrap());
        assert!(!b.allow("db").await.unwrap());
    }
}
