//! Per-client request throttling backed by the shared cache.
//!
//! A fixed window per client: `INCR rate_limit:{client}` with the window
//! TTL attached on the first hit. Admission control runs before any
//! request side effects (in particular before idempotency reservation).

use crate::errors::{AppError, AppResult};
use cache::CacheClient;
use core_config::{env_parse_or, ConfigError, FromEnv};
use std::time::Duration;
use tracing::debug;

/// Rate limit tuning.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,

    /// Window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Load rate limit tuning from environment variables.
///
/// - `RATE_LIMIT_MAX` (default 100)
/// - `RATE_LIMIT_TTL` window seconds (default 60)
impl FromEnv for RateLimitConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let max_requests = env_parse_or("RATE_LIMIT_MAX", 100)?;
        let window_secs: u64 = env_parse_or("RATE_LIMIT_TTL", 60)?;

        Ok(Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        })
    }
}

/// Cache-backed fixed-window rate limiter, shared across replicas.
#[derive(Clone)]
pub struct RateLimiter {
    cache: CacheClient,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(cache: CacheClient, config: RateLimitConfig) -> Self {
        Self { cache, config }
    }

    /// Admit or reject a request from `client_id`.
    ///
    /// A cache failure admits the request: throttling is protective, not
    /// load-bearing, and must not turn a cache outage into an API outage.
    pub async fn check(&self, client_id: &str) -> AppResult<()> {
        let key = format!("rate_limit:{}", client_id);

        let count = match self.cache.incr(&key).await {
            Ok(count) => count,
            Err(e) => {
                debug!(client_id, error = %e, "Rate limit check skipped (cache error)");
                return Ok(());
            }
        };

        if count == 1 {
            let _ = self.cache.expire(&key, self.config.window).await;
        }

        if count > self.config.max_requests as i64 {
            return Err(AppError::RateLimited(format!(
                "limit of {} requests per {} s exceeded",
                self.config.max_requests,
                self.config.window.as_secs()
            )));
        }

        Ok(())
    }
}
