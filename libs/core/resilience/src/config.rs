use core_config::{env_or_default, env_parse_or, ConfigError, FromEnv};
use std::time::Duration;

/// Circuit breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Key namespace so multiple deployments can share one Redis.
    pub scope: String,

    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,

    /// Consecutive successes in half-open before closing.
    pub success_threshold: u32,

    /// How long to stay open before probing with half-open.
    pub timeout: Duration,
}

impl BreakerConfig {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::new("courier")
    }
}

/// Load breaker tuning from environment variables.
///
/// - `CIRCUIT_BREAKER_SCOPE` (default "courier")
/// - `CIRCUIT_BREAKER_THRESHOLD` (default 5)
/// - `CIRCUIT_BREAKER_SUCCESS_THRESHOLD` (default 2)
/// - `CIRCUIT_BREAKER_TIMEOUT` seconds (default 30)
impl FromEnv for BreakerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let scope = env_or_default("CIRCUIT_BREAKER_SCOPE", "courier");
        let failure_threshold = env_parse_or("CIRCUIT_BREAKER_THRESHOLD", 5)?;
        let success_threshold = env_parse_or("CIRCUIT_BREAKER_SUCCESS_THRESHOLD", 2)?;
        let timeout_secs: u64 = env_parse_or("CIRCUIT_BREAKER_TIMEOUT", 30)?;

        Ok(Self {
            scope,
            failure_threshold,
            success_threshold,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_config_defaults() {
        let config = BreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.success_threshold, 2);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_breaker_config_from_env() {
        temp_env::with_vars(
            [
                ("CIRCUIT_BREAKER_THRESHOLD", Some("3")),
                ("CIRCUIT_BREAKER_TIMEOUT", Some("60")),
            ],
            || {
                let config = BreakerConfig::from_env().unwrap();
                assert_eq!(config.failure_threshold, 3);
                assert_eq!(config.timeout, Duration::from_secs(60));
                assert_eq!(config.success_threshold, 2);
            },
        );
    }

    #[test]
    fn test_breaker_config_builder() {
        let config = BreakerConfig::new("test")
            .with_failure_threshold(2)
            .with_success_threshold(1)
            .with_timeout(Duration::from_secs(5));

        assert_eq!(config.scope, "test");
        assert_eq!(config.failure_threshold, 2);
        assert_eq!(config.success_threshold, 1);
    }
}
