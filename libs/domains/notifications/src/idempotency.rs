use cache::{CacheClient, CacheResult};
use core_config::{env_parse_or, ConfigError, FromEnv};
use std::time::Duration;
use tracing::warn;

/// State of an idempotency marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyStatus {
    NotFound,
    Processing,
    Sent,
    Failed,
}

impl IdempotencyStatus {
    fn from_value(value: &str) -> Self {
        match value {
            "processing" => IdempotencyStatus::Processing,
            "sent" => IdempotencyStatus::Sent,
            "failed" => IdempotencyStatus::Failed,
            other => {
                warn!(value = other, "Unknown idempotency marker value");
                IdempotencyStatus::NotFound
            }
        }
    }
}

/// First-writer-wins idempotency markers under `idempotency:{key}`.
///
/// The marker is the only serialization point for a logical request:
/// `set NX` decides the single winner, and `sent`/`failed` are terminal
/// states after which no further state-changing work happens.
#[derive(Clone)]
pub struct IdempotencyStore {
    cache: CacheClient,
    ttl: Duration,
}

/// Marker lifetime (24 h by default).
#[derive(Debug, Clone, Copy)]
pub struct IdempotencyTtl(pub Duration);

impl Default for IdempotencyTtl {
    fn default() -> Self {
        Self(Duration::from_secs(86_400))
    }
}

impl FromEnv for IdempotencyTtl {
    fn from_env() -> Result<Self, ConfigError> {
        let secs: u64 = env_parse_or("IDEMPOTENCY_TTL_SECONDS", 86_400)?;
        Ok(Self(Duration::from_secs(secs)))
    }
}

impl IdempotencyStore {
    pub fn new(cache: CacheClient, ttl: IdempotencyTtl) -> Self {
        Self { cache, ttl: ttl.0 }
    }

    /// Atomically reserve `key` as `processing`.
    ///
    /// Returns `true` when this caller won the reservation.
    pub async fn try_reserve(&self, key: &str) -> CacheResult<bool> {
        self.cache
            .set_nx(&Self::marker_key(key), "processing", self.ttl)
            .await
    }

    /// Read the marker state.
    pub async fn check(&self, key: &str) -> CacheResult<IdempotencyStatus> {
        let value = self.cache.get_string(&Self::marker_key(key)).await?;
        Ok(value
            .map(|v| IdempotencyStatus::from_value(&v))
            .unwrap_or(IdempotencyStatus::NotFound))
    }

    /// Refresh the `processing` marker unconditionally. Used by a
    /// worker re-handling its own retried message, where the original
    /// reservation may have expired.
    pub async fn mark_processing(&self, key: &str) -> CacheResult<()> {
        self.cache
            .set_string(&Self::marker_key(key), "processing", Some(self.ttl))
            .await
    }

    /// Mark the request as successfully delivered (terminal).
    pub async fn mark_sent(&self, key: &str) -> CacheResult<()> {
        self.cache
            .set_string(&Self::marker_key(key), "sent", Some(self.ttl))
            .await
    }

    /// Mark the request as terminally failed.
    pub async fn mark_failed(&self, key: &str) -> CacheResult<()> {
        self.cache
            .set_string(&Self::marker_key(key), "failed", Some(self.ttl))
            .await
    }

    fn marker_key(key: &str) -> String {
        format!("idempotency:{}", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_value() {
        assert_eq!(
            IdempotencyStatus::from_value("processing"),
            IdempotencyStatus::Processing
        );
        assert_eq!(IdempotencyStatus::from_value("sent"), IdempotencyStatus::Sent);
        assert_eq!(
            IdempotencyStatus::from_value("failed"),
            IdempotencyStatus::Failed
        );
        assert_eq!(
            IdempotencyStatus::from_value("garbage"),
            IdempotencyStatus::NotFound
        );
    }

    async fn test_store() -> IdempotencyStore {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let client = redis::Client::open(url).unwrap();
        let manager = redis::aio::ConnectionManager::new(client).await.unwrap();
        IdempotencyStore::new(CacheClient::new(manager), IdempotencyTtl::default())
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_reservation_first_writer_wins() {
        let store = test_store().await;
        let key = format!("test-{}", uuid::Uuid::new_v4());

        assert_eq!(store.check(&key).await.unwrap(), IdempotencyStatus::NotFound);

        assert!(store.try_reserve(&key).await.unwrap());
        assert!(!store.try_reserve(&key).await.unwrap());

        assert_eq!(
            store.check(&key).await.unwrap(),
            IdempotencyStatus::Processing
        );
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_state_transitions_to_terminal() {
        let store = test_store().await;
        let key = format!("test-{}", uuid::Uuid::new_v4());

        store.try_reserve(&key).await.unwrap();

        store.mark_sent(&key).await.unwrap();
        assert_eq!(store.check(&key).await.unwrap(), IdempotencyStatus::Sent);

        // A later reservation attempt still loses
        assert!(!store.try_reserve(&key).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_concurrent_reservations_single_winner() {
        let store = test_store().await;
        let key = format!("test-{}", uuid::Uuid::new_v4());

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            let key = key.clone();
            handles.push(tokio::spawn(
                async move { store.try_reserve(&key).await.unwrap() },
            ));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
    }

    #[test]
    fn test_ttl_from_env() {
        temp_env::with_var("IDEMPOTENCY_TTL_SECONDS", Some("2"), || {
            let ttl = IdempotencyTtl::from_env().unwrap();
            assert_eq!(ttl.0, Duration::from_secs(2));
        });
    }
}
