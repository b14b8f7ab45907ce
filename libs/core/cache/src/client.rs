use crate::error::{CacheError, CacheResult};
use metrics::counter;
use redis::aio::ConnectionManager;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Default per-operation deadline. Cache access sits on the request hot
/// path; a slow cache must degrade to a miss, not a hang.
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(200);

/// Page size for cursor-based SCAN iteration.
const SCAN_COUNT: usize = 100;

/// Typed cache client.
///
/// Cloning is cheap: the underlying `ConnectionManager` multiplexes a
/// single connection and reconnects on failure.
///
/// # Example
///
/// ```ignore
/// use cache::CacheClient;
///
/// let cache = CacheClient::new(manager);
/// cache.set_string("greeting", "hello", Some(Duration::from_secs(60))).await?;
/// let value = cache.get_string("greeting").await?;
/// ```
#[derive(Clone)]
pub struct CacheClient {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl CacheClient {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// Override the per-operation deadline.
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Get the raw value stored under `key`.
    pub async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let key = key.to_string();

        self.bounded(async move {
            redis::cmd("GET")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .map_err(CacheError::Redis)
        })
        .await
    }

    /// Get a UTF-8 value stored under `key`.
    pub async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        let bytes = self.get(key).await?;
        Ok(bytes.map(|b| String::from_utf8_lossy(&b).into_owned()))
    }

    /// Get and deserialize a JSON value stored under `key`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Set `key` to `value`, attaching the TTL atomically when given.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        let value = value.to_vec();

        self.bounded(async move {
            let mut cmd = redis::cmd("SET");
            cmd.arg(&key).arg(&value);
            if let Some(ttl) = ttl {
                cmd.arg("EX").arg(ttl.as_secs().max(1));
            }
            cmd.query_async::<()>(&mut conn)
                .await
                .map_err(CacheError::Redis)
        })
        .await
    }

    /// Set a UTF-8 value.
    pub async fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        self.set(key, value.as_bytes(), ttl).await
    }

    /// Serialize `value` as JSON and store it.
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, &bytes, ttl).await
    }

    /// Set `key` to `value` only if absent (`SET NX EX`).
    ///
    /// Returns `true` when this caller won the write. This is the
    /// first-writer-wins primitive behind idempotency reservations.
    pub async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        let value = value.to_string();

        self.bounded(async move {
            let reply: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(&value)
                .arg("NX")
                .arg("EX")
                .arg(ttl.as_secs().max(1))
                .query_async(&mut conn)
                .await
                .map_err(CacheError::Redis)?;

            Ok(reply.is_some())
        })
        .await
    }

    /// Delete `key`. Deleting an absent key is not an error.
    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let key = key.to_string();

        self.bounded(async move {
            redis::cmd("DEL")
                .arg(&key)
                .query_async::<()>(&mut conn)
                .await
                .map_err(CacheError::Redis)
        })
        .await
    }

    /// Whether `key` exists.
    pub async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let key = key.to_string();

        self.bounded(async move {
            redis::cmd("EXISTS")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .map_err(CacheError::Redis)
        })
        .await
    }

    /// Atomically increment the integer stored at `key`, returning the
    /// new value. Absent keys start from zero.
    pub async fn incr(&self, key: &str) -> CacheResult<i64> {
        let mut conn = self.conn.clone();
        let key = key.to_string();

        self.bounded(async move {
            redis::cmd("INCR")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .map_err(CacheError::Redis)
        })
        .await
    }

    /// Attach a TTL to an existing key.
    pub async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let key = key.to_string();

        self.bounded(async move {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(ttl.as_secs().max(1))
                .query_async::<()>(&mut conn)
                .await
                .map_err(CacheError::Redis)
        })
        .await
    }

    /// Liveness check.
    pub async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();

        let result: CacheResult<String> = self
            .bounded(async move {
                redis::cmd("PING")
                    .query_async(&mut conn)
                    .await
                    .map_err(CacheError::Redis)
            })
            .await;

        result.is_ok()
    }

    /// Collect keys matching `pattern` with cursor-based SCAN.
    ///
    /// Intended only for narrow `prefix:*` patterns (cache invalidation,
    /// revoking a user's refresh tokens). SCAN keeps the server
    /// responsive where KEYS would block it.
    pub async fn scan_match(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, page): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(|e| {
                    counter!("cache_errors").increment(1);
                    CacheError::Redis(e)
                })?;

            keys.extend(page);
            cursor = next;

            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }

    /// Delete all keys matching `pattern`; returns how many were removed.
    pub async fn delete_matching(&self, pattern: &str) -> CacheResult<usize> {
        let keys = self.scan_match(pattern).await?;

        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        let count = keys.len();

        redis::cmd("DEL")
            .arg(&keys)
            .query_async::<()>(&mut conn)
            .await
            .map_err(CacheError::Redis)?;

        debug!(pattern, count, "Deleted matching cache keys");
        Ok(count)
    }

    /// Run `fut` under the per-operation deadline, counting failures.
    async fn bounded<T>(&self, fut: impl Future<Output = CacheResult<T>>) -> CacheResult<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                counter!("cache_errors").increment(1);
                Err(e)
            }
            Err(_) => {
                counter!("cache_errors").increment(1);
                Err(CacheError::Timeout(self.op_timeout.as_millis() as u64))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_client() -> CacheClient {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let client = redis::Client::open(url).unwrap();
        let manager = ConnectionManager::new(client).await.unwrap();
        CacheClient::new(manager)
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_set_get_delete() {
        let cache = test_client().await;
        let key = format!("test:cache:{}", uuid::Uuid::new_v4());

        cache.set_string(&key, "value", None).await.unwrap();
        assert_eq!(cache.get_string(&key).await.unwrap().as_deref(), Some("value"));

        cache.delete(&key).await.unwrap();
        assert_eq!(cache.get_string(&key).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_set_nx_first_writer_wins() {
        let cache = test_client().await;
        let key = format!("test:nx:{}", uuid::Uuid::new_v4());

        let first = cache
            .set_nx(&key, "processing", Duration::from_secs(60))
            .await
            .unwrap();
        let second = cache
            .set_nx(&key, "processing", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(
            cache.get_string(&key).await.unwrap().as_deref(),
            Some("processing")
        );

        cache.delete(&key).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_scan_and_delete_matching() {
        let cache = test_client().await;
        let prefix = format!("test:scan:{}", uuid::Uuid::new_v4());

        for i in 0..5 {
            cache
                .set_string(&format!("{}:{}", prefix, i), "x", None)
                .await
                .unwrap();
        }

        let keys = cache.scan_match(&format!("{}:*", prefix)).await.unwrap();
        assert_eq!(keys.len(), 5);

        let deleted = cache
            .delete_matching(&format!("{}:*", prefix))
            .await
            .unwrap();
        assert_eq!(deleted, 5);
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_incr() {
        let cache = test_client().await;
        let key = format!("test:incr:{}", uuid::Uuid::new_v4());

        assert_eq!(cache.incr(&key).await.unwrap(), 1);
        assert_eq!(cache.incr(&key).await.unwrap(), 2);

        cache.delete(&key).await.unwrap();
    }
}
