use thiserror::Error;

/// Errors surfaced by the cache client.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Redis connection or command error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Operation exceeded its deadline.
    #[error("Cache operation timed out after {0} ms")]
    Timeout(u64),

    /// JSON serialization/deserialization error for typed values.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;
