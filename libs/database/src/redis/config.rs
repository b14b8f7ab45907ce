use core_config::{ConfigError, FromEnv};

/// Redis configuration.
///
/// Connection settings for the cache/coordination store. Construct
/// manually or load from environment variables.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Optional database number (0-15 for default Redis)
    pub database: Option<u8>,

    /// Optional password for authentication
    pub password: Option<String>,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            database: None,
            password: None,
        }
    }

    /// Build the effective connection URL, folding in password and
    /// database number when they were supplied separately.
    pub fn build_url(&self) -> String {
        let mut url = self.url.clone();

        if let Some(password) = &self.password {
            if !url.contains('@') {
                if let Some(rest) = url.strip_prefix("redis://") {
                    url = format!("redis://:{}@{}", password, rest);
                }
            }
        }

        if let Some(db) = self.database {
            if url.matches('/').count() <= 2 {
                url = format!("{}/{}", url.trim_end_matches('/'), db);
            }
        }

        url
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::new("redis://127.0.0.1:6379")
    }
}

/// Load RedisConfig from environment variables.
///
/// - `REDIS_URL` (preferred) or `REDIS_HOST`/`REDIS_PORT` (compatibility)
/// - `REDIS_DATABASE` (optional)
/// - `REDIS_PASSWORD` (optional)
impl FromEnv for RedisConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let url = match std::env::var("REDIS_URL") {
            Ok(url) => url,
            Err(_) => {
                let host = std::env::var("REDIS_HOST")
                    .map_err(|_| ConfigError::MissingEnvVar("REDIS_URL or REDIS_HOST".to_string()))?;
                let port = std::env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
                format!("redis://{}:{}", host, port)
            }
        };

        let database = if let Ok(raw) = std::env::var("REDIS_DATABASE") {
            Some(raw.parse().map_err(|e| ConfigError::ParseError {
                key: "REDIS_DATABASE".to_string(),
                details: format!("{}", e),
            })?)
        } else {
            None
        };

        let password = std::env::var("REDIS_PASSWORD").ok();

        Ok(Self {
            url,
            database,
            password,
        })
    }
}
