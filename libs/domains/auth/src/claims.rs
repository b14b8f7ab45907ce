use core_config::{env_parse_or, env_required, ConfigError, FromEnv};
use serde::{Deserialize, Serialize};

/// Default access token lifetime: 15 minutes.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 900;

/// Default refresh token lifetime: 7 days.
pub const REFRESH_TOKEN_TTL_SECS: i64 = 604_800;

/// JWT claims carried by both access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// User email
    pub email: String,
    /// Token identity, the key for revocation records
    pub jti: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiration (unix seconds)
    pub exp: i64,
}

/// JWT signing configuration.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_ttl_secs: ACCESS_TOKEN_TTL_SECS,
            refresh_ttl_secs: REFRESH_TOKEN_TTL_SECS,
        }
    }
}

/// Load JWT configuration from environment variables.
///
/// - `JWT_SECRET` (required)
/// - `JWT_EXPIRATION` access lifetime in seconds (default 900)
/// - `JWT_REFRESH_EXPIRATION` refresh lifetime in seconds (default 604800)
impl FromEnv for JwtConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let secret = env_required("JWT_SECRET")?;
        let access_ttl_secs = env_parse_or("JWT_EXPIRATION", ACCESS_TOKEN_TTL_SECS)?;
        let refresh_ttl_secs = env_parse_or("JWT_REFRESH_EXPIRATION", REFRESH_TOKEN_TTL_SECS)?;

        Ok(Self {
            secret,
            access_ttl_secs,
            refresh_ttl_secs,
        })
    }
}
