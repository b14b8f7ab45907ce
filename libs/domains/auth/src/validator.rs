use crate::claims::{Claims, JwtConfig};
use crate::error::{AuthError, AuthResult};
use cache::CacheClient;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use std::time::Duration;
use uuid::Uuid;

/// Signs and validates tokens and owns the revocation keys.
///
/// This is the verifier half of the auth core: everything the gateway
/// needs to accept or reject a bearer token without touching the user
/// store.
#[derive(Clone)]
pub struct TokenValidator {
    cache: CacheClient,
    config: JwtConfig,
}

impl TokenValidator {
    pub fn new(cache: CacheClient, config: JwtConfig) -> Self {
        Self { cache, config }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Sign a token for `user_id`/`email` with a fresh jti.
    pub fn create_token(&self, user_id: &str, email: &str, ttl_secs: i64) -> AuthResult<String> {
        let now = Utc::now();

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: now.timestamp() + ttl_secs,
        };

        let header = Header {
            alg: jsonwebtoken::Algorithm::HS256,
            ..Default::default()
        };

        encode(
            &header,
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenEncoding(e.to_string()))
    }

    /// Verify signature and expiry, returning the claims.
    pub fn decode_token(&self, token: &str) -> AuthResult<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("Token verification failed: {}", e);
            AuthError::Unauthorized
        })
    }

    /// Full validation: signature, expiry, and the revocation list.
    pub async fn validate(&self, token: &str) -> AuthResult<Claims> {
        let claims = self.decode_token(token)?;

        if self.is_blacklisted(&claims.jti).await? {
            tracing::debug!(jti = %claims.jti, "Token is revoked");
            return Err(AuthError::Unauthorized);
        }

        Ok(claims)
    }

    /// Add `jti` to the revocation list for `ttl`.
    pub async fn blacklist(&self, jti: &str, ttl: Duration) -> AuthResult<()> {
        self.cache
            .set_string(&blacklist_key(jti), "1", Some(ttl))
            .await?;
        Ok(())
    }

    /// Whether `jti` has been revoked.
    pub async fn is_blacklisted(&self, jti: &str) -> AuthResult<bool> {
        Ok(self.cache.exists(&blacklist_key(jti)).await?)
    }

    /// Store an issued refresh token under its owner and jti.
    pub async fn store_refresh_token(
        &self,
        user_id: &str,
        jti: &str,
        token: &str,
    ) -> AuthResult<()> {
        let ttl = Duration::from_secs(self.config.refresh_ttl_secs.max(1) as u64);
        self.cache
            .set_string(&refresh_key(user_id, jti), token, Some(ttl))
            .await?;
        Ok(())
    }

    /// Whether a refresh token is still present in the store.
    pub async fn refresh_token_exists(&self, user_id: &str, jti: &str) -> AuthResult<bool> {
        Ok(self.cache.exists(&refresh_key(user_id, jti)).await?)
    }

    /// Delete one stored refresh token.
    pub async fn delete_refresh_token(&self, user_id: &str, jti: &str) -> AuthResult<()> {
        self.cache.delete(&refresh_key(user_id, jti)).await?;
        Ok(())
    }

    /// Delete every stored refresh token belonging to `user_id`.
    pub async fn delete_all_refresh_tokens(&self, user_id: &str) -> AuthResult<usize> {
        let pattern = format!("refresh_token:{}:*", user_id);
        Ok(self.cache.delete_matching(&pattern).await?)
    }
}

fn refresh_key(user_id: &str, jti: &str) -> String {
    format!("refresh_token:{}:{}", user_id, jti)
}

fn blacklist_key(jti: &str) -> String {
    format!("blacklist:{}", jti)
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::aio::ConnectionManager;

    async fn test_validator() -> TokenValidator {
        test_validator_with_secret("test-secret").await
    }

    async fn test_validator_with_secret(secret: &str) -> TokenValidator {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let client = redis::Client::open(url).unwrap();
        let manager = ConnectionManager::new(client).await.unwrap();
        TokenValidator::new(CacheClient::new(manager), JwtConfig::new(secret))
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_token_round_trip() {
        let validator = test_validator().await;

        let token = validator.create_token("u1", "a@b.c", 900).unwrap();
        let claims = validator.decode_token(&token).unwrap();

        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.email, "a@b.c");
        assert!(!claims.jti.is_empty());
        assert!(claims.exp > claims.iat);
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_expired_token_rejected() {
        let validator = test_validator().await;

        let token = validator.create_token("u1", "a@b.c", -60).unwrap();
        assert!(matches!(
            validator.decode_token(&token),
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_wrong_secret_rejected() {
        let signer = test_validator_with_secret("secret-a").await;
        let verifier = test_validator_with_secret("secret-b").await;

        let token = signer.create_token("u1", "a@b.c", 900).unwrap();
        assert!(matches!(
            verifier.decode_token(&token),
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_blacklist_blocks_validation() {
        let validator = test_validator().await;

        let token = validator.create_token("u1", "a@b.c", 900).unwrap();
        let claims = validator.decode_token(&token).unwrap();

        assert!(validator.validate(&token).await.is_ok());

        validator
            .blacklist(&claims.jti, Duration::from_secs(60))
            .await
            .unwrap();

        assert!(matches!(
            validator.validate(&token).await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_refresh_token_store_round_trip() {
        let validator = test_validator().await;
        let user_id = Uuid::new_v4().to_string();

        validator
            .store_refresh_token(&user_id, "jti-1", "token-1")
            .await
            .unwrap();
        validator
            .store_refresh_token(&user_id, "jti-2", "token-2")
            .await
            .unwrap();

        assert!(validator
            .refresh_token_exists(&user_id, "jti-1")
            .await
            .unwrap());

        let deleted = validator.delete_all_refresh_tokens(&user_id).await.unwrap();
        assert_eq!(deleted, 2);

        assert!(!validator
            .refresh_token_exists(&user_id, "jti-1")
            .await
            .unwrap());
    }
}
