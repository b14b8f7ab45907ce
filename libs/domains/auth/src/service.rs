use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};
use crate::validator::TokenValidator;
use chrono::Utc;
use domain_users::{User, UserError, UserRepository, UserService};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Successful login/refresh payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

/// The issuer half of the auth core: login, refresh rotation, logout.
#[derive(Clone)]
pub struct AuthService<R: UserRepository> {
    users: UserService<R>,
    validator: TokenValidator,
}

impl<R: UserRepository> AuthService<R> {
    pub fn new(users: UserService<R>, validator: TokenValidator) -> Self {
        Self { users, validator }
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Verify credentials and issue a token pair.
    ///
    /// Unknown email and wrong password are indistinguishable to the
    /// caller, in error shape and in latency.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<LoginResponse> {
        let user = self
            .users
            .verify_credentials(email, password)
            .await
            .map_err(|e| match e {
                UserError::InvalidCredentials => AuthError::Unauthorized,
                other => AuthError::User(other),
            })?;

        info!(user_id = %user.id, "User logged in");
        self.issue_pair(&user).await
    }

    /// Rotate a refresh token: verify it, issue a new pair, and revoke
    /// the consumed token.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<LoginResponse> {
        let claims = self.validator.decode_token(refresh_token)?;

        if !self
            .validator
            .refresh_token_exists(&claims.sub, &claims.jti)
            .await?
        {
            debug!(jti = %claims.jti, "Refresh token not in store");
            return Err(AuthError::Unauthorized);
        }

        if self.validator.is_blacklisted(&claims.jti).await? {
            debug!(jti = %claims.jti, "Refresh token is revoked");
            return Err(AuthError::Unauthorized);
        }

        let user_id: Uuid = claims.sub.parse().map_err(|_| AuthError::Unauthorized)?;
        let user = match self.users.get_user_record(user_id).await {
            Ok(user) => user,
            Err(UserError::NotFound(_)) => return Err(AuthError::Unauthorized),
            Err(other) => return Err(AuthError::User(other)),
        };

        let response = self.issue_pair(&user).await?;

        // Rotation: delete first, then blacklist. A crash in between
        // leaves a jti whose store key is gone, which already fails
        // validation.
        self.validator
            .delete_refresh_token(&claims.sub, &claims.jti)
            .await?;
        self.validator
            .blacklist(&claims.jti, remaining_lifetime(&claims))
            .await?;

        info!(user_id = %user.id, "Refresh token rotated");
        Ok(response)
    }

    /// Revoke the presented access token and every stored refresh token
    /// belonging to the user.
    pub async fn logout(&self, user_id: &str, access_claims: &Claims) -> AuthResult<()> {
        self.validator
            .blacklist(&access_claims.jti, remaining_lifetime(access_claims))
            .await?;

        let revoked = self.validator.delete_all_refresh_tokens(user_id).await?;

        info!(user_id, revoked, "User logged out");
        Ok(())
    }

    /// Validate an access token (signature, expiry, revocation).
    pub async fn validate(&self, token: &str) -> AuthResult<Claims> {
        self.validator.validate(token).await
    }

    async fn issue_pair(&self, user: &User) -> AuthResult<LoginResponse> {
        let config = self.validator.config().clone();
        let user_id = user.id.to_string();

        let access_token =
            self.validator
                .create_token(&user_id, &user.email, config.access_ttl_secs)?;
        let refresh_token =
            self.validator
                .create_token(&user_id, &user.email, config.refresh_ttl_secs)?;

        let refresh_claims = self.validator.decode_token(&refresh_token)?;
        self.validator
            .store_refresh_token(&user_id, &refresh_claims.jti, &refresh_token)
            .await?;

        Ok(LoginResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: config.access_ttl_secs,
            user: UserSummary::from(user),
        })
    }
}

/// TTL for a revocation record: at least the token's remaining lifetime.
fn remaining_lifetime(claims: &Claims) -> Duration {
    let remaining = claims.exp - Utc::now().timestamp();
    Duration::from_secs(remaining.max(1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::JwtConfig;
    use cache::CacheClient;
    use domain_users::{CreateUser, InMemoryUserRepository};
    use redis::aio::ConnectionManager;

    async fn test_auth_service() -> AuthService<InMemoryUserRepository> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let client = redis::Client::open(url).unwrap();
        let manager = ConnectionManager::new(client).await.unwrap();
        let cache = CacheClient::new(manager);

        let users = UserService::new(InMemoryUserRepository::new(), cache.clone());
        let validator = TokenValidator::new(cache, JwtConfig::new("test-secret"));

        AuthService::new(users, validator)
    }

    async fn seed_user(service: &AuthService<InMemoryUserRepository>) -> Uuid {
        service
            .users
            .create_user(CreateUser {
                email: "auth@example.com".to_string(),
                name: "Auth User".to_string(),
                password: "password123".to_string(),
                push_token: Some("device-token-abcdefghijklmnop".to_string()),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_login_issues_valid_pair() {
        let service = test_auth_service().await;
        let user_id = seed_user(&service).await;

        let response = service
            .login("auth@example.com", "password123")
            .await
            .unwrap();

        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.user.id, user_id);

        let claims = service.validate(&response.access_token).await.unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, "auth@example.com");
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_login_rejects_bad_credentials() {
        let service = test_auth_service().await;
        seed_user(&service).await;

        assert!(matches!(
            service.login("auth@example.com", "wrong-password").await,
            Err(AuthError::Unauthorized)
        ));
        assert!(matches!(
            service.login("missing@example.com", "password123").await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_refresh_rotation_invalidates_old_token() {
        let service = test_auth_service().await;
        seed_user(&service).await;

        let first = service
            .login("auth@example.com", "password123")
            .await
            .unwrap();

        let second = service.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        // The consumed refresh token is dead
        assert!(matches!(
            service.refresh(&first.refresh_token).await,
            Err(AuthError::Unauthorized)
        ));

        // The new one still works
        assert!(service.refresh(&second.refresh_token).await.is_ok());
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_logout_revokes_everything() {
        let service = test_auth_service().await;
        let user_id = seed_user(&service).await;

        let session = service
            .login("auth@example.com", "password123")
            .await
            .unwrap();

        let access_claims = service.validate(&session.access_token).await.unwrap();
        service
            .logout(&user_id.to_string(), &access_claims)
            .await
            .unwrap();

        // Access token is revoked
        assert!(matches!(
            service.validate(&session.access_token).await,
            Err(AuthError::Unauthorized)
        ));

        // Refresh tokens issued before logout are all dead
        assert!(matches!(
            service.refresh(&session.refresh_token).await,
            Err(AuthError::Unauthorized)
        ));
    }
}
