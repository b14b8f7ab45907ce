use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use cache::CacheClient;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{UserError, UserResult};
use crate::models::{CreateUser, Preferences, UpdateUser, User, UserResponse};
use crate::repository::UserRepository;

/// TTL for the cached preferences document.
const PREFERENCES_TTL: Duration = Duration::from_secs(3600);

/// Service layer for user business logic.
///
/// Owns password hashing (argon2 with a per-record salt) and the
/// `user:preferences:{id}` cache entry, which is invalidated on every
/// write so readers are never stale for longer than one TTL.
#[derive(Clone)]
pub struct UserService<R: UserRepository> {
    repository: Arc<R>,
    cache: CacheClient,
    /// Hash verified when login hits an unknown email, so that path
    /// costs the same as a wrong password and does not leak which
    /// emails exist.
    dummy_hash: String,
}

impl<R: UserRepository> UserService<R> {
    pub fn new(repository: R, cache: CacheClient) -> Self {
        let dummy_hash = hash_password("courier-dummy-password")
            .unwrap_or_else(|_| String::new());

        Self {
            repository: Arc::new(repository),
            cache,
            dummy_hash,
        }
    }

    /// Create a new user with password hashing.
    pub async fn create_user(&self, input: CreateUser) -> UserResult<UserResponse> {
        self.validate_email(&input.email)?;
        self.validate_name(&input.name)?;
        self.validate_password(&input.password)?;

        let password_hash = hash_password(&input.password)?;

        let mut user = User::new(input.email, input.name, password_hash);
        user.push_token = input.push_token;

        let created = self.repository.create(user).await?;
        Ok(created.into())
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: Uuid) -> UserResult<UserResponse> {
        let user = self
            .repository
            .get_by_id(id)
            .await?
            .ok_or(UserError::NotFound(id))?;

        Ok(user.into())
    }

    /// Get the full user row by ID (internal callers that need the
    /// recipient fields).
    pub async fn get_user_record(&self, id: Uuid) -> UserResult<User> {
        self.repository
            .get_by_id(id)
            .await?
            .ok_or(UserError::NotFound(id))
    }

    /// Whether a user with this ID still exists.
    pub async fn user_exists(&self, id: Uuid) -> UserResult<bool> {
        Ok(self.repository.get_by_id(id).await?.is_some())
    }

    /// Update a user, invalidating the cached preferences.
    pub async fn update_user(&self, id: Uuid, input: UpdateUser) -> UserResult<UserResponse> {
        if let Some(ref name) = input.name {
            self.validate_name(name)?;
        }
        if let Some(ref password) = input.password {
            self.validate_password(password)?;
        }

        let mut user = self
            .repository
            .get_by_id(id)
            .await?
            .ok_or(UserError::NotFound(id))?;

        let new_password_hash = match input.password {
            Some(ref password) => Some(hash_password(password)?),
            None => None,
        };

        user.apply_update(input, new_password_hash);

        let updated = self.repository.update(user).await?;

        // Cache-vs-truth: drop the entry rather than rewriting it, so a
        // lost write degrades to a miss instead of staleness
        let _ = self
            .cache
            .delete(&Self::preferences_key(id))
            .await;

        Ok(updated.into())
    }

    /// Delete a user and their cached preferences.
    pub async fn delete_user(&self, id: Uuid) -> UserResult<()> {
        if !self.repository.delete(id).await? {
            return Err(UserError::NotFound(id));
        }

        let _ = self.cache.delete(&Self::preferences_key(id)).await;
        Ok(())
    }

    /// Verify user credentials (for login).
    ///
    /// Unknown-email and wrong-password both return `InvalidCredentials`
    /// after one argon2 verification.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> UserResult<User> {
        match self.repository.get_by_email(email).await? {
            Some(user) => {
                if verify_password(password, &user.password_hash)? {
                    Ok(user)
                } else {
                    Err(UserError::InvalidCredentials)
                }
            }
            None => {
                let _ = verify_password(password, &self.dummy_hash);
                Err(UserError::InvalidCredentials)
            }
        }
    }

    /// Notification preferences, cache-through with a 1 h TTL.
    pub async fn get_preferences(&self, id: Uuid) -> UserResult<Preferences> {
        let key = Self::preferences_key(id);

        if let Ok(Some(cached)) = self.cache.get_json::<Preferences>(&key).await {
            return Ok(cached);
        }

        let user = self
            .repository
            .get_by_id(id)
            .await?
            .ok_or(UserError::NotFound(id))?;

        let _ = self
            .cache
            .set_json(&key, &user.preferences, Some(PREFERENCES_TTL))
            .await;

        Ok(user.preferences)
    }

    fn preferences_key(id: Uuid) -> String {
        format!("user:preferences:{}", id)
    }

    fn validate_email(&self, email: &str) -> UserResult<()> {
        if email.trim().is_empty() {
            return Err(UserError::Validation("Email cannot be empty".to_string()));
        }

        if !email.contains('@') || !email.contains('.') {
            return Err(UserError::Validation("Invalid email format".to_string()));
        }

        if email.len() > 255 {
            return Err(UserError::Validation(
                "Email cannot exceed 255 characters".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_name(&self, name: &str) -> UserResult<()> {
        if name.trim().is_empty() {
            return Err(UserError::Validation("Name cannot be empty".to_string()));
        }

        if name.len() > 100 {
            return Err(UserError::Validation(
                "Name cannot exceed 100 characters".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_password(&self, password: &str) -> UserResult<()> {
        if password.len() < 8 {
            return Err(UserError::Validation(
                "Password must be at least 8 characters".to_string(),
            ));
        }

        if password.len() > 128 {
            return Err(UserError::Validation(
                "Password cannot exceed 128 characters".to_string(),
            ));
        }

        Ok(())
    }
}

fn hash_password(password: &str) -> UserResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| UserError::PasswordHash(e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> UserResult<bool> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| UserError::PasswordHash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryUserRepository;

    async fn test_service() -> UserService<InMemoryUserRepository> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let client = redis::Client::open(url).unwrap();
        let manager = redis::aio::ConnectionManager::new(client).await.unwrap();
        UserService::new(InMemoryUserRepository::new(), CacheClient::new(manager))
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(hash.starts_with("$argon2"));

        assert!(verify_password("correct horse battery staple", &hash).unwrap());
        assert!(!verify_password("wrong password", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("password123").unwrap();
        let b = hash_password("password123").unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_create_and_verify_credentials() {
        let service = test_service().await;

        let created = service
            .create_user(CreateUser {
                email: "login@example.com".to_string(),
                name: "Login User".to_string(),
                password: "hunter2hunter2".to_string(),
                push_token: None,
            })
            .await
            .unwrap();

        let verified = service
            .verify_credentials("login@example.com", "hunter2hunter2")
            .await
            .unwrap();
        assert_eq!(verified.id, created.id);

        let wrong = service
            .verify_credentials("login@example.com", "wrong-password")
            .await;
        assert!(matches!(wrong, Err(UserError::InvalidCredentials)));

        // Unknown email yields the same error kind as a bad password
        let missing = service
            .verify_credentials("nobody@example.com", "whatever123")
            .await;
        assert!(matches!(missing, Err(UserError::InvalidCredentials)));
    }

    #[tokio::test]
    #[ignore] // Requires actual Redis
    async fn test_weak_password_rejected() {
        let service = test_service().await;

        let result = service
            .create_user(CreateUser {
                email: "weak@example.com".to_string(),
                name: "Weak".to_string(),
                password: "short".to_string(),
                push_token: None,
            })
            .await;

        assert!(matches!(result, Err(UserError::Validation(_))));
    }
}
