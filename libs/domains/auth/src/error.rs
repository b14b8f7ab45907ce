use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid, expired, revoked, or missing credentials. The message is
    /// intentionally uniform so callers cannot distinguish why.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Token store error: {0}")]
    Store(#[from] cache::CacheError),

    #[error("Token encoding error: {0}")]
    TokenEncoding(String),

    #[error("User error: {0}")]
    User(#[from] domain_users::UserError),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<AuthError> for axum_helpers::AppError {
    fn from(e: AuthError) -> Self {
        use axum_helpers::AppError;

        match e {
            AuthError::Unauthorized => {
                AppError::Unauthorized("Invalid credentials or token".to_string())
            }
            AuthError::Store(cache_err) => AppError::from(cache_err),
            AuthError::TokenEncoding(msg) => AppError::Internal(msg),
            AuthError::User(user_err) => match user_err {
                domain_users::UserError::NotFound(id) => {
                    AppError::NotFound(format!("User {} not found", id))
                }
                domain_users::UserError::InvalidCredentials => {
                    AppError::Unauthorized("Invalid credentials or token".to_string())
                }
                domain_users::UserError::Validation(msg) => AppError::Validation(msg),
                domain_users::UserError::DuplicateEmail(email) => {
                    AppError::Conflict(format!("User with email '{}' already exists", email))
                }
                other => AppError::Internal(other.to_string()),
            },
        }
    }
}
