use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Duplicate request: idempotency key already used")]
    DuplicateRequest,

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Notifications disabled: {0}")]
    OptedOut(String),

    #[error("Rendering failed: {0}")]
    Render(String),

    #[error("Template error: {0}")]
    Template(#[from] domain_templates::TemplateError),

    #[error("Broker error: {0}")]
    Broker(#[from] messaging::BrokerError),

    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("User error: {0}")]
    User(#[from] domain_users::UserError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type NotificationResult<T> = Result<T, NotificationError>;

impl From<NotificationError> for axum_helpers::AppError {
    fn from(e: NotificationError) -> Self {
        use axum_helpers::AppError;

        match e {
            NotificationError::DuplicateRequest => AppError::Conflict(e.to_string()),
            NotificationError::Validation(msg) => AppError::Validation(msg),
            NotificationError::OptedOut(msg) => AppError::Forbidden(msg),
            NotificationError::Render(msg) => AppError::Validation(msg),
            NotificationError::Template(inner) => AppError::from(inner),
            NotificationError::Broker(inner) => AppError::Unavailable(inner.to_string()),
            NotificationError::Cache(inner) => AppError::from(inner),
            NotificationError::Database(inner) => AppError::Internal(inner.to_string()),
            NotificationError::User(domain_users::UserError::NotFound(id)) => {
                AppError::NotFound(format!("User {} not found", id))
            }
            NotificationError::User(inner) => AppError::Internal(inner.to_string()),
            NotificationError::Internal(msg) => AppError::Internal(msg),
        }
    }
}
