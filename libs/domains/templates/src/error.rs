use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template '{code}' not found for language '{language}'")]
    NotFound { code: String, language: String },

    #[error("Template '{code}' already exists for language '{language}'")]
    Conflict { code: String, language: String },

    #[error("Invalid template: {0}")]
    Validation(String),

    #[error("Template store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("Event publish error: {0}")]
    Publish(#[from] messaging::BrokerError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type TemplateResult<T> = Result<T, TemplateError>;

impl From<TemplateError> for axum_helpers::AppError {
    fn from(e: TemplateError) -> Self {
        use axum_helpers::AppError;

        match e {
            TemplateError::NotFound { .. } => AppError::NotFound(e.to_string()),
            TemplateError::Conflict { .. } => AppError::Conflict(e.to_string()),
            TemplateError::Validation(msg) => AppError::Validation(msg),
            TemplateError::Unavailable(msg) => AppError::Unavailable(msg),
            TemplateError::Cache(cache_err) => AppError::from(cache_err),
            TemplateError::Database(db_err) => AppError::Internal(db_err.to_string()),
            TemplateError::Publish(broker_err) => AppError::Unavailable(broker_err.to_string()),
            TemplateError::Internal(msg) => AppError::Internal(msg),
        }
    }
}
