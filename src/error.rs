use crate::repositories::RepositoryError;
use crate::services::{AccountError, AdminError, IdeaError, SettingsError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Failures that escape a handler. User-correctable errors are turned into
/// `?error=` redirects before they get here.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Repository(e) => AppError::Repository(e),
            AccountError::Settings(e) => AppError::Settings(e),
            AccountError::Hashing(e) => AppError::Internal(e.to_string()),
            AccountError::UserNotFound => AppError::NotFound,
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl From<IdeaError> for AppError {
    fn from(err: IdeaError) -> Self {
        match err {
            IdeaError::NotFound => AppError::NotFound,
            IdeaError::Forbidden => AppError::Forbidden,
            IdeaError::Repository(e) => AppError::Repository(e),
            IdeaError::Settings(e) => AppError::Settings(e),
            IdeaError::Export(msg) => AppError::Internal(msg),
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl From<AdminError> for AppError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::NotFound => AppError::NotFound,
            AdminError::Forbidden(_) => AppError::Forbidden,
            AdminError::Repository(e) => AppError::Repository(e),
            AdminError::Hashing(e) => AppError::Internal(e.to_string()),
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Database(_)
            | AppError::Repository(_)
            | AppError::Settings(_)
            | AppError::Template(_)
            | AppError::Internal(_) => {
                tracing::error!("Request failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, message).into_response()
    }
}
