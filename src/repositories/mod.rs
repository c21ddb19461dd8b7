pub mod idea_repository;
pub mod settings_repository;
pub mod user_repository;

pub use idea_repository::{IdeaFilter, IdeaRepository, SqliteIdeaRepository};
pub use settings_repository::{SettingsRepository, SqliteSettingsRepository};
pub use user_repository::{NewUser, SqliteUserRepository, UserRepository};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Record not found")]
    NotFound,
    #[error("Record already exists")]
    AlreadyExists,
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Maps a uniqueness violation onto `AlreadyExists`, everything else onto `Database`.
pub(crate) fn map_unique_violation(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            RepositoryError::AlreadyExists
        }
        _ => RepositoryError::Database(err),
    }
}

/// Makes user text match literally inside a `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
