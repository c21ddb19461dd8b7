pub mod test_helpers {
    use crate::config::{session::SessionConfig, AppConfig};
    use crate::services::{EmailError, EmailService, OutgoingEmail};
    use crate::AppState;
    use async_trait::async_trait;
    use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
    use std::sync::{Arc, Mutex};
    use tempfile::NamedTempFile;
    use tower_sessions_sqlx_store::SqliteStore;

    pub const TEST_BASE_URL: &str = "http://localhost:8080";
    pub const TEST_SECRET_KEY: &[u8] = b"test-secret-key-for-signing-email-tokens-0123456789";

    /// Create a new in-memory SQLite database for testing
    pub async fn create_test_db() -> Result<SqlitePool, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(pool)
    }

    /// Create a temporary file-based SQLite database for testing
    /// Useful when a test needs more than one connection
    pub async fn create_test_db_file() -> Result<(SqlitePool, NamedTempFile), sqlx::Error> {
        let temp_file = NamedTempFile::new().map_err(sqlx::Error::Io)?;
        let db_path = temp_file
            .path()
            .to_str()
            .ok_or_else(|| sqlx::Error::Configuration("Invalid database path".into()))?;
        let database_url = format!("sqlite://{}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok((pool, temp_file))
    }

    /// Insert a test user with a hashed password
    pub async fn insert_test_user(
        pool: &SqlitePool,
        username: &str,
        email: &str,
        password: &str,
        verified: bool,
        is_admin: bool,
    ) -> Result<i64, sqlx::Error> {
        let password_hash = crate::services::password::hash_password(password)
            .map_err(|e| sqlx::Error::Configuration(e.to_string().into()))?;

        let result = sqlx::query(
            "INSERT INTO users (username, email, password_hash, email_verified, is_admin, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(verified)
        .bind(is_admin)
        .bind(crate::models::format_timestamp(chrono::Utc::now()))
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Insert an idea row directly, bypassing validation and quota.
    pub async fn insert_test_idea(
        pool: &SqlitePool,
        user_id: i64,
        title: &str,
        tags: &str,
        status: &str,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO ideas (user_id, title, description, tags, status, created_at)
             VALUES (?, ?, '', ?, ?, ?)",
        )
        .bind(user_id)
        .bind(title)
        .bind(tags)
        .bind(status)
        .bind(crate::models::format_timestamp(chrono::Utc::now()))
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub fn test_config() -> AppConfig {
        AppConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            base_url: TEST_BASE_URL.to_string(),
            secret_key: TEST_SECRET_KEY.to_vec(),
        }
    }

    pub fn test_state(pool: SqlitePool, mailer: Arc<dyn EmailService>) -> AppState {
        AppState::new(pool, &test_config(), mailer)
    }

    /// Full application router backed by `pool`, sessions included.
    pub async fn test_router(
        pool: SqlitePool,
        mailer: Arc<dyn EmailService>,
    ) -> Result<axum::Router, sqlx::Error> {
        let store = SqliteStore::new(pool.clone());
        store.migrate().await?;
        let layer = SessionConfig::from_env().create_layer(store);
        Ok(crate::build_router(test_state(pool, mailer), layer))
    }

    /// Keeps every email handed to it.
    #[derive(Default, Clone)]
    pub struct RecordingEmailService {
        sent: Arc<Mutex<Vec<OutgoingEmail>>>,
    }

    impl RecordingEmailService {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sent(&self) -> Vec<OutgoingEmail> {
            self.sent
                .lock()
                .map(|sent| sent.clone())
                .unwrap_or_default()
        }

        pub fn sent_to(&self, address: &str) -> Vec<OutgoingEmail> {
            self.sent()
                .into_iter()
                .filter(|email| email.to == address)
                .collect()
        }
    }

    #[async_trait]
    impl EmailService for RecordingEmailService {
        async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(email);
            }
            Ok(())
        }
    }

    /// Refuses every message.
    pub struct FailingEmailService;

    #[async_trait]
    impl EmailService for FailingEmailService {
        async fn send(&self, _email: OutgoingEmail) -> Result<(), EmailError> {
            Err(EmailError::SendFailed("connection refused".to_string()))
        }
    }

    /// Pulls the token out of the first link in `body` that contains `route`,
    /// e.g. `"/verify-email/"`.
    pub fn token_from_link(body: &str, route: &str) -> Option<String> {
        let start = body.find(route)? + route.len();
        let token: String = body[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '='))
            .collect();
        (!token.is_empty()).then_some(token)
    }
}

// Note: This is test-only code. Panic on error is acceptable in tests.
#[cfg(test)]
pub async fn create_test_pool() -> sqlx::SqlitePool {
    match test_helpers::create_test_db().await {
        Ok(pool) => pool,
        Err(e) => panic!("Failed to create test pool: {}", e),
    }
}
