use super::{escape_like, map_unique_violation, RepositoryError, RepositoryResult};
use crate::models::{format_timestamp, User, UserSummary};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

const USER_COLUMNS: &str = "id, username, email, password_hash, is_admin, email_verified, \
     email_verification_token, password_reset_token, password_reset_expires, created_at, last_seen";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub email_verified: bool,
    pub email_verification_token: Option<String>,
}

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: NewUser) -> RepositoryResult<User>;
    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;
    async fn set_email_verification_token(
        &self,
        id: i64,
        token_digest: Option<String>,
    ) -> RepositoryResult<()>;
    /// Flips `email_verified` on and clears the outstanding verification token.
    async fn mark_email_verified(&self, id: i64) -> RepositoryResult<()>;
    async fn set_password_reset(
        &self,
        id: i64,
        token_digest: &str,
        expires_at: &str,
    ) -> RepositoryResult<()>;
    /// Stores the new hash and clears both reset columns in one statement.
    async fn complete_password_reset(&self, id: i64, password_hash: &str) -> RepositoryResult<()>;
    async fn touch_last_seen(&self, id: i64, at: &str) -> RepositoryResult<()>;
    async fn set_admin(&self, id: i64, is_admin: bool) -> RepositoryResult<()>;
    async fn delete_user(&self, id: i64) -> RepositoryResult<()>;
    async fn list_users(
        &self,
        search: Option<String>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<UserSummary>>;
    async fn count_users(&self, search: Option<String>) -> RepositoryResult<i64>;
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> RepositoryResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    fn expect_one_row(result: sqlx::sqlite::SqliteQueryResult) -> RepositoryResult<()> {
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

fn search_pattern(search: &Option<String>) -> Option<String> {
    search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", escape_like(s)))
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create_user(&self, user: NewUser) -> RepositoryResult<User> {
        let created_at = format_timestamp(Utc::now());
        let result = sqlx::query(
            r#"
            INSERT INTO users
                (username, email, password_hash, is_admin, email_verified,
                 email_verification_token, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_admin)
        .bind(user.email_verified)
        .bind(&user.email_verification_token)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        self.find_by_id(result.last_insert_rowid())
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> RepositoryResult<Option<User>> {
        self.find_one("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        self.find_one("email", email).await
    }

    async fn set_email_verification_token(
        &self,
        id: i64,
        token_digest: Option<String>,
    ) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE users SET email_verification_token = ? WHERE id = ?")
            .bind(token_digest)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_unique_violation)?;
        Self::expect_one_row(result)
    }

    async fn mark_email_verified(&self, id: i64) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE users SET email_verified = 1, email_verification_token = NULL WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Self::expect_one_row(result)
    }

    async fn set_password_reset(
        &self,
        id: i64,
        token_digest: &str,
        expires_at: &str,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE users SET password_reset_token = ?, password_reset_expires = ? WHERE id = ?",
        )
        .bind(token_digest)
        .bind(expires_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;
        Self::expect_one_row(result)
    }

    async fn complete_password_reset(&self, id: i64, password_hash: &str) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = ?, password_reset_token = NULL, password_reset_expires = NULL
            WHERE id = ?
            "#,
        )
        .bind(password_hash)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Self::expect_one_row(result)
    }

    async fn touch_last_seen(&self, id: i64, at: &str) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE users SET last_seen = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Self::expect_one_row(result)
    }

    async fn set_admin(&self, id: i64, is_admin: bool) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE users SET is_admin = ? WHERE id = ?")
            .bind(is_admin)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Self::expect_one_row(result)
    }

    async fn delete_user(&self, id: i64) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM ideas WHERE user_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_users(
        &self,
        search: Option<String>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<UserSummary>> {
        let pattern = search_pattern(&search);
        let rows = sqlx::query_as::<_, UserSummary>(
            r#"
            SELECT
                u.id, u.username, u.email, u.is_admin, u.email_verified,
                u.created_at, u.last_seen,
                (SELECT COUNT(*) FROM ideas i WHERE i.user_id = u.id) AS idea_count
            FROM users u
            WHERE (?1 IS NULL OR u.username LIKE ?1 ESCAPE '\')
            ORDER BY u.created_at DESC, u.id DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_users(&self, search: Option<String>) -> RepositoryResult<i64> {
        let pattern = search_pattern(&search);
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE (?1 IS NULL OR username LIKE ?1 ESCAPE '\\')",
        )
        .bind(pattern)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
