use crate::models::{page_offset, Page, User, UserSummary};
use crate::repositories::{NewUser, RepositoryError, UserRepository};
use crate::services::account_service::{normalize_email, validate_email, validate_username, AccountError};
use crate::services::password::{hash_password, HashingError};
use std::sync::Arc;

pub const USERS_PER_PAGE: i64 = 20;

/// Passwords set from the operator CLI bypass the runtime policy but not this floor.
const MIN_OPERATOR_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("{0}")]
    Forbidden(String),
    #[error("User not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Hashing(#[from] HashingError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<AccountError> for AdminError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Repository(e) => AdminError::Repository(e),
            AccountError::Hashing(e) => AdminError::Hashing(e),
            other => AdminError::InvalidInput(other.to_string()),
        }
    }
}

/// Account management for administrators and the operator CLI.
pub struct UserService {
    repository: Arc<dyn UserRepository>,
}

impl UserService {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        Self { repository }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, AdminError> {
        Ok(self.repository.find_by_id(id).await?)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, AdminError> {
        Ok(self.repository.find_by_username(username).await?)
    }

    pub async fn list_users(
        &self,
        search: Option<&str>,
        page: i64,
    ) -> Result<Page<UserSummary>, AdminError> {
        let search = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let total = self.repository.count_users(search.clone()).await?;
        let (page, offset) = page_offset(page, USERS_PER_PAGE, total);
        let items = self
            .repository
            .list_users(search, USERS_PER_PAGE, offset)
            .await?;

        Ok(Page {
            items,
            page,
            per_page: USERS_PER_PAGE,
            total,
        })
    }

    /// Flips the target's admin flag and returns the new value.
    pub async fn toggle_admin(&self, acting_user_id: i64, target_id: i64) -> Result<bool, AdminError> {
        if acting_user_id == target_id {
            return Err(AdminError::Forbidden(
                "You cannot change your own admin status".to_string(),
            ));
        }

        let target = self
            .repository
            .find_by_id(target_id)
            .await?
            .ok_or(AdminError::NotFound)?;
        let is_admin = !target.is_admin;
        self.repository.set_admin(target.id, is_admin).await?;

        tracing::info!(
            acting_user_id,
            target_id,
            is_admin,
            "admin status changed"
        );
        Ok(is_admin)
    }

    /// Deletes the target and, through the repository, every idea it owns.
    pub async fn delete_user(&self, acting_user_id: i64, target_id: i64) -> Result<User, AdminError> {
        if acting_user_id == target_id {
            return Err(AdminError::Forbidden(
                "You cannot delete your own account".to_string(),
            ));
        }
        self.remove(target_id).await
    }

    /// Operator deletion; no acting account to protect.
    pub async fn remove(&self, target_id: i64) -> Result<User, AdminError> {
        let target = self
            .repository
            .find_by_id(target_id)
            .await?
            .ok_or(AdminError::NotFound)?;

        match self.repository.delete_user(target.id).await {
            Ok(()) => {
                tracing::info!(target_id, username = %target.username, "user deleted");
                Ok(target)
            }
            Err(RepositoryError::NotFound) => Err(AdminError::NotFound),
            Err(e) => Err(AdminError::Repository(e)),
        }
    }

    /// Creates a verified administrator account.
    pub async fn create_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AdminError> {
        let username = username.trim();
        let email = normalize_email(email);
        validate_username(username)?;
        validate_email(&email)?;
        validate_operator_password(password)?;

        let password_hash = hash_password(password)?;
        match self
            .repository
            .create_user(NewUser {
                username: username.to_string(),
                email,
                password_hash,
                is_admin: true,
                email_verified: true,
                email_verification_token: None,
            })
            .await
        {
            Ok(user) => Ok(user),
            Err(RepositoryError::AlreadyExists) => Err(AdminError::Conflict(
                "Username or email already exists".to_string(),
            )),
            Err(e) => Err(AdminError::Repository(e)),
        }
    }

    pub async fn set_password(&self, username: &str, password: &str) -> Result<(), AdminError> {
        validate_operator_password(password)?;
        let user = self
            .repository
            .find_by_username(username)
            .await?
            .ok_or(AdminError::NotFound)?;

        let password_hash = hash_password(password)?;
        self.repository
            .complete_password_reset(user.id, &password_hash)
            .await?;
        Ok(())
    }

    pub async fn mark_verified(&self, username: &str) -> Result<(), AdminError> {
        let user = self
            .repository
            .find_by_username(username)
            .await?
            .ok_or(AdminError::NotFound)?;

        match self.repository.mark_email_verified(user.id).await {
            Ok(()) => Ok(()),
            Err(RepositoryError::NotFound) => Err(AdminError::NotFound),
            Err(e) => Err(AdminError::Repository(e)),
        }
    }
}

fn validate_operator_password(password: &str) -> Result<(), AdminError> {
    if password.chars().count() < MIN_OPERATOR_PASSWORD_LENGTH {
        return Err(AdminError::InvalidInput(format!(
            "Password must be at least {} characters",
            MIN_OPERATOR_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::user_repository::MockUserRepository;

    fn user(id: i64, is_admin: bool) -> User {
        User {
            id,
            username: format!("user{}", id),
            email: format!("user{}@example.com", id),
            password_hash: String::new(),
            is_admin,
            email_verified: true,
            email_verification_token: None,
            password_reset_token: None,
            password_reset_expires: None,
            created_at: "2025-01-01T00:00:00Z".to_string(),
            last_seen: None,
        }
    }

    #[tokio::test]
    async fn test_toggle_admin_refuses_own_account() {
        let mut repo = MockUserRepository::new();
        repo.expect_set_admin().never();

        let service = UserService::new(Arc::new(repo));
        let result = service.toggle_admin(1, 1).await;
        assert!(matches!(result, Err(AdminError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_toggle_admin_flips_flag() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_id()
            .returning(|id| Box::pin(async move { Ok(Some(user(id, false))) }));
        repo.expect_set_admin()
            .withf(|id, is_admin| *id == 2 && *is_admin)
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let service = UserService::new(Arc::new(repo));
        assert!(service.toggle_admin(1, 2).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_user_is_not_found() {
        let mut repo = MockUserRepository::new();
        repo.expect_find_by_id()
            .returning(|_| Box::pin(async { Ok(None) }));
        repo.expect_delete_user().never();

        let service = UserService::new(Arc::new(repo));
        assert!(matches!(
            service.delete_user(1, 99).await,
            Err(AdminError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_refuses_own_account() {
        let repo = MockUserRepository::new();
        let service = UserService::new(Arc::new(repo));
        assert!(matches!(
            service.delete_user(5, 5).await,
            Err(AdminError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_create_admin_rejects_short_password() {
        let mut repo = MockUserRepository::new();
        repo.expect_create_user().never();

        let service = UserService::new(Arc::new(repo));
        let result = service.create_admin("admin", "admin@example.com", "short").await;
        assert!(matches!(result, Err(AdminError::InvalidInput(_))));
    }
}
