//! Registration, email verification, login and password reset.
//!
//! Every flow reads the runtime policy from the settings store once, so a
//! change made on the admin settings page applies to the next request.

use crate::models::{format_timestamp, parse_timestamp, User};
use crate::repositories::{NewUser, RepositoryError, UserRepository};
use crate::services::email_service::{EmailComposer, EmailService, OutgoingEmail};
use crate::services::password::{hash_password, verify_password, HashingError};
use crate::services::settings_service::{SettingsError, SettingsStore, SiteSettings};
use crate::services::token_service::{
    token_digest, TokenPurpose, TokenSigner, EMAIL_VERIFICATION_MAX_AGE, PASSWORD_RESET_MAX_AGE,
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

pub const USERNAME_MIN_LENGTH: usize = 4;
pub const USERNAME_MAX_LENGTH: usize = 64;
const EMAIL_MAX_LENGTH: usize = 255;

static USERNAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.\-]+$").unwrap());
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+$").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    PolicyDenied(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Invalid username or password")]
    AuthFailed,
    #[error("Please verify your email address before logging in")]
    Unverified,
    #[error("This link is invalid or has expired")]
    TokenInvalid,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("{0}")]
    InvalidInput(String),
    #[error("User not found")]
    UserNotFound,
    #[error(transparent)]
    Hashing(#[from] HashingError),
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Outcome of a mail hand-off. A failed delivery never undoes the operation
/// that requested it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Failed(String),
}

#[derive(Debug)]
pub struct Registration {
    pub user: User,
    pub delivery: Delivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    AlreadyVerified,
}

#[derive(Debug)]
pub struct LoginSession {
    pub user: User,
    pub session_timeout_minutes: i64,
}

pub fn validate_username(username: &str) -> Result<(), AccountError> {
    let length = username.chars().count();
    if !(USERNAME_MIN_LENGTH..=USERNAME_MAX_LENGTH).contains(&length) {
        return Err(AccountError::InvalidInput(format!(
            "Username must be between {} and {} characters",
            USERNAME_MIN_LENGTH, USERNAME_MAX_LENGTH
        )));
    }
    if !USERNAME_PATTERN.is_match(username) {
        return Err(AccountError::InvalidInput(
            "Username may only contain letters, digits, '_', '-' and '.'".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), AccountError> {
    if email.len() > EMAIL_MAX_LENGTH || !EMAIL_PATTERN.is_match(email) {
        return Err(AccountError::InvalidInput(
            "Invalid email address".to_string(),
        ));
    }
    Ok(())
}

pub fn check_password_policy(password: &str, settings: &SiteSettings) -> Result<(), AccountError> {
    if password.chars().count() < settings.password_min_length {
        return Err(AccountError::PolicyDenied(format!(
            "Password must be at least {} characters",
            settings.password_min_length
        )));
    }
    Ok(())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct AccountService {
    users: Arc<dyn UserRepository>,
    settings: Arc<SettingsStore>,
    signer: Arc<TokenSigner>,
    mailer: Arc<dyn EmailService>,
    composer: EmailComposer,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        settings: Arc<SettingsStore>,
        signer: Arc<TokenSigner>,
        mailer: Arc<dyn EmailService>,
        composer: EmailComposer,
    ) -> Self {
        Self {
            users,
            settings,
            signer,
            mailer,
            composer,
        }
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Registration, AccountError> {
        let settings = self.settings.load().await?;
        if !settings.allow_registration {
            return Err(AccountError::PolicyDenied(
                "Registration is currently disabled".to_string(),
            ));
        }

        let username = username.trim();
        let email = normalize_email(email);
        validate_username(username)?;
        validate_email(&email)?;
        check_password_policy(password, &settings)?;

        if self.users.find_by_username(username).await?.is_some() {
            return Err(AccountError::Conflict("Username already exists".to_string()));
        }
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AccountError::Conflict("Email already registered".to_string()));
        }

        let password_hash = hash_password(password)?;
        let token = self.signer.issue(&email, TokenPurpose::EmailVerification);

        let user = self
            .users
            .create_user(NewUser {
                username: username.to_string(),
                email: email.clone(),
                password_hash,
                is_admin: false,
                email_verified: false,
                email_verification_token: Some(token_digest(&token)),
            })
            .await
            .map_err(|e| match e {
                RepositoryError::AlreadyExists => {
                    AccountError::Conflict("Username or email already exists".to_string())
                }
                other => AccountError::Repository(other),
            })?;

        tracing::info!(user_id = user.id, username = %user.username, "user registered");

        let delivery = self
            .deliver(self.composer.verification(
                &settings.site_name,
                &user.email,
                &user.username,
                &token,
            ))
            .await;

        if settings.admin_alerts {
            let alert = self.composer.registration_alert(
                &settings.site_name,
                &settings.admin_email,
                &user.username,
                &user.email,
            );
            if let Delivery::Failed(reason) = self.deliver(alert).await {
                tracing::warn!("Admin registration alert not delivered: {}", reason);
            }
        }

        Ok(Registration { user, delivery })
    }

    pub async fn verify_email(&self, token: &str) -> Result<VerifyOutcome, AccountError> {
        self.verify_email_at(token, Utc::now()).await
    }

    pub async fn verify_email_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifyOutcome, AccountError> {
        let email = self
            .signer
            .verify_at(
                token,
                TokenPurpose::EmailVerification,
                EMAIL_VERIFICATION_MAX_AGE,
                now,
            )
            .map_err(|e| {
                tracing::debug!("Verification token rejected: {}", e);
                AccountError::TokenInvalid
            })?;

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AccountError::UserNotFound)?;

        if user.email_verification_token.as_deref() != Some(token_digest(token).as_str()) {
            return Err(AccountError::TokenInvalid);
        }

        if user.email_verified {
            self.users.set_email_verification_token(user.id, None).await?;
            return Ok(VerifyOutcome::AlreadyVerified);
        }

        self.users.mark_email_verified(user.id).await?;
        tracing::info!(user_id = user.id, "email verified");
        Ok(VerifyOutcome::Verified)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginSession, AccountError> {
        let user = self
            .users
            .find_by_username(username.trim())
            .await?
            .ok_or(AccountError::AuthFailed)?;

        if !verify_password(password, &user.password_hash) {
            tracing::debug!(user_id = user.id, "login rejected: wrong password");
            return Err(AccountError::AuthFailed);
        }

        let settings = self.settings.load().await?;
        if settings.require_email_verification && !user.email_verified {
            return Err(AccountError::Unverified);
        }

        if settings.log_user_activity {
            self.users
                .touch_last_seen(user.id, &format_timestamp(Utc::now()))
                .await?;
        }

        Ok(LoginSession {
            user,
            session_timeout_minutes: settings.session_timeout_minutes,
        })
    }

    /// Succeeds whether or not the address belongs to an account.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AccountError> {
        self.request_password_reset_at(email, Utc::now()).await
    }

    pub async fn request_password_reset_at(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AccountError> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            tracing::debug!("Password reset requested for unknown address");
            return Ok(());
        };

        let token = self
            .signer
            .issue_at(&user.email, TokenPurpose::PasswordReset, now);
        let expires_at = format_timestamp(now + PASSWORD_RESET_MAX_AGE);
        self.users
            .set_password_reset(user.id, &token_digest(&token), &expires_at)
            .await?;

        let settings = self.settings.load().await?;
        let message =
            self.composer
                .password_reset(&settings.site_name, &user.email, &user.username, &token);
        if let Delivery::Failed(reason) = self.deliver(message).await {
            tracing::warn!(user_id = user.id, "Password reset email not delivered: {}", reason);
        }
        Ok(())
    }

    /// Resolves a reset token to its user without consuming it.
    pub async fn check_reset_token(&self, token: &str) -> Result<User, AccountError> {
        self.check_reset_token_at(token, Utc::now()).await
    }

    async fn check_reset_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AccountError> {
        let email = self
            .signer
            .verify_at(token, TokenPurpose::PasswordReset, PASSWORD_RESET_MAX_AGE, now)
            .map_err(|e| {
                tracing::debug!("Reset token rejected: {}", e);
                AccountError::TokenInvalid
            })?;

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AccountError::TokenInvalid)?;

        if user.password_reset_token.as_deref() != Some(token_digest(token).as_str()) {
            return Err(AccountError::TokenInvalid);
        }

        let expired = user
            .password_reset_expires
            .as_deref()
            .and_then(parse_timestamp)
            .map_or(true, |expires| expires <= now);
        if expired {
            return Err(AccountError::TokenInvalid);
        }

        Ok(user)
    }

    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        confirm: &str,
    ) -> Result<(), AccountError> {
        self.reset_password_at(token, new_password, confirm, Utc::now())
            .await
    }

    pub async fn reset_password_at(
        &self,
        token: &str,
        new_password: &str,
        confirm: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AccountError> {
        if new_password != confirm {
            return Err(AccountError::PasswordMismatch);
        }

        let user = self.check_reset_token_at(token, now).await?;

        let settings = self.settings.load().await?;
        check_password_policy(new_password, &settings)?;

        let password_hash = hash_password(new_password)?;
        self.users
            .complete_password_reset(user.id, &password_hash)
            .await?;
        tracing::info!(user_id = user.id, "password reset completed");
        Ok(())
    }

    /// Re-issues a verification link for an unverified account. Unknown or
    /// already verified addresses are accepted silently.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AccountError> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            return Ok(());
        };
        if user.email_verified {
            return Ok(());
        }

        let token = self.signer.issue(&user.email, TokenPurpose::EmailVerification);
        self.users
            .set_email_verification_token(user.id, Some(token_digest(&token)))
            .await?;

        let settings = self.settings.load().await?;
        let message =
            self.composer
                .verification(&settings.site_name, &user.email, &user.username, &token);
        if let Delivery::Failed(reason) = self.deliver(message).await {
            tracing::warn!(user_id = user.id, "Verification email not delivered: {}", reason);
        }
        Ok(())
    }

    async fn deliver(&self, message: OutgoingEmail) -> Delivery {
        let to = message.to.clone();
        match self.mailer.send(message).await {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                tracing::warn!(to = %to, "Email delivery failed: {}", e);
                Delivery::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::settings_repository::MockSettingsRepository;
    use crate::repositories::user_repository::MockUserRepository;
    use crate::services::email_service::MockEmailService;

    fn settings_with(values: Vec<(&'static str, &'static str)>) -> Arc<SettingsStore> {
        let mut repo = MockSettingsRepository::new();
        repo.expect_all().returning(move || {
            let rows = values
                .iter()
                .map(|(k, v)| crate::models::Setting {
                    key: k.to_string(),
                    value: v.to_string(),
                })
                .collect();
            Box::pin(async move { Ok(rows) })
        });
        Arc::new(SettingsStore::new(Arc::new(repo)))
    }

    fn service(users: MockUserRepository, settings: Arc<SettingsStore>) -> AccountService {
        AccountService::new(
            Arc::new(users),
            settings,
            Arc::new(TokenSigner::new("unit-test-secret")),
            Arc::new(MockEmailService::new()),
            EmailComposer::new("http://localhost:8080"),
        )
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("al.ice_99").is_ok());
        assert!(matches!(
            validate_username("abc"),
            Err(AccountError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_username("has space"),
            Err(AccountError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("alice@x.com").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@x.com").is_err());
        assert!(validate_email("a@b@c").is_err());
        assert!(validate_email("a b@x.com").is_err());
    }

    #[tokio::test]
    async fn test_register_disabled_never_touches_users() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_username().never();
        users.expect_create_user().never();

        let service = service(users, settings_with(vec![("allow_registration", "")]));
        let result = service.register("alice", "alice@x.com", "longpassword").await;
        assert!(matches!(result, Err(AccountError::PolicyDenied(_))));
    }

    #[tokio::test]
    async fn test_register_short_password_is_policy_denied() {
        let mut users = MockUserRepository::new();
        users.expect_create_user().never();

        let service = service(users, settings_with(vec![("password_min_length", "12")]));
        let result = service.register("alice", "alice@x.com", "elevenchars").await;
        assert!(matches!(result, Err(AccountError::PolicyDenied(_))));
    }

    #[tokio::test]
    async fn test_login_unknown_user_is_auth_failed() {
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_username()
            .returning(|_| Box::pin(async { Ok(None) }));

        let service = service(users, settings_with(vec![]));
        let result = service.login("ghost", "whatever").await;
        assert!(matches!(result, Err(AccountError::AuthFailed)));
    }

    #[tokio::test]
    async fn test_reset_password_mismatch_checked_first() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_email().never();

        let service = service(users, settings_with(vec![]));
        let result = service
            .reset_password("not-even-a-token", "newpassword1", "newpassword2")
            .await;
        assert!(matches!(result, Err(AccountError::PasswordMismatch)));
    }
}
