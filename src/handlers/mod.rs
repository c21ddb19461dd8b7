pub mod admin_handlers;
pub mod idea_handlers;

use crate::auth::middleware::{SESSION_IS_ADMIN, SESSION_USERNAME};
use crate::error::AppError;
use crate::middleware::csrf::{get_or_create_csrf_token, validate_csrf_form_field};
use crate::AppState;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use tower_sessions::Session;

pub const INVALID_CSRF_MESSAGE: &str =
    "Invalid security token. Please refresh the page and try again.";

/// Flash messages carried across a redirect in the query string.
#[derive(Debug, Default, Deserialize)]
pub struct FlashQuery {
    pub success: Option<String>,
    pub error: Option<String>,
}

/// Form body for buttons that post nothing but the CSRF token.
#[derive(Debug, Deserialize)]
pub struct CsrfForm {
    pub csrf_token: String,
}

/// Values every page layout needs.
pub struct PageContext {
    pub site_name: String,
    pub username: Option<String>,
    pub is_admin: bool,
    pub csrf_token: String,
    pub success: Option<String>,
    pub error: Option<String>,
}

impl PageContext {
    pub async fn load(
        state: &AppState,
        session: &Session,
        flash: FlashQuery,
    ) -> Result<Self, AppError> {
        let site_name = state.settings.load().await?.site_name;
        let username = session.get::<String>(SESSION_USERNAME).await.ok().flatten();
        let is_admin = session
            .get::<bool>(SESSION_IS_ADMIN)
            .await
            .ok()
            .flatten()
            .unwrap_or(false);
        let csrf_token = get_or_create_csrf_token(session)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        Ok(Self {
            site_name,
            username,
            is_admin,
            csrf_token,
            success: flash.success.filter(|s| !s.is_empty()),
            error: flash.error.filter(|s| !s.is_empty()),
        })
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self.success = None;
        self
    }
}

pub fn redirect_success(path: &str, message: &str) -> Response {
    redirect_flash(path, "success", message)
}

pub fn redirect_error(path: &str, message: &str) -> Response {
    redirect_flash(path, "error", message)
}

fn redirect_flash(path: &str, key: &str, message: &str) -> Response {
    let separator = if path.contains('?') { '&' } else { '?' };
    Redirect::to(&format!(
        "{}{}{}={}",
        path,
        separator,
        key,
        urlencoding::encode(message)
    ))
    .into_response()
}

/// Rejects the request with a flash redirect to `back` when the token does not match.
pub async fn check_csrf(session: &Session, token: &str, back: &str) -> Result<(), Response> {
    validate_csrf_form_field(session, token)
        .await
        .map_err(|_| redirect_error(back, INVALID_CSRF_MESSAGE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::LOCATION;

    #[test]
    fn test_flash_redirect_encodes_message() {
        let response = redirect_success("/login", "Email verified! You can now log in.");
        let location = response.headers().get(LOCATION).unwrap().to_str().unwrap();
        assert_eq!(
            location,
            "/login?success=Email%20verified%21%20You%20can%20now%20log%20in."
        );
    }

    #[test]
    fn test_flash_redirect_appends_to_existing_query() {
        let response = redirect_error("/admin/users?page=2", "User not found");
        let location = response.headers().get(LOCATION).unwrap().to_str().unwrap();
        assert_eq!(location, "/admin/users?page=2&error=User%20not%20found");
    }
}
