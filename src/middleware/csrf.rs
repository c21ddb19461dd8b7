use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{debug, warn};
use uuid::Uuid;

pub const CSRF_TOKEN_KEY: &str = "csrf_token";
pub const CSRF_HEADER: &str = "X-CSRF-Token";
pub const CSRF_FORM_FIELD: &str = "csrf_token";

const CSRF_TOKEN_MAX_AGE_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfToken {
    pub value: String,
    pub created_at: i64,
}

impl CsrfToken {
    pub fn new() -> Self {
        Self {
            value: Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() - self.created_at > CSRF_TOKEN_MAX_AGE_SECS
    }
}

impl Default for CsrfToken {
    fn default() -> Self {
        Self::new()
    }
}

/// First characters of a token, for logs.
fn fingerprint(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

pub async fn generate_csrf_token(
    session: &Session,
) -> Result<String, tower_sessions::session::Error> {
    let token = CsrfToken::new();
    let value = token.value.clone();
    session.insert(CSRF_TOKEN_KEY, token).await?;
    debug!("Generated new CSRF token: {}", fingerprint(&value));
    Ok(value)
}

/// The session's current token, minted on first use or after expiry.
pub async fn get_or_create_csrf_token(
    session: &Session,
) -> Result<String, tower_sessions::session::Error> {
    let token: Option<CsrfToken> = session.get(CSRF_TOKEN_KEY).await?;
    match token {
        Some(existing) if !existing.is_expired() => Ok(existing.value),
        _ => generate_csrf_token(session).await,
    }
}

async fn stored_token(session: &Session) -> Result<CsrfToken, StatusCode> {
    let stored: Option<CsrfToken> = session.get(CSRF_TOKEN_KEY).await.map_err(|e| {
        warn!("Failed to get CSRF token from session: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    match stored {
        Some(token) if token.is_expired() => {
            warn!("CSRF token expired");
            Err(StatusCode::FORBIDDEN)
        }
        Some(token) => Ok(token),
        None => {
            warn!("No CSRF token in session");
            Err(StatusCode::FORBIDDEN)
        }
    }
}

/// Checks the `X-CSRF-Token` header on unsafe requests that carry one.
/// Form posts are checked by their handlers through `validate_csrf_form_field`.
pub async fn csrf_validation_middleware(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if matches!(
        *request.method(),
        Method::GET | Method::HEAD | Method::OPTIONS
    ) {
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    if let Some(token) = provided {
        let stored = stored_token(&session).await?;
        if token != stored.value {
            warn!(
                "CSRF header mismatch for {} {}: got {}",
                request.method(),
                request.uri().path(),
                fingerprint(&token)
            );
            return Err(StatusCode::FORBIDDEN);
        }
    }

    Ok(next.run(request).await)
}

/// Validates a submitted form token against the session. The token stays
/// valid for the session so that several open forms keep working.
pub async fn validate_csrf_form_field(
    session: &Session,
    form_token: &str,
) -> Result<(), StatusCode> {
    let stored = stored_token(session).await?;
    if form_token != stored.value {
        warn!("CSRF form token mismatch: got {}", fingerprint(form_token));
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(())
}
