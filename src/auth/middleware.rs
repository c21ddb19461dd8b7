use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

pub const SESSION_USER_ID: &str = "user_id";
pub const SESSION_USERNAME: &str = "username";
pub const SESSION_IS_ADMIN: &str = "is_admin";
pub const SESSION_AUTH_TIMESTAMP: &str = "auth_timestamp";

pub async fn session_user_id(session: &Session) -> Option<i64> {
    session.get::<i64>(SESSION_USER_ID).await.ok().flatten()
}

pub async fn require_auth(session: Session, request: Request, next: Next) -> Response {
    if session_user_id(&session).await.is_some() {
        next.run(request).await
    } else {
        Redirect::to("/login").into_response()
    }
}

/// Admin routes re-check the flag in the database on every request so that
/// a revoked admin loses access immediately.
pub async fn require_admin(
    State(state): State<AppState>,
    session: Session,
    request: Request,
    next: Next,
) -> Response {
    let Some(user_id) = session_user_id(&session).await else {
        return Redirect::to("/login").into_response();
    };

    match state.users.find_by_id(user_id).await {
        Ok(Some(user)) if user.is_admin => next.run(request).await,
        Ok(Some(_)) => {
            tracing::warn!(user_id, "non-admin attempted to reach the admin area");
            Redirect::to("/?error=Access%20denied.%20Admin%20privileges%20required.")
                .into_response()
        }
        Ok(None) => {
            let _ = session.flush().await;
            Redirect::to("/login").into_response()
        }
        Err(e) => {
            tracing::error!("Admin check failed: {}", e);
            crate::error::AppError::from(e).into_response()
        }
    }
}

pub async fn redirect_if_authenticated(session: Session, request: Request, next: Next) -> Response {
    if session_user_id(&session).await.is_some() {
        Redirect::to("/").into_response()
    } else {
        next.run(request).await
    }
}
