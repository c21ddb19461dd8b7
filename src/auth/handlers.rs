use crate::auth::middleware::{
    SESSION_AUTH_TIMESTAMP, SESSION_IS_ADMIN, SESSION_USERNAME, SESSION_USER_ID,
};
use crate::error::AppError;
use crate::handlers::{
    check_csrf, redirect_error, redirect_success, FlashQuery, PageContext, INVALID_CSRF_MESSAGE,
};
use crate::middleware::csrf::validate_csrf_form_field;
use crate::services::{AccountError, Delivery, VerifyOutcome};
use crate::AppState;
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Form, Path, Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tower_sessions::{Expiry, Session};

#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
struct RegisterTemplate {
    ctx: PageContext,
    allow_registration: bool,
    password_min_length: usize,
    username: String,
    email: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
struct LoginTemplate {
    ctx: PageContext,
    username: String,
    show_resend: bool,
}

#[derive(Template, WebTemplate)]
#[template(path = "auth/email_form.html")]
struct EmailFormTemplate {
    ctx: PageContext,
    title: String,
    intro: String,
    action: String,
    button: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "auth/reset_password.html")]
struct ResetPasswordTemplate {
    ctx: PageContext,
    token: String,
    password_min_length: usize,
}

#[derive(Deserialize)]
pub struct RegisterForm {
    username: String,
    email: String,
    password: String,
    password_confirm: String,
    csrf_token: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
    csrf_token: String,
}

#[derive(Deserialize)]
pub struct EmailForm {
    email: String,
    csrf_token: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordForm {
    password: String,
    password_confirm: String,
    csrf_token: String,
}

pub async fn register_page(
    State(state): State<AppState>,
    session: Session,
    Query(flash): Query<FlashQuery>,
) -> Result<Response, AppError> {
    let settings = state.settings.load().await?;
    let ctx = PageContext::load(&state, &session, flash).await?;
    Ok(RegisterTemplate {
        ctx,
        allow_registration: settings.allow_registration,
        password_min_length: settings.password_min_length,
        username: String::new(),
        email: String::new(),
    }
    .into_response())
}

async fn register_error(
    state: &AppState,
    session: &Session,
    form: &RegisterForm,
    message: &str,
) -> Result<Response, AppError> {
    let settings = state.settings.load().await?;
    let ctx = PageContext::load(state, session, FlashQuery::default())
        .await?
        .with_error(message);
    Ok(RegisterTemplate {
        ctx,
        allow_registration: settings.allow_registration,
        password_min_length: settings.password_min_length,
        username: form.username.clone(),
        email: form.email.clone(),
    }
    .into_response())
}

pub async fn register_handler(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    if validate_csrf_form_field(&session, &form.csrf_token)
        .await
        .is_err()
    {
        return register_error(&state, &session, &form, INVALID_CSRF_MESSAGE).await;
    }

    if form.password != form.password_confirm {
        return register_error(&state, &session, &form, "Passwords do not match").await;
    }

    match state
        .accounts
        .register(&form.username, &form.email, &form.password)
        .await
    {
        Ok(registration) => Ok(match registration.delivery {
            Delivery::Sent => redirect_success(
                "/login",
                "Registration successful! Please check your email to verify your account.",
            ),
            Delivery::Failed(_) => redirect_success(
                "/login",
                "Account created, but the verification email could not be sent. \
                 Use \"Resend verification email\" to try again.",
            ),
        }),
        Err(
            err @ (AccountError::PolicyDenied(_)
            | AccountError::Conflict(_)
            | AccountError::InvalidInput(_)),
        ) => register_error(&state, &session, &form, &err.to_string()).await,
        Err(err) => Err(err.into()),
    }
}

pub async fn login_page(
    State(state): State<AppState>,
    session: Session,
    Query(flash): Query<FlashQuery>,
) -> Result<Response, AppError> {
    let ctx = PageContext::load(&state, &session, flash).await?;
    Ok(LoginTemplate {
        ctx,
        username: String::new(),
        show_resend: false,
    }
    .into_response())
}

async fn login_error(
    state: &AppState,
    session: &Session,
    username: &str,
    message: &str,
    show_resend: bool,
) -> Result<Response, AppError> {
    let ctx = PageContext::load(state, session, FlashQuery::default())
        .await?
        .with_error(message);
    Ok(LoginTemplate {
        ctx,
        username: username.to_string(),
        show_resend,
    }
    .into_response())
}

pub async fn login_handler(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    if validate_csrf_form_field(&session, &form.csrf_token)
        .await
        .is_err()
    {
        return login_error(&state, &session, &form.username, INVALID_CSRF_MESSAGE, false).await;
    }

    let login = match state.accounts.login(&form.username, &form.password).await {
        Ok(login) => login,
        Err(AccountError::AuthFailed) => {
            return login_error(
                &state,
                &session,
                &form.username,
                "Invalid username or password",
                false,
            )
            .await
        }
        Err(err @ AccountError::Unverified) => {
            return login_error(&state, &session, &form.username, &err.to_string(), true).await
        }
        Err(err) => return Err(err.into()),
    };

    let user = login.user;
    session
        .cycle_id()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let stored = async {
        session.insert(SESSION_USER_ID, user.id).await?;
        session.insert(SESSION_USERNAME, &user.username).await?;
        session.insert(SESSION_IS_ADMIN, user.is_admin).await?;
        session
            .insert(SESSION_AUTH_TIMESTAMP, chrono::Utc::now().timestamp())
            .await
    }
    .await;
    if stored.is_err() {
        return login_error(
            &state,
            &session,
            &form.username,
            "Failed to create session",
            false,
        )
        .await;
    }
    session.set_expiry(Some(Expiry::OnInactivity(time::Duration::minutes(
        login.session_timeout_minutes,
    ))));

    tracing::info!(user_id = user.id, "user logged in");
    Ok(redirect_success(
        "/",
        &format!("Welcome back, {}!", user.username),
    ))
}

pub async fn logout_handler(session: Session) -> Response {
    let _ = session.flush().await;
    redirect_success("/login", "You have been logged out.")
}

pub async fn verify_email_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    match state.accounts.verify_email(&token).await {
        Ok(VerifyOutcome::Verified) => Ok(redirect_success(
            "/login",
            "Email verified successfully! You can now log in.",
        )),
        Ok(VerifyOutcome::AlreadyVerified) => Ok(redirect_success(
            "/login",
            "Your email address is already verified.",
        )),
        Err(AccountError::TokenInvalid) | Err(AccountError::UserNotFound) => Ok(redirect_error(
            "/resend-verification",
            "The verification link is invalid or has expired.",
        )),
        Err(err) => Err(err.into()),
    }
}

fn resend_template(ctx: PageContext) -> EmailFormTemplate {
    EmailFormTemplate {
        ctx,
        title: "Resend verification email".to_string(),
        intro: "Enter the email address you registered with and we will send a new verification link.".to_string(),
        action: "/resend-verification".to_string(),
        button: "Send verification link".to_string(),
    }
}

fn forgot_template(ctx: PageContext) -> EmailFormTemplate {
    EmailFormTemplate {
        ctx,
        title: "Forgot your password?".to_string(),
        intro: "Enter your email address and we will send you a link to reset your password."
            .to_string(),
        action: "/forgot-password".to_string(),
        button: "Send reset link".to_string(),
    }
}

pub async fn resend_verification_page(
    State(state): State<AppState>,
    session: Session,
    Query(flash): Query<FlashQuery>,
) -> Result<Response, AppError> {
    let ctx = PageContext::load(&state, &session, flash).await?;
    Ok(resend_template(ctx).into_response())
}

pub async fn resend_verification_handler(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<EmailForm>,
) -> Result<Response, AppError> {
    if let Err(response) = check_csrf(&session, &form.csrf_token, "/resend-verification").await {
        return Ok(response);
    }

    state.accounts.resend_verification(&form.email).await?;
    Ok(redirect_success(
        "/login",
        "If that account exists and is not yet verified, a new verification email has been sent.",
    ))
}

pub async fn forgot_password_page(
    State(state): State<AppState>,
    session: Session,
    Query(flash): Query<FlashQuery>,
) -> Result<Response, AppError> {
    let ctx = PageContext::load(&state, &session, flash).await?;
    Ok(forgot_template(ctx).into_response())
}

pub async fn forgot_password_handler(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<EmailForm>,
) -> Result<Response, AppError> {
    if let Err(response) = check_csrf(&session, &form.csrf_token, "/forgot-password").await {
        return Ok(response);
    }

    state.accounts.request_password_reset(&form.email).await?;
    Ok(redirect_success(
        "/login",
        "If an account exists with that email, a password reset link has been sent.",
    ))
}

pub async fn reset_password_page(
    State(state): State<AppState>,
    session: Session,
    Path(token): Path<String>,
    Query(flash): Query<FlashQuery>,
) -> Result<Response, AppError> {
    match state.accounts.check_reset_token(&token).await {
        Ok(_) => {}
        Err(AccountError::TokenInvalid) => {
            return Ok(redirect_error(
                "/forgot-password",
                "The password reset link is invalid or has expired.",
            ))
        }
        Err(err) => return Err(err.into()),
    }

    let settings = state.settings.load().await?;
    let ctx = PageContext::load(&state, &session, flash).await?;
    Ok(ResetPasswordTemplate {
        ctx,
        token,
        password_min_length: settings.password_min_length,
    }
    .into_response())
}

pub async fn reset_password_handler(
    State(state): State<AppState>,
    session: Session,
    Path(token): Path<String>,
    Form(form): Form<ResetPasswordForm>,
) -> Result<Response, AppError> {
    let back = format!("/reset-password/{}", token);
    if let Err(response) = check_csrf(&session, &form.csrf_token, &back).await {
        return Ok(response);
    }

    match state
        .accounts
        .reset_password(&token, &form.password, &form.password_confirm)
        .await
    {
        Ok(()) => Ok(redirect_success(
            "/login",
            "Your password has been reset. You can now log in.",
        )),
        Err(err @ (AccountError::PasswordMismatch | AccountError::PolicyDenied(_))) => {
            Ok(redirect_error(&back, &err.to_string()))
        }
        Err(AccountError::TokenInvalid) => Ok(redirect_error(
            "/forgot-password",
            "The password reset link is invalid or has expired.",
        )),
        Err(err) => Err(err.into()),
    }
}
