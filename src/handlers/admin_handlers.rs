use crate::auth::middleware::session_user_id;
use crate::error::AppError;
use crate::handlers::{check_csrf, redirect_error, redirect_success, CsrfForm, FlashQuery, PageContext};
use crate::middleware::CSRF_FORM_FIELD;
use crate::models::{Idea, IdeaStatus, Page, UserSummary};
use crate::services::admin_service::{
    Analytics, ApiStats, DailyCount, DashboardStats, IdeaStats, UserStats, WEEKDAY_NAMES,
};
use crate::services::{AdminError, IdeaError, SiteSettings};
use crate::AppState;
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Form, Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use tower_sessions::Session;

#[derive(Template, WebTemplate)]
#[template(path = "admin/dashboard.html")]
struct DashboardTemplate {
    ctx: PageContext,
    stats: DashboardStats,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/users.html")]
struct UsersTemplate {
    ctx: PageContext,
    page: Page<UserSummary>,
    search: String,
    stats: UserStats,
    current_user_id: i64,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/ideas.html")]
struct IdeasTemplate {
    ctx: PageContext,
    page: Page<Idea>,
    search: String,
    status_filter: String,
    statuses: [IdeaStatus; 3],
    stats: IdeaStats,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/analytics.html")]
struct AnalyticsTemplate {
    ctx: PageContext,
    analytics: Analytics,
    weekdays: Vec<(&'static str, i64)>,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/settings.html")]
struct SettingsTemplate {
    ctx: PageContext,
    settings: SiteSettings,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    page: Option<i64>,
    #[serde(default)]
    search: String,
    #[serde(default)]
    status: String,
    success: Option<String>,
    error: Option<String>,
}

impl ListQuery {
    fn flash(&self) -> FlashQuery {
        FlashQuery {
            success: self.success.clone(),
            error: self.error.clone(),
        }
    }
}

async fn acting_user(session: &Session) -> Result<i64, Response> {
    session_user_id(session)
        .await
        .ok_or_else(|| Redirect::to("/login").into_response())
}

pub async fn dashboard(
    State(state): State<AppState>,
    session: Session,
    Query(flash): Query<FlashQuery>,
) -> Result<Response, AppError> {
    let stats = state.admin.dashboard().await?;
    let ctx = PageContext::load(&state, &session, flash).await?;
    Ok(DashboardTemplate { ctx, stats }.into_response())
}

pub async fn users(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    let current_user_id = match acting_user(&session).await {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    let page = state
        .users
        .list_users(Some(&query.search), query.page.unwrap_or(1))
        .await?;
    let stats = state.admin.user_stats().await?;
    let ctx = PageContext::load(&state, &session, query.flash()).await?;

    Ok(UsersTemplate {
        ctx,
        page,
        search: query.search,
        stats,
        current_user_id,
    }
    .into_response())
}

pub async fn toggle_admin(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
    Form(form): Form<CsrfForm>,
) -> Result<Response, AppError> {
    let acting_id = match acting_user(&session).await {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };
    if let Err(response) = check_csrf(&session, &form.csrf_token, "/admin/users").await {
        return Ok(response);
    }

    match state.users.toggle_admin(acting_id, id).await {
        Ok(is_admin) => {
            let username = state
                .users
                .find_by_id(id)
                .await?
                .map(|u| u.username)
                .unwrap_or_default();
            let verb = if is_admin { "granted" } else { "revoked" };
            Ok(redirect_success(
                "/admin/users",
                &format!("Admin privileges {} for {}", verb, username),
            ))
        }
        Err(err @ (AdminError::Forbidden(_) | AdminError::NotFound)) => {
            Ok(redirect_error("/admin/users", &err.to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn delete_user(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
    Form(form): Form<CsrfForm>,
) -> Result<Response, AppError> {
    let acting_id = match acting_user(&session).await {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };
    if let Err(response) = check_csrf(&session, &form.csrf_token, "/admin/users").await {
        return Ok(response);
    }

    match state.users.delete_user(acting_id, id).await {
        Ok(user) => Ok(redirect_success(
            "/admin/users",
            &format!("User {} deleted successfully", user.username),
        )),
        Err(err @ (AdminError::Forbidden(_) | AdminError::NotFound)) => {
            Ok(redirect_error("/admin/users", &err.to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn ideas(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    let status = IdeaStatus::parse(&query.status);
    let page = state
        .ideas
        .list_all_users(status, Some(&query.search), query.page.unwrap_or(1))
        .await?;
    let stats = state.admin.idea_stats().await?;
    let ctx = PageContext::load(&state, &session, query.flash()).await?;

    Ok(IdeasTemplate {
        ctx,
        page,
        search: query.search,
        status_filter: status.map(|s| s.as_str().to_string()).unwrap_or_default(),
        statuses: IdeaStatus::ALL,
        stats,
    }
    .into_response())
}

pub async fn delete_idea(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
    Form(form): Form<CsrfForm>,
) -> Result<Response, AppError> {
    if let Err(response) = check_csrf(&session, &form.csrf_token, "/admin/ideas").await {
        return Ok(response);
    }

    match state.ideas.admin_delete(id).await {
        Ok(()) => Ok(redirect_success("/admin/ideas", "Idea deleted successfully")),
        Err(IdeaError::NotFound) => Ok(redirect_error("/admin/ideas", "Idea not found")),
        Err(err) => Err(err.into()),
    }
}

pub async fn analytics(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let analytics = state.admin.analytics().await?;
    let weekdays = WEEKDAY_NAMES
        .iter()
        .copied()
        .zip(analytics.weekday_activity.iter().copied())
        .collect();
    let ctx = PageContext::load(&state, &session, FlashQuery::default()).await?;
    Ok(AnalyticsTemplate {
        ctx,
        analytics,
        weekdays,
    }
    .into_response())
}

pub async fn settings_page(
    State(state): State<AppState>,
    session: Session,
    Query(flash): Query<FlashQuery>,
) -> Result<Response, AppError> {
    let settings = state.settings.load().await?;
    let ctx = PageContext::load(&state, &session, flash).await?;
    Ok(SettingsTemplate { ctx, settings }.into_response())
}

pub async fn save_settings(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let token = form.get(CSRF_FORM_FIELD).map(String::as_str).unwrap_or("");
    if let Err(response) = check_csrf(&session, token, "/admin/settings").await {
        return Ok(response);
    }

    state.settings.apply_form(&form).await?;
    tracing::info!("site settings updated from admin form");
    Ok(redirect_success("/admin/settings", "Settings saved successfully"))
}

pub async fn reset_settings(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CsrfForm>,
) -> Result<Response, AppError> {
    if let Err(response) = check_csrf(&session, &form.csrf_token, "/admin/settings").await {
        return Ok(response);
    }

    state.settings.reset_to_defaults().await?;
    Ok(redirect_success(
        "/admin/settings",
        "Settings restored to their defaults",
    ))
}

pub async fn api_dashboard_stats(State(state): State<AppState>) -> Result<Json<ApiStats>, AppError> {
    Ok(Json(state.admin.api_stats().await?))
}

pub async fn api_user_growth(
    State(state): State<AppState>,
) -> Result<Json<Vec<DailyCount>>, AppError> {
    Ok(Json(state.admin.user_growth().await?))
}
