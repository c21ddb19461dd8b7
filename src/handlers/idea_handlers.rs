use crate::auth::middleware::session_user_id;
use crate::error::AppError;
use crate::handlers::{
    check_csrf, redirect_error, redirect_success, CsrfForm, FlashQuery, PageContext,
    INVALID_CSRF_MESSAGE,
};
use crate::middleware::csrf::validate_csrf_form_field;
use crate::models::{Idea, IdeaStatus, Page};
use crate::services::idea_service::CalendarDay;
use crate::services::{IdeaError, IdeaFields};
use crate::AppState;
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Form, Path, Query, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

#[derive(Template, WebTemplate)]
#[template(path = "ideas/index.html")]
struct IndexTemplate {
    ctx: PageContext,
    page: Page<Idea>,
    tags: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "ideas/form.html")]
struct IdeaFormTemplate {
    ctx: PageContext,
    /// `None` when creating.
    idea_id: Option<i64>,
    fields: IdeaFields,
    statuses: [IdeaStatus; 3],
}

#[derive(Template, WebTemplate)]
#[template(path = "ideas/import.html")]
struct ImportTemplate {
    ctx: PageContext,
    csv_data: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "ideas/calendar.html")]
struct CalendarTemplate {
    ctx: PageContext,
    days: Vec<CalendarDay>,
}

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    #[serde(default)]
    tags: String,
    page: Option<i64>,
    success: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
pub struct IdeaForm {
    #[serde(flatten)]
    fields: IdeaFields,
    csrf_token: String,
}

#[derive(Deserialize)]
pub struct ImportForm {
    csv_data: String,
    csrf_token: String,
}

async fn current_user(session: &Session) -> Result<i64, Response> {
    session_user_id(session)
        .await
        .ok_or_else(|| Redirect::to("/login").into_response())
}

fn fields_of(idea: &Idea) -> IdeaFields {
    IdeaFields {
        title: idea.title.clone(),
        description: idea.description.clone(),
        tags: idea.tags.clone(),
        status: idea.status.as_str().to_string(),
    }
}

pub async fn index(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<IndexQuery>,
) -> Result<Response, AppError> {
    let user_id = match current_user(&session).await {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    let page = state
        .ideas
        .list(user_id, &query.tags, query.page.unwrap_or(1))
        .await?;
    let flash = FlashQuery {
        success: query.success,
        error: query.error,
    };
    let ctx = PageContext::load(&state, &session, flash).await?;

    Ok(IndexTemplate {
        ctx,
        page,
        tags: query.tags,
    }
    .into_response())
}

async fn render_form(
    state: &AppState,
    session: &Session,
    idea_id: Option<i64>,
    fields: IdeaFields,
    error: Option<String>,
) -> Result<Response, AppError> {
    let mut ctx = PageContext::load(state, session, FlashQuery::default()).await?;
    if let Some(message) = error {
        ctx = ctx.with_error(message);
    }
    Ok(IdeaFormTemplate {
        ctx,
        idea_id,
        fields,
        statuses: IdeaStatus::ALL,
    }
    .into_response())
}

pub async fn new_idea_page(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let fields = IdeaFields {
        status: IdeaStatus::Draft.as_str().to_string(),
        ..IdeaFields::default()
    };
    render_form(&state, &session, None, fields, None).await
}

pub async fn create_idea(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<IdeaForm>,
) -> Result<Response, AppError> {
    let user_id = match current_user(&session).await {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };
    if validate_csrf_form_field(&session, &form.csrf_token)
        .await
        .is_err()
    {
        return render_form(
            &state,
            &session,
            None,
            form.fields,
            Some(INVALID_CSRF_MESSAGE.to_string()),
        )
        .await;
    }

    match state.ideas.create(user_id, &form.fields).await {
        Ok(_) => Ok(redirect_success("/", "Idea added!")),
        Err(err @ (IdeaError::InvalidInput(_) | IdeaError::PolicyDenied(_))) => {
            render_form(&state, &session, None, form.fields, Some(err.to_string())).await
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn edit_idea_page(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let user_id = match current_user(&session).await {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    match state.ideas.get_owned(user_id, id).await {
        Ok(idea) => render_form(&state, &session, Some(idea.id), fields_of(&idea), None).await,
        Err(IdeaError::Forbidden) => Ok(redirect_error("/", "Not authorized")),
        Err(err) => Err(err.into()),
    }
}

pub async fn update_idea(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
    Form(form): Form<IdeaForm>,
) -> Result<Response, AppError> {
    let user_id = match current_user(&session).await {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };
    if validate_csrf_form_field(&session, &form.csrf_token)
        .await
        .is_err()
    {
        return render_form(
            &state,
            &session,
            Some(id),
            form.fields,
            Some(INVALID_CSRF_MESSAGE.to_string()),
        )
        .await;
    }

    match state.ideas.update(user_id, id, &form.fields).await {
        Ok(()) => Ok(redirect_success("/", "Idea updated!")),
        Err(IdeaError::Forbidden) => Ok(redirect_error("/", "Not authorized")),
        Err(err @ IdeaError::InvalidInput(_)) => {
            render_form(&state, &session, Some(id), form.fields, Some(err.to_string())).await
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn delete_idea(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
    Form(form): Form<CsrfForm>,
) -> Result<Response, AppError> {
    let user_id = match current_user(&session).await {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };
    if let Err(response) = check_csrf(&session, &form.csrf_token, "/").await {
        return Ok(response);
    }

    match state.ideas.delete(user_id, id).await {
        Ok(()) => Ok(redirect_success("/", "Idea deleted!")),
        Err(IdeaError::Forbidden) => Ok(redirect_error("/", "Not authorized")),
        Err(err) => Err(err.into()),
    }
}

pub async fn export_csv(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let user_id = match current_user(&session).await {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    let body = state.ideas.export_csv(user_id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=ideas.csv",
            ),
        ],
        body,
    )
        .into_response())
}

pub async fn export_markdown(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let user_id = match current_user(&session).await {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    let body = state.ideas.export_markdown(user_id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=ideas.md"),
        ],
        body,
    )
        .into_response())
}

pub async fn import_page(
    State(state): State<AppState>,
    session: Session,
    Query(flash): Query<FlashQuery>,
) -> Result<Response, AppError> {
    let ctx = PageContext::load(&state, &session, flash).await?;
    Ok(ImportTemplate {
        ctx,
        csv_data: String::new(),
    }
    .into_response())
}

pub async fn import_handler(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<ImportForm>,
) -> Result<Response, AppError> {
    let user_id = match current_user(&session).await {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };
    if let Err(response) = check_csrf(&session, &form.csrf_token, "/ideas/import").await {
        return Ok(response);
    }

    match state.ideas.import_csv(user_id, &form.csv_data).await {
        Ok(0) => Ok(redirect_error("/ideas/import", "No ideas found in the CSV data")),
        Ok(count) => Ok(redirect_success(
            "/",
            &format!("{} ideas imported successfully!", count),
        )),
        Err(err @ (IdeaError::InvalidInput(_) | IdeaError::PolicyDenied(_) | IdeaError::Csv(_))) => {
            let ctx = PageContext::load(&state, &session, FlashQuery::default())
                .await?
                .with_error(err.to_string());
            Ok(ImportTemplate {
                ctx,
                csv_data: form.csv_data,
            }
            .into_response())
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn calendar(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let user_id = match current_user(&session).await {
        Ok(id) => id,
        Err(response) => return Ok(response),
    };

    let days = state.ideas.calendar(user_id).await?;
    let ctx = PageContext::load(&state, &session, FlashQuery::default()).await?;
    Ok(CalendarTemplate { ctx, days }.into_response())
}
