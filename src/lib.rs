pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;

// Make test_utils available for both unit tests and integration tests
pub mod test_utils;

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::{from_fn, from_fn_with_state, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use config::session::SessionLayer;
use repositories::{SqliteIdeaRepository, SqliteSettingsRepository, SqliteUserRepository};
use services::{
    AccountService, AdminService, EmailComposer, EmailService, IdeaService, SettingsStore,
    TokenSigner, UserService,
};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<SettingsStore>,
    pub accounts: Arc<AccountService>,
    pub users: Arc<UserService>,
    pub ideas: Arc<IdeaService>,
    pub admin: Arc<AdminService>,
    pub pool: sqlx::SqlitePool,
}

impl AppState {
    pub fn new(
        pool: sqlx::SqlitePool,
        config: &config::AppConfig,
        mailer: Arc<dyn EmailService>,
    ) -> Self {
        let user_repository = Arc::new(SqliteUserRepository::new(pool.clone()));
        let settings = Arc::new(SettingsStore::new(Arc::new(
            SqliteSettingsRepository::new(pool.clone()),
        )));
        let signer = Arc::new(TokenSigner::new(config.secret_key.clone()));

        let accounts = Arc::new(AccountService::new(
            user_repository.clone(),
            settings.clone(),
            signer,
            mailer,
            EmailComposer::new(config.base_url.clone()),
        ));
        let users = Arc::new(UserService::new(user_repository));
        let ideas = Arc::new(IdeaService::new(
            Arc::new(SqliteIdeaRepository::new(pool.clone())),
            settings.clone(),
        ));
        let admin = Arc::new(AdminService::new(pool.clone()));

        Self {
            settings,
            accounts,
            users,
            ideas,
            admin,
            pool,
        }
    }
}

pub fn build_router(state: AppState, session_layer: SessionLayer) -> Router {
    use auth::handlers as account;
    use handlers::{admin_handlers as admin, idea_handlers as ideas};

    let guest_routes = Router::new()
        .route(
            "/register",
            get(account::register_page).post(account::register_handler),
        )
        .route("/login", get(account::login_page).post(account::login_handler))
        .layer(from_fn(auth::middleware::redirect_if_authenticated));

    let account_routes = Router::new()
        .route("/logout", get(account::logout_handler))
        .route("/verify-email/{token}", get(account::verify_email_handler))
        .route(
            "/resend-verification",
            get(account::resend_verification_page).post(account::resend_verification_handler),
        )
        .route(
            "/forgot-password",
            get(account::forgot_password_page).post(account::forgot_password_handler),
        )
        .route(
            "/reset-password/{token}",
            get(account::reset_password_page).post(account::reset_password_handler),
        );

    let idea_routes = Router::new()
        .route("/", get(ideas::index))
        .route("/idea/new", get(ideas::new_idea_page).post(ideas::create_idea))
        .route(
            "/idea/{id}/edit",
            get(ideas::edit_idea_page).post(ideas::update_idea),
        )
        .route("/idea/{id}/delete", post(ideas::delete_idea))
        .route("/ideas/export", get(ideas::export_csv))
        .route("/ideas/export.md", get(ideas::export_markdown))
        .route(
            "/ideas/import",
            get(ideas::import_page).post(ideas::import_handler),
        )
        .route("/calendar", get(ideas::calendar))
        .layer(from_fn(auth::middleware::require_auth));

    let admin_routes = Router::new()
        .route("/", get(admin::dashboard))
        .route("/users", get(admin::users))
        .route("/users/{id}/toggle_admin", post(admin::toggle_admin))
        .route("/users/{id}/delete", post(admin::delete_user))
        .route("/ideas", get(admin::ideas))
        .route("/ideas/{id}/delete", post(admin::delete_idea))
        .route("/analytics", get(admin::analytics))
        .route(
            "/settings",
            get(admin::settings_page).post(admin::save_settings),
        )
        .route("/settings/reset", post(admin::reset_settings))
        .route("/api/dashboard/stats", get(admin::api_dashboard_stats))
        .route("/api/charts/user-growth", get(admin::api_user_growth))
        .layer(from_fn_with_state(
            state.clone(),
            auth::middleware::require_admin,
        ));

    Router::new()
        .merge(guest_routes)
        .merge(account_routes)
        .merge(idea_routes)
        .nest("/admin", admin_routes)
        .nest_service("/static", ServeDir::new("static"))
        .layer(from_fn(middleware::csrf_validation_middleware))
        .layer(from_fn(add_security_headers))
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn add_security_headers(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static(
            "default-src 'self'; \
             script-src 'self' 'unsafe-inline'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data:; \
             frame-ancestors 'none';",
        ),
    );
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );

    if config::session::is_production() {
        headers.insert(
            "Strict-Transport-Security",
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }

    response
}
