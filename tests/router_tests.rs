use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use ideahub::test_utils::test_helpers::{self, RecordingEmailService};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::ServiceExt;

async fn app() -> (SqlitePool, Router) {
    let pool = test_helpers::create_test_db().await.unwrap();
    let router = test_helpers::test_router(pool.clone(), Arc::new(RecordingEmailService::new()))
        .await
        .unwrap();
    (pool, router)
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_form(uri: &str, cookie: Option<&str>, body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default()
}

/// `name=value` of the session cookie set by `response`, if any.
fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("ideahub_session="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn csrf_token(html: &str) -> String {
    let marker = r#"name="csrf_token" value=""#;
    let start = html.find(marker).expect("a csrf field in the page") + marker.len();
    html[start..].split('"').next().unwrap().to_string()
}

/// Logs `username` in and returns the session cookie and CSRF token.
async fn login(router: &Router, username: &str, password: &str) -> (String, String) {
    let page = router.clone().oneshot(get("/login", None)).await.unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    let cookie = session_cookie(&page).expect("a session cookie on the login page");
    let token = csrf_token(&body_text(page).await);

    let response = router
        .clone()
        .oneshot(post_form(
            "/login",
            Some(&cookie),
            format!(
                "username={}&password={}&csrf_token={}",
                username, password, token
            ),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/?success="));
    let cookie = session_cookie(&response).unwrap_or(cookie);
    (cookie, token)
}

#[tokio::test]
async fn test_protected_pages_redirect_to_login() {
    let (_pool, router) = app().await;

    for uri in ["/", "/idea/new", "/calendar", "/ideas/export", "/admin", "/admin/users"] {
        let response = router.clone().oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", uri);
        assert_eq!(location(&response), "/login", "{}", uri);
    }
}

#[tokio::test]
async fn test_public_pages_render_with_security_headers() {
    let (_pool, router) = app().await;

    for uri in ["/login", "/register", "/forgot-password", "/resend-verification"] {
        let response = router.clone().oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        assert_eq!(response.headers()["X-Frame-Options"], "DENY");
        assert_eq!(response.headers()["X-Content-Type-Options"], "nosniff");
        let html = body_text(response).await;
        assert!(!csrf_token(&html).is_empty(), "{}", uri);
    }
}

#[tokio::test]
async fn test_login_without_matching_token_is_rejected() {
    let (pool, router) = app().await;
    test_helpers::insert_test_user(&pool, "alice", "alice@x.com", "password123", true, false)
        .await
        .unwrap();

    let response = router
        .clone()
        .oneshot(post_form(
            "/login",
            None,
            "username=alice&password=password123&csrf_token=forged".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Invalid security token"));
}

#[tokio::test]
async fn test_login_with_wrong_password_shows_error() {
    let (pool, router) = app().await;
    test_helpers::insert_test_user(&pool, "alice", "alice@x.com", "password123", true, false)
        .await
        .unwrap();

    let page = router.clone().oneshot(get("/login", None)).await.unwrap();
    let cookie = session_cookie(&page).unwrap();
    let token = csrf_token(&body_text(page).await);

    let response = router
        .clone()
        .oneshot(post_form(
            "/login",
            Some(&cookie),
            format!("username=alice&password=nope&csrf_token={}", token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response)
        .await
        .contains("Invalid username or password"));
}

#[tokio::test]
async fn test_logged_in_user_manages_ideas_but_not_admin() {
    let (pool, router) = app().await;
    test_helpers::insert_test_user(&pool, "alice", "alice@x.com", "password123", true, false)
        .await
        .unwrap();
    let (cookie, token) = login(&router, "alice", "password123").await;

    let index = router
        .clone()
        .oneshot(get("/", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(index.status(), StatusCode::OK);

    let guest_only = router
        .clone()
        .oneshot(get("/login", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(location(&guest_only), "/");

    let created = router
        .clone()
        .oneshot(post_form(
            "/idea/new",
            Some(&cookie),
            format!(
                "title=Studio+tour&description=&tags=Video%2C+Tech&status=Draft&csrf_token={}",
                token
            ),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::SEE_OTHER);
    assert!(location(&created).starts_with("/?success="));

    let tags: String = sqlx::query_scalar("SELECT tags FROM ideas")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(tags, "video,tech");

    let export = router
        .clone()
        .oneshot(get("/ideas/export", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(export.status(), StatusCode::OK);
    assert!(body_text(export).await.contains("Studio tour"));

    let admin = router
        .clone()
        .oneshot(get("/admin", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(admin.status(), StatusCode::SEE_OTHER);
    assert!(location(&admin).starts_with("/?error="));
}

#[tokio::test]
async fn test_admin_pages_render_for_admins() {
    let (pool, router) = app().await;
    test_helpers::insert_test_user(&pool, "root", "root@x.com", "password123", true, true)
        .await
        .unwrap();
    let (cookie, _token) = login(&router, "root", "password123").await;

    for uri in [
        "/admin",
        "/admin/users",
        "/admin/ideas",
        "/admin/analytics",
        "/admin/settings",
        "/admin/api/dashboard/stats",
        "/admin/api/charts/user-growth",
    ] {
        let response = router
            .clone()
            .oneshot(get(uri, Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
    }
}

#[tokio::test]
async fn test_admin_cannot_delete_self_over_http() {
    let (pool, router) = app().await;
    let root = test_helpers::insert_test_user(&pool, "root", "root@x.com", "password123", true, true)
        .await
        .unwrap();
    let (cookie, token) = login(&router, "root", "password123").await;

    let response = router
        .clone()
        .oneshot(post_form(
            &format!("/admin/users/{}/delete", root),
            Some(&cookie),
            format!("csrf_token={}", token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("/admin/users?error="));

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 1);
}

#[tokio::test]
async fn test_settings_form_requires_token() {
    let (pool, router) = app().await;
    test_helpers::insert_test_user(&pool, "root", "root@x.com", "password123", true, true)
        .await
        .unwrap();
    let (cookie, token) = login(&router, "root", "password123").await;

    let forged = router
        .clone()
        .oneshot(post_form(
            "/admin/settings",
            Some(&cookie),
            "site_name=Hacked&csrf_token=forged".to_string(),
        ))
        .await
        .unwrap();
    assert!(location(&forged).starts_with("/admin/settings?error="));

    let saved = router
        .clone()
        .oneshot(post_form(
            "/admin/settings",
            Some(&cookie),
            format!("site_name=Studio&csrf_token={}", token),
        ))
        .await
        .unwrap();
    assert!(location(&saved).starts_with("/admin/settings?success="));

    let name: String = sqlx::query_scalar("SELECT value FROM settings WHERE key = 'site_name'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(name, "Studio");
}

#[tokio::test]
async fn test_mismatched_csrf_header_is_forbidden() {
    let (pool, router) = app().await;
    test_helpers::insert_test_user(&pool, "alice", "alice@x.com", "password123", true, false)
        .await
        .unwrap();
    let (cookie, _token) = login(&router, "alice", "password123").await;

    let request = Request::builder()
        .method("POST")
        .uri("/idea/new")
        .header(header::COOKIE, &cookie)
        .header("X-CSRF-Token", "wrong")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("title=x&csrf_token=wrong"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
