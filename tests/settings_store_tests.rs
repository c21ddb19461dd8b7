use ideahub::{
    repositories::SqliteSettingsRepository,
    services::{SettingsError, SettingsStore, SiteSettings, DEFAULT_SETTINGS},
    test_utils::test_helpers,
};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;

async fn setup() -> (SqlitePool, SettingsStore) {
    let pool = test_helpers::create_test_db().await.unwrap();
    let store = SettingsStore::new(Arc::new(SqliteSettingsRepository::new(pool.clone())));
    (pool, store)
}

async fn row_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM settings")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_get_returns_default_without_writing() {
    let (pool, store) = setup().await;

    assert_eq!(store.get("site_name", "fallback").await.unwrap(), "fallback");
    assert_eq!(store.get("anything", "").await.unwrap(), "");
    assert_eq!(row_count(&pool).await, 0);
}

#[tokio::test]
async fn test_set_then_get_and_overwrite() {
    let (pool, store) = setup().await;

    store.set("site_name", "Studio").await.unwrap();
    assert_eq!(store.get("site_name", "fallback").await.unwrap(), "Studio");

    store.set("site_name", "").await.unwrap();
    assert_eq!(store.get("site_name", "fallback").await.unwrap(), "");
    assert_eq!(row_count(&pool).await, 1);
}

#[tokio::test]
async fn test_get_or_default_uses_canonical_table() {
    let (_pool, store) = setup().await;

    assert_eq!(
        store.get_or_default("items_per_page").await.unwrap(),
        "20"
    );
    assert!(matches!(
        store.get_or_default("no_such_key").await,
        Err(SettingsError::UnknownKey(_))
    ));
}

#[tokio::test]
async fn test_reset_overwrites_listed_keys_only() {
    let (_pool, store) = setup().await;
    store.set("site_name", "Studio").await.unwrap();
    store.set("custom_key", "kept").await.unwrap();

    store.reset_to_defaults().await.unwrap();

    assert_eq!(
        store.get("site_name", "").await.unwrap(),
        "Content Idea Hub"
    );
    assert_eq!(store.get("custom_key", "").await.unwrap(), "kept");

    let all = store.all().await.unwrap();
    assert_eq!(all.len(), DEFAULT_SETTINGS.len() + 1);
    assert_eq!(all.last().unwrap().key, "custom_key");
}

#[tokio::test]
async fn test_load_decodes_typed_settings() {
    let (_pool, store) = setup().await;
    assert_eq!(store.load().await.unwrap(), SiteSettings::defaults());

    store.set("allow_registration", "").await.unwrap();
    store.set("items_per_page", "5").await.unwrap();
    store.set("session_timeout", "not a number").await.unwrap();
    store.set("max_ideas_per_user", "-3").await.unwrap();

    let settings = store.load().await.unwrap();
    assert!(!settings.allow_registration);
    assert_eq!(settings.items_per_page, 5);
    assert_eq!(settings.session_timeout_minutes, 30);
    assert_eq!(settings.max_ideas_per_user, 100);
}

#[tokio::test]
async fn test_apply_form_clears_unchecked_boxes() {
    let (_pool, store) = setup().await;

    let form: HashMap<String, String> = [
        ("site_name", " New name "),
        ("require_email_verification", "on"),
        ("csrf_token", "ignored"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    store.apply_form(&form).await.unwrap();

    let settings = store.load().await.unwrap();
    assert_eq!(settings.site_name, "New name");
    assert!(settings.require_email_verification);
    assert!(!settings.allow_registration);
    assert!(!settings.admin_alerts);
    assert_eq!(settings.admin_email, "admin@contentideahub.com");
    assert_eq!(store.get("csrf_token", "absent").await.unwrap(), "absent");
}

#[tokio::test]
async fn test_writes_are_visible_to_a_second_store() {
    let (pool, first, _file) = {
        let (pool, file) = test_helpers::create_test_db_file().await.unwrap();
        let store = SettingsStore::new(Arc::new(SqliteSettingsRepository::new(pool.clone())));
        (pool, store, file)
    };
    let second = SettingsStore::new(Arc::new(SqliteSettingsRepository::new(pool)));

    first.set("timezone", "Europe/Paris").await.unwrap();
    assert_eq!(second.get("timezone", "UTC").await.unwrap(), "Europe/Paris");
}
