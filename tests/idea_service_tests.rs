use ideahub::{
    models::IdeaStatus,
    repositories::{SqliteIdeaRepository, SqliteSettingsRepository},
    services::{IdeaError, IdeaFields, IdeaService, SettingsStore},
    test_utils::test_helpers,
};
use sqlx::SqlitePool;
use std::sync::Arc;

async fn setup() -> (SqlitePool, IdeaService, Arc<SettingsStore>, i64) {
    let pool = test_helpers::create_test_db().await.unwrap();
    let settings = Arc::new(SettingsStore::new(Arc::new(SqliteSettingsRepository::new(
        pool.clone(),
    ))));
    let service = IdeaService::new(
        Arc::new(SqliteIdeaRepository::new(pool.clone())),
        settings.clone(),
    );
    let user_id =
        test_helpers::insert_test_user(&pool, "alice", "alice@x.com", "password123", true, false)
            .await
            .unwrap();
    (pool, service, settings, user_id)
}

fn fields(title: &str, tags: &str, status: &str) -> IdeaFields {
    IdeaFields {
        title: title.to_string(),
        description: format!("About {}", title),
        tags: tags.to_string(),
        status: status.to_string(),
    }
}

#[tokio::test]
async fn test_create_normalizes_tags_and_status() {
    let (_pool, service, _settings, user_id) = setup().await;

    let idea = service
        .create(user_id, &fields("  Unboxing ", " Video, FUNNY ,,tech", "to_film"))
        .await
        .unwrap();
    assert_eq!(idea.title, "Unboxing");
    assert_eq!(idea.tags, "video,funny,tech");
    assert_eq!(idea.status, IdeaStatus::ToFilm);
}

#[tokio::test]
async fn test_create_rejects_invalid_fields() {
    let (_pool, service, _settings, user_id) = setup().await;

    let blank = service.create(user_id, &fields("   ", "", "")).await;
    assert!(matches!(blank, Err(IdeaError::InvalidInput(_))));

    let long = service
        .create(user_id, &fields(&"x".repeat(101), "", ""))
        .await;
    assert!(matches!(long, Err(IdeaError::InvalidInput(_))));

    let status = service
        .create(user_id, &fields("Title", "", "someday"))
        .await;
    assert!(matches!(status, Err(IdeaError::InvalidInput(_))));
}

#[tokio::test]
async fn test_quota_follows_settings() {
    let (_pool, service, settings, user_id) = setup().await;
    settings.set("max_ideas_per_user", "2").await.unwrap();

    service.create(user_id, &fields("One", "", "")).await.unwrap();
    service.create(user_id, &fields("Two", "", "")).await.unwrap();
    let third = service.create(user_id, &fields("Three", "", "")).await;
    assert!(matches!(third, Err(IdeaError::PolicyDenied(_))));

    settings.set("max_ideas_per_user", "3").await.unwrap();
    assert!(service.create(user_id, &fields("Three", "", "")).await.is_ok());
}

#[tokio::test]
async fn test_other_users_ideas_are_off_limits() {
    let (pool, service, _settings, alice) = setup().await;
    let bob = test_helpers::insert_test_user(&pool, "bobby", "bob@x.com", "password123", true, false)
        .await
        .unwrap();

    let idea = service.create(alice, &fields("Mine", "", "")).await.unwrap();

    assert!(matches!(
        service.get_owned(bob, idea.id).await,
        Err(IdeaError::Forbidden)
    ));
    assert!(matches!(
        service.update(bob, idea.id, &fields("Stolen", "", "")).await,
        Err(IdeaError::Forbidden)
    ));
    assert!(matches!(
        service.delete(bob, idea.id).await,
        Err(IdeaError::Forbidden)
    ));

    let still_there = service.get_owned(alice, idea.id).await.unwrap();
    assert_eq!(still_there.title, "Mine");

    assert!(matches!(
        service.get_owned(alice, idea.id + 100).await,
        Err(IdeaError::NotFound)
    ));
}

#[tokio::test]
async fn test_update_and_delete_own_idea() {
    let (_pool, service, _settings, user_id) = setup().await;
    let idea = service
        .create(user_id, &fields("Draft", "a", ""))
        .await
        .unwrap();

    service
        .update(user_id, idea.id, &fields("Final", "B, c", "Published"))
        .await
        .unwrap();
    let updated = service.get_owned(user_id, idea.id).await.unwrap();
    assert_eq!(updated.title, "Final");
    assert_eq!(updated.tags, "b,c");
    assert_eq!(updated.status, IdeaStatus::Published);

    service.delete(user_id, idea.id).await.unwrap();
    assert!(matches!(
        service.get_owned(user_id, idea.id).await,
        Err(IdeaError::NotFound)
    ));
}

#[tokio::test]
async fn test_list_filters_by_tags_and_paginates() {
    let (_pool, service, settings, user_id) = setup().await;
    settings.set("items_per_page", "2").await.unwrap();

    for (title, tags) in [
        ("A", "video,tech"),
        ("B", "video"),
        ("C", "tech"),
        ("D", "videos"),
        ("E", "video,tech,fun"),
    ] {
        service
            .create(user_id, &fields(title, tags, ""))
            .await
            .unwrap();
    }

    let all = service.list(user_id, "", 1).await.unwrap();
    assert_eq!(all.total, 5);
    assert_eq!(all.items.len(), 2);
    assert_eq!(all.total_pages(), 3);
    assert!(all.has_next());
    assert!(!all.has_prev());

    let video = service.list(user_id, "Video", 1).await.unwrap();
    assert_eq!(video.total, 3);

    let both = service.list(user_id, "video, tech", 1).await.unwrap();
    assert_eq!(both.total, 2);
    let titles: Vec<&str> = both.items.iter().map(|i| i.title.as_str()).collect();
    assert!(titles.contains(&"A"));
    assert!(titles.contains(&"E"));

    assert_eq!(service.list(user_id, "%", 1).await.unwrap().total, 0);
    assert_eq!(service.list(user_id, "v_deo", 1).await.unwrap().total, 0);

    let before = service.list(user_id, "", 0).await.unwrap();
    assert_eq!(before.page, 1);
}

#[tokio::test]
async fn test_list_page_past_the_end_shows_last_page() {
    let (_pool, service, settings, user_id) = setup().await;
    settings.set("items_per_page", "2").await.unwrap();
    for title in ["A", "B", "C"] {
        service.create(user_id, &fields(title, "", "")).await.unwrap();
    }

    let last = service.list(user_id, "", i64::MAX).await.unwrap();
    assert_eq!(last.page, 2);
    assert_eq!(last.items.len(), 1);
    assert!(last.has_prev());
    assert!(!last.has_next());

    let empty = service.list(user_id, "missing", i64::MAX).await.unwrap();
    assert_eq!(empty.page, 1);
    assert!(empty.items.is_empty());

    settings
        .set("items_per_page", &i64::MAX.to_string())
        .await
        .unwrap();
    let huge = service.list(user_id, "", 2).await.unwrap();
    assert_eq!(huge.page, 1);
    assert_eq!(huge.items.len(), 3);
}

#[tokio::test]
async fn test_csv_export_then_import() {
    let (pool, service, _settings, alice) = setup().await;
    service
        .create(alice, &fields("First, with comma", "a,b", "Draft"))
        .await
        .unwrap();
    service
        .create(alice, &fields("Second \"quoted\"", "", "Published"))
        .await
        .unwrap();

    let csv = service.export_csv(alice).await.unwrap();
    assert!(csv.starts_with("Title,Description,Tags,Status,Date\n"));
    assert!(csv.contains("\"First, with comma\""));

    let bob = test_helpers::insert_test_user(&pool, "bobby", "bob@x.com", "password123", true, false)
        .await
        .unwrap();
    assert_eq!(service.import_csv(bob, &csv).await.unwrap(), 2);

    let imported = service.list(bob, "", 1).await.unwrap();
    assert_eq!(imported.total, 2);
    let second = imported
        .items
        .iter()
        .find(|i| i.title == "Second \"quoted\"")
        .unwrap();
    assert_eq!(second.status, IdeaStatus::Published);
}

#[tokio::test]
async fn test_import_is_lenient_about_optional_columns() {
    let (_pool, service, _settings, user_id) = setup().await;

    let data = "title,status\nOnly title,\nBad status,someday\n,Draft\n";
    assert_eq!(service.import_csv(user_id, data).await.unwrap(), 2);

    let page = service.list(user_id, "", 1).await.unwrap();
    assert!(page.items.iter().all(|i| i.status == IdeaStatus::Draft));
}

#[tokio::test]
async fn test_import_rejects_without_writing() {
    let (_pool, service, settings, user_id) = setup().await;

    let missing_title = service.import_csv(user_id, "Name,Tags\nx,y\n").await;
    assert!(matches!(missing_title, Err(IdeaError::InvalidInput(_))));

    let too_long = format!("Title\nok\n{}\n", "x".repeat(101));
    match service.import_csv(user_id, &too_long).await {
        Err(IdeaError::InvalidInput(msg)) => assert!(msg.starts_with("Row 3:")),
        other => panic!("expected row error, got {:?}", other.map(|_| ())),
    }

    settings.set("max_ideas_per_user", "1").await.unwrap();
    let over_quota = service.import_csv(user_id, "Title\none\ntwo\n").await;
    assert!(matches!(over_quota, Err(IdeaError::PolicyDenied(_))));

    assert_eq!(service.list(user_id, "", 1).await.unwrap().total, 0);
}

#[tokio::test]
async fn test_markdown_export_and_calendar() {
    let (pool, service, _settings, user_id) = setup().await;
    service
        .create(user_id, &fields("Today", "video", "To Film"))
        .await
        .unwrap();
    let old = test_helpers::insert_test_idea(&pool, user_id, "Earlier", "", "Draft")
        .await
        .unwrap();
    sqlx::query("UPDATE ideas SET created_at = '2024-03-05T10:00:00Z' WHERE id = ?")
        .bind(old)
        .execute(&pool)
        .await
        .unwrap();

    let markdown = service.export_markdown(user_id).await.unwrap();
    assert!(markdown.starts_with("# Content Ideas\n"));
    assert!(markdown.contains("## Today"));
    assert!(markdown.contains("- **Status:** To Film"));
    assert!(markdown.contains("- **Tags:** video"));
    assert!(markdown.find("## Earlier") < markdown.find("## Today"));

    let days = service.calendar(user_id).await.unwrap();
    assert_eq!(days.len(), 2);
    assert_eq!(days[0].date, "2024-03-05");
    assert_eq!(days[0].ideas[0].title, "Earlier");
    assert_eq!(days[1].ideas[0].title, "Today");
}

#[tokio::test]
async fn test_admin_listing_and_delete() {
    let (pool, service, _settings, alice) = setup().await;
    let bob = test_helpers::insert_test_user(&pool, "bobby", "bob@x.com", "password123", true, false)
        .await
        .unwrap();
    service
        .create(alice, &fields("Alice video", "", "Published"))
        .await
        .unwrap();
    let bobs = service
        .create(bob, &fields("Bob video", "", "Draft"))
        .await
        .unwrap();

    let everything = service.list_all_users(None, None, 1).await.unwrap();
    assert_eq!(everything.total, 2);

    let published = service
        .list_all_users(Some(IdeaStatus::Published), None, 1)
        .await
        .unwrap();
    assert_eq!(published.total, 1);
    assert_eq!(published.items[0].title, "Alice video");

    let search = service
        .list_all_users(None, Some("bob"), 1)
        .await
        .unwrap();
    assert_eq!(search.total, 1);

    service.admin_delete(bobs.id).await.unwrap();
    assert!(matches!(
        service.admin_delete(bobs.id).await,
        Err(IdeaError::NotFound)
    ));
}
