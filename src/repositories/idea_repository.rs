use super::{escape_like, RepositoryError, RepositoryResult};
use crate::models::{format_timestamp, Idea, IdeaInput, IdeaStatus};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

const IDEA_COLUMNS: &str = "id, user_id, title, description, tags, status, created_at";

/// Conjunctive filter over the ideas table. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct IdeaFilter {
    pub user_id: Option<i64>,
    /// Whole-tag matches; every tag listed must be present.
    pub tags: Vec<String>,
    pub status: Option<IdeaStatus>,
    pub title_search: Option<String>,
}

impl IdeaFilter {
    pub fn for_user(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        if let Some(user_id) = self.user_id {
            qb.push(" AND user_id = ").push_bind(user_id);
        }
        for tag in &self.tags {
            qb.push(" AND (',' || tags || ',') LIKE ")
                .push_bind(format!("%,{},%", escape_like(tag)))
                .push(" ESCAPE '\\'");
        }
        if let Some(status) = self.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(search) = self.title_search.as_deref().map(str::trim) {
            if !search.is_empty() {
                qb.push(" AND title LIKE ")
                    .push_bind(format!("%{}%", escape_like(search)))
                    .push(" ESCAPE '\\'");
            }
        }
    }
}

#[async_trait]
pub trait IdeaRepository: Send + Sync {
    async fn insert(&self, user_id: i64, input: &IdeaInput) -> RepositoryResult<Idea>;
    /// Inserts every row in one transaction; nothing is written if any insert fails.
    async fn insert_many(&self, user_id: i64, inputs: &[IdeaInput]) -> RepositoryResult<usize>;
    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Idea>>;
    async fn update(&self, id: i64, input: &IdeaInput) -> RepositoryResult<()>;
    async fn delete(&self, id: i64) -> RepositoryResult<()>;
    async fn count(&self, filter: &IdeaFilter) -> RepositoryResult<i64>;
    /// Newest first.
    async fn list(&self, filter: &IdeaFilter, limit: i64, offset: i64)
        -> RepositoryResult<Vec<Idea>>;
    async fn list_all(&self, filter: &IdeaFilter) -> RepositoryResult<Vec<Idea>>;
}

pub struct SqliteIdeaRepository {
    pool: SqlitePool,
}

impl SqliteIdeaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn select(filter: &IdeaFilter) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new(format!("SELECT {} FROM ideas", IDEA_COLUMNS));
        filter.push_where(&mut qb);
        qb.push(" ORDER BY created_at DESC, id DESC");
        qb
    }
}

#[async_trait]
impl IdeaRepository for SqliteIdeaRepository {
    async fn insert(&self, user_id: i64, input: &IdeaInput) -> RepositoryResult<Idea> {
        let created_at = format_timestamp(Utc::now());
        let result = sqlx::query(
            r#"
            INSERT INTO ideas (user_id, title, description, tags, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.tags)
        .bind(input.status.as_str())
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        self.find_by_id(result.last_insert_rowid())
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn insert_many(&self, user_id: i64, inputs: &[IdeaInput]) -> RepositoryResult<usize> {
        let created_at = format_timestamp(Utc::now());
        let mut tx = self.pool.begin().await?;

        for input in inputs {
            sqlx::query(
                r#"
                INSERT INTO ideas (user_id, title, description, tags, status, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(user_id)
            .bind(&input.title)
            .bind(&input.description)
            .bind(&input.tags)
            .bind(input.status.as_str())
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(inputs.len())
    }

    async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Idea>> {
        let sql = format!("SELECT {} FROM ideas WHERE id = ?", IDEA_COLUMNS);
        let idea = sqlx::query_as::<_, Idea>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(idea)
    }

    async fn update(&self, id: i64, input: &IdeaInput) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE ideas SET title = ?, description = ?, tags = ?, status = ? WHERE id = ?",
        )
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.tags)
        .bind(input.status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM ideas WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn count(&self, filter: &IdeaFilter) -> RepositoryResult<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM ideas");
        filter.push_where(&mut qb);
        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn list(
        &self,
        filter: &IdeaFilter,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Idea>> {
        let mut qb = Self::select(filter);
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);
        let ideas = qb.build_query_as::<Idea>().fetch_all(&self.pool).await?;
        Ok(ideas)
    }

    async fn list_all(&self, filter: &IdeaFilter) -> RepositoryResult<Vec<Idea>> {
        let mut qb = Self::select(filter);
        let ideas = qb.build_query_as::<Idea>().fetch_all(&self.pool).await?;
        Ok(ideas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_pool, test_helpers::insert_test_user};

    fn input(title: &str, tags: &str, status: IdeaStatus) -> IdeaInput {
        IdeaInput {
            title: title.to_string(),
            description: String::new(),
            tags: tags.to_string(),
            status,
        }
    }

    #[tokio::test]
    async fn test_idea_crud() {
        let pool = create_test_pool().await;
        let repo = SqliteIdeaRepository::new(pool.clone());
        let user_id = insert_test_user(&pool, "alice", "alice@example.com", "password123", true, false)
            .await
            .unwrap();

        let idea = repo
            .insert(user_id, &input("First", "video,tech", IdeaStatus::Draft))
            .await
            .unwrap();
        assert_eq!(idea.user_id, user_id);
        assert_eq!(idea.status, IdeaStatus::Draft);

        repo.update(idea.id, &input("Renamed", "video", IdeaStatus::ToFilm))
            .await
            .unwrap();
        let stored = repo.find_by_id(idea.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.status, IdeaStatus::ToFilm);

        repo.delete(idea.id).await.unwrap();
        assert!(repo.find_by_id(idea.id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete(idea.id).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_tag_filter_matches_whole_tags() {
        let pool = create_test_pool().await;
        let repo = SqliteIdeaRepository::new(pool.clone());
        let user_id = insert_test_user(&pool, "alice", "alice@example.com", "password123", true, false)
            .await
            .unwrap();

        repo.insert(user_id, &input("A", "video,tech", IdeaStatus::Draft))
            .await
            .unwrap();
        repo.insert(user_id, &input("B", "videos", IdeaStatus::Draft))
            .await
            .unwrap();
        repo.insert(user_id, &input("C", "tech", IdeaStatus::Published))
            .await
            .unwrap();

        let filter = IdeaFilter {
            tags: vec!["video".to_string()],
            ..IdeaFilter::for_user(user_id)
        };
        let ideas = repo.list_all(&filter).await.unwrap();
        assert_eq!(ideas.len(), 1);
        assert_eq!(ideas[0].title, "A");

        let filter = IdeaFilter {
            tags: vec!["video".to_string(), "tech".to_string()],
            ..IdeaFilter::for_user(user_id)
        };
        assert_eq!(repo.count(&filter).await.unwrap(), 1);

        let filter = IdeaFilter {
            status: Some(IdeaStatus::Published),
            ..IdeaFilter::default()
        };
        assert_eq!(repo.count(&filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_wildcards_in_filters_match_literally() {
        let pool = create_test_pool().await;
        let repo = SqliteIdeaRepository::new(pool.clone());
        let user_id = insert_test_user(&pool, "alice", "alice@example.com", "password123", true, false)
            .await
            .unwrap();

        repo.insert(user_id, &input("Video plan", "video", IdeaStatus::Draft))
            .await
            .unwrap();
        repo.insert(user_id, &input("100% done", "50%_off", IdeaStatus::Draft))
            .await
            .unwrap();

        let tag = |t: &str| IdeaFilter {
            tags: vec![t.to_string()],
            ..IdeaFilter::for_user(user_id)
        };
        assert_eq!(repo.count(&tag("%")).await.unwrap(), 0);
        assert_eq!(repo.count(&tag("v_deo")).await.unwrap(), 0);
        assert_eq!(repo.count(&tag("50%_off")).await.unwrap(), 1);

        let title = |t: &str| IdeaFilter {
            title_search: Some(t.to_string()),
            ..IdeaFilter::default()
        };
        assert_eq!(repo.count(&title("_")).await.unwrap(), 0);
        assert_eq!(repo.count(&title("%")).await.unwrap(), 1);
        assert_eq!(repo.count(&title("vid")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_pages_newest_first() {
        let pool = create_test_pool().await;
        let repo = SqliteIdeaRepository::new(pool.clone());
        let user_id = insert_test_user(&pool, "alice", "alice@example.com", "password123", true, false)
            .await
            .unwrap();

        let inputs: Vec<IdeaInput> = (1..=5)
            .map(|i| input(&format!("Idea {}", i), "", IdeaStatus::Draft))
            .collect();
        assert_eq!(repo.insert_many(user_id, &inputs).await.unwrap(), 5);

        let filter = IdeaFilter::for_user(user_id);
        let first = repo.list(&filter, 2, 0).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].title, "Idea 5");
        let last = repo.list(&filter, 2, 4).await.unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].title, "Idea 1");
    }
}
