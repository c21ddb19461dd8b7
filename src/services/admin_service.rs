use crate::models::{format_timestamp, parse_timestamp, Idea, IdeaStatus, User};
use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;

const USER_COLUMNS: &str = "id, username, email, password_hash, is_admin, email_verified, \
     email_verification_token, password_reset_token, password_reset_expires, created_at, last_seen";

/// Read-only aggregate queries behind the admin pages.
#[derive(Clone, Debug)]
pub struct AdminService {
    pool: SqlitePool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug)]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_ideas: i64,
    /// Users created in the last 30 days.
    pub active_users: i64,
    /// Published share of all ideas, percent, one decimal.
    pub engagement_rate: f64,
    /// Sign-ups in the last 30 days against the 30 before, percent, one decimal.
    pub user_growth: f64,
    pub ideas_by_status: Vec<StatusCount>,
    pub recent_users: Vec<User>,
    pub recent_ideas: Vec<Idea>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MonthCount {
    /// e.g. `Mar 2025`
    pub month: String,
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

#[derive(Debug)]
pub struct Analytics {
    pub total_users: i64,
    pub total_ideas: i64,
    pub published_ideas: i64,
    pub active_users: i64,
    pub monthly_signups: Vec<MonthCount>,
    pub top_tags: Vec<TagCount>,
    /// Index 0 is Monday.
    pub weekday_activity: [i64; 7],
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecentActivity {
    #[serde(rename = "type")]
    pub kind: String,
    pub user: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiStats {
    pub total_users: i64,
    pub total_ideas: i64,
    /// Users seen in the last 24 hours.
    pub active_users: i64,
    pub recent_activity: Vec<RecentActivity>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UserStats {
    pub total: i64,
    /// Created in the last 30 days.
    pub active: i64,
    pub admins: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IdeaStats {
    pub total: i64,
    pub draft: i64,
    pub to_film: i64,
    pub published: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

pub const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Percentage of `part` in `whole`, 0 when `whole` is 0.
pub fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    round1(part as f64 / whole as f64 * 100.0)
}

/// Relative change from `previous` to `current`, 0 when there is no baseline.
pub fn growth(current: i64, previous: i64) -> f64 {
    if previous <= 0 {
        return 0.0;
    }
    round1((current - previous) as f64 / previous as f64 * 100.0)
}

fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

/// First instant of the month `offset` months away from the one containing `now`.
fn month_offset(now: DateTime<Utc>, offset: i32) -> Option<DateTime<Utc>> {
    let total = now.year() * 12 + now.month0() as i32 + offset;
    month_start(total.div_euclid(12), total.rem_euclid(12) as u32 + 1)
}

impl AdminService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn count(&self, sql: &str) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn count_users_between(&self, from: &str, until: &str) -> Result<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE created_at >= ? AND created_at < ?",
        )
        .bind(from)
        .bind(until)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn count_published(&self) -> Result<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM ideas WHERE status = ?")
                .bind(IdeaStatus::Published.as_str())
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn recent_users(&self, limit: i64) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users ORDER BY created_at DESC, id DESC LIMIT ?",
            USER_COLUMNS
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn dashboard(&self) -> Result<DashboardStats> {
        self.dashboard_at(Utc::now()).await
    }

    pub async fn dashboard_at(&self, now: DateTime<Utc>) -> Result<DashboardStats> {
        let total_users = self.count("SELECT COUNT(*) FROM users").await?;
        let total_ideas = self.count("SELECT COUNT(*) FROM ideas").await?;

        let now_text = format_timestamp(now + Duration::seconds(1));
        let last_month = format_timestamp(now - Duration::days(30));
        let previous_month = format_timestamp(now - Duration::days(60));
        let active_users = self.count_users_between(&last_month, &now_text).await?;
        let previous_users = self
            .count_users_between(&previous_month, &last_month)
            .await?;

        let published = self.count_published().await?;

        let ideas_by_status = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM ideas GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect();

        let recent_ideas = sqlx::query_as::<_, Idea>(
            "SELECT id, user_id, title, description, tags, status, created_at \
             FROM ideas ORDER BY created_at DESC, id DESC LIMIT 10",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(DashboardStats {
            total_users,
            total_ideas,
            active_users,
            engagement_rate: percentage(published, total_ideas),
            user_growth: growth(active_users, previous_users),
            ideas_by_status,
            recent_users: self.recent_users(5).await?,
            recent_ideas,
        })
    }

    pub async fn user_stats(&self) -> Result<UserStats> {
        let since = format_timestamp(Utc::now() - Duration::days(30));
        let active = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE created_at >= ?")
            .bind(since)
            .fetch_one(&self.pool)
            .await?;

        Ok(UserStats {
            total: self.count("SELECT COUNT(*) FROM users").await?,
            active,
            admins: self
                .count("SELECT COUNT(*) FROM users WHERE is_admin = 1")
                .await?,
        })
    }

    pub async fn idea_stats(&self) -> Result<IdeaStats> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM ideas GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = IdeaStats::default();
        for (status, count) in rows {
            stats.total += count;
            match IdeaStatus::parse(&status) {
                Some(IdeaStatus::Draft) => stats.draft += count,
                Some(IdeaStatus::ToFilm) => stats.to_film += count,
                Some(IdeaStatus::Published) => stats.published += count,
                None => {}
            }
        }
        Ok(stats)
    }

    pub async fn analytics(&self) -> Result<Analytics> {
        self.analytics_at(Utc::now()).await
    }

    pub async fn analytics_at(&self, now: DateTime<Utc>) -> Result<Analytics> {
        let mut monthly_signups = Vec::with_capacity(12);
        for back in (0..12).rev() {
            let (Some(start), Some(end)) = (month_offset(now, -back), month_offset(now, 1 - back))
            else {
                continue;
            };
            let count = self
                .count_users_between(&format_timestamp(start), &format_timestamp(end))
                .await?;
            monthly_signups.push(MonthCount {
                month: start.format("%b %Y").to_string(),
                count,
            });
        }

        let mut tag_counts: HashMap<String, i64> = HashMap::new();
        let tag_rows = sqlx::query_scalar::<_, String>("SELECT tags FROM ideas WHERE tags != ''")
            .fetch_all(&self.pool)
            .await?;
        for tags in &tag_rows {
            for tag in tags.split(',').map(|t| t.trim().to_lowercase()) {
                if !tag.is_empty() {
                    *tag_counts.entry(tag).or_default() += 1;
                }
            }
        }
        let mut top_tags: Vec<TagCount> = tag_counts
            .into_iter()
            .map(|(tag, count)| TagCount { tag, count })
            .collect();
        top_tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
        top_tags.truncate(5);

        let mut weekday_activity = [0i64; 7];
        let created = sqlx::query_scalar::<_, String>("SELECT created_at FROM ideas")
            .fetch_all(&self.pool)
            .await?;
        for at in created.iter().filter_map(|s| parse_timestamp(s)) {
            weekday_activity[at.weekday().num_days_from_monday() as usize] += 1;
        }

        let last_month = format_timestamp(now - Duration::days(30));
        let until = format_timestamp(now + Duration::seconds(1));

        Ok(Analytics {
            total_users: self.count("SELECT COUNT(*) FROM users").await?,
            total_ideas: self.count("SELECT COUNT(*) FROM ideas").await?,
            published_ideas: self.count_published().await?,
            active_users: self.count_users_between(&last_month, &until).await?,
            monthly_signups,
            top_tags,
            weekday_activity,
        })
    }

    pub async fn api_stats(&self) -> Result<ApiStats> {
        self.api_stats_at(Utc::now()).await
    }

    pub async fn api_stats_at(&self, now: DateTime<Utc>) -> Result<ApiStats> {
        let active_users = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE last_seen IS NOT NULL AND last_seen >= ?",
        )
        .bind(format_timestamp(now - Duration::hours(24)))
        .fetch_one(&self.pool)
        .await?;

        let recent_activity = self
            .recent_users(5)
            .await?
            .into_iter()
            .map(|user| RecentActivity {
                kind: "user_registered".to_string(),
                user: user.username,
                timestamp: user.created_at,
            })
            .collect();

        Ok(ApiStats {
            total_users: self.count("SELECT COUNT(*) FROM users").await?,
            total_ideas: self.count("SELECT COUNT(*) FROM ideas").await?,
            active_users,
            recent_activity,
        })
    }

    pub async fn user_growth(&self) -> Result<Vec<DailyCount>> {
        self.user_growth_at(Utc::now()).await
    }

    /// Sign-ups per day for the 30 days ending today, oldest first, zero-filled.
    pub async fn user_growth_at(&self, now: DateTime<Utc>) -> Result<Vec<DailyCount>> {
        let today = now.date_naive();
        let first = today - Duration::days(29);

        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT substr(created_at, 1, 10) AS day, COUNT(*) FROM users \
             WHERE created_at >= ? GROUP BY day",
        )
        .bind(first.format("%Y-%m-%d").to_string())
        .fetch_all(&self.pool)
        .await?;
        let by_day: HashMap<String, i64> = rows.into_iter().collect();

        Ok(first
            .iter_days()
            .take(30)
            .map(|day: NaiveDate| {
                let date = day.format("%Y-%m-%d").to_string();
                let count = by_day.get(&date).copied().unwrap_or(0);
                DailyCount { date, count }
            })
            .collect())
    }
}
