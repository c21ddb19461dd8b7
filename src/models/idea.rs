use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IdeaStatus {
    #[default]
    Draft,
    #[serde(rename = "To Film")]
    ToFilm,
    Published,
}

impl IdeaStatus {
    pub const ALL: [IdeaStatus; 3] = [IdeaStatus::Draft, IdeaStatus::ToFilm, IdeaStatus::Published];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdeaStatus::Draft => "Draft",
            IdeaStatus::ToFilm => "To Film",
            IdeaStatus::Published => "Published",
        }
    }

    /// Lenient parse used for form input and CSV import.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "draft" => Some(IdeaStatus::Draft),
            "to film" | "tofilm" => Some(IdeaStatus::ToFilm),
            "published" => Some(IdeaStatus::Published),
            _ => None,
        }
    }
}

impl fmt::Display for IdeaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for IdeaStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        IdeaStatus::parse(&value).ok_or_else(|| format!("unknown idea status: {}", value))
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Idea {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub tags: String,
    #[sqlx(try_from = "String")]
    pub status: IdeaStatus,
    pub created_at: String,
}

impl Idea {
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags.split(',').filter(|t| !t.is_empty()).collect()
    }

    /// `YYYY-MM-DD HH:MM` rendering used in listings and exports.
    pub fn display_date(&self) -> String {
        super::parse_timestamp(&self.created_at)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| self.created_at.clone())
    }
}

/// Validated, tag-normalized idea fields ready for insert or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdeaInput {
    pub title: String,
    pub description: String,
    pub tags: String,
    pub status: IdeaStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> i64 {
        last_page(self.total, self.per_page)
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}

fn last_page(total: i64, per_page: i64) -> i64 {
    if total <= 0 || per_page <= 0 {
        return 1;
    }
    (total - 1) / per_page + 1
}

/// Clamps a 1-based page number into `1..=last page` and returns `(page, offset)`.
/// The offset never exceeds `total`, so it cannot overflow.
pub fn page_offset(page: i64, per_page: i64, total: i64) -> (i64, i64) {
    let page = page.clamp(1, last_page(total, per_page));
    (page, (page - 1) * per_page.max(0))
}
