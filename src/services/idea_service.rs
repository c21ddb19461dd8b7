use crate::models::{page_offset, parse_timestamp, Idea, IdeaInput, IdeaStatus, Page};
use crate::repositories::{IdeaFilter, IdeaRepository, RepositoryError};
use crate::services::settings_service::{SettingsError, SettingsStore};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const TITLE_MAX_LENGTH: usize = 100;
pub const DESCRIPTION_MAX_LENGTH: usize = 500;
pub const TAGS_MAX_LENGTH: usize = 200;

pub const CSV_HEADER: [&str; 5] = ["Title", "Description", "Tags", "Status", "Date"];

#[derive(Debug, thiserror::Error)]
pub enum IdeaError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    PolicyDenied(String),
    #[error("Idea not found")]
    NotFound,
    #[error("Not authorized")]
    Forbidden,
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Export failed: {0}")]
    Export(String),
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Raw idea fields as submitted by a form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdeaFields {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct CalendarDay {
    /// `YYYY-MM-DD`
    pub date: String,
    pub ideas: Vec<Idea>,
}

/// Lowercases, trims and de-blanks a comma-separated tag list.
///
/// `" Video, FUNNY ,,tech"` becomes `"video,funny,tech"`.
pub fn normalize_tags(raw: &str) -> String {
    split_tags(raw).join(",")
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn validate_fields(fields: &IdeaFields) -> Result<IdeaInput, IdeaError> {
    let title = fields.title.trim();
    if title.is_empty() {
        return Err(IdeaError::InvalidInput("Title is required".to_string()));
    }
    if title.chars().count() > TITLE_MAX_LENGTH {
        return Err(IdeaError::InvalidInput(format!(
            "Title must be at most {} characters",
            TITLE_MAX_LENGTH
        )));
    }

    let description = fields.description.trim();
    if description.chars().count() > DESCRIPTION_MAX_LENGTH {
        return Err(IdeaError::InvalidInput(format!(
            "Description must be at most {} characters",
            DESCRIPTION_MAX_LENGTH
        )));
    }

    let tags = normalize_tags(&fields.tags);
    if tags.chars().count() > TAGS_MAX_LENGTH {
        return Err(IdeaError::InvalidInput(format!(
            "Tags must be at most {} characters",
            TAGS_MAX_LENGTH
        )));
    }

    let status = if fields.status.trim().is_empty() {
        IdeaStatus::Draft
    } else {
        IdeaStatus::parse(&fields.status)
            .ok_or_else(|| IdeaError::InvalidInput(format!("Unknown status: {}", fields.status)))?
    };

    Ok(IdeaInput {
        title: title.to_string(),
        description: description.to_string(),
        tags,
        status,
    })
}

pub struct IdeaService {
    repository: Arc<dyn IdeaRepository>,
    settings: Arc<SettingsStore>,
}

impl IdeaService {
    pub fn new(repository: Arc<dyn IdeaRepository>, settings: Arc<SettingsStore>) -> Self {
        Self {
            repository,
            settings,
        }
    }

    pub async fn create(&self, user_id: i64, fields: &IdeaFields) -> Result<Idea, IdeaError> {
        let input = validate_fields(fields)?;
        self.ensure_quota(user_id, 1).await?;
        let idea = self.repository.insert(user_id, &input).await?;
        tracing::debug!(user_id, idea_id = idea.id, "idea created");
        Ok(idea)
    }

    /// The idea, provided `user_id` owns it.
    pub async fn get_owned(&self, user_id: i64, idea_id: i64) -> Result<Idea, IdeaError> {
        let idea = self
            .repository
            .find_by_id(idea_id)
            .await?
            .ok_or(IdeaError::NotFound)?;
        if idea.user_id != user_id {
            tracing::warn!(user_id, idea_id, "attempt to access another user's idea");
            return Err(IdeaError::Forbidden);
        }
        Ok(idea)
    }

    pub async fn update(
        &self,
        user_id: i64,
        idea_id: i64,
        fields: &IdeaFields,
    ) -> Result<(), IdeaError> {
        let idea = self.get_owned(user_id, idea_id).await?;
        let input = validate_fields(fields)?;
        self.repository.update(idea.id, &input).await?;
        Ok(())
    }

    pub async fn delete(&self, user_id: i64, idea_id: i64) -> Result<(), IdeaError> {
        let idea = self.get_owned(user_id, idea_id).await?;
        self.repository.delete(idea.id).await?;
        Ok(())
    }

    /// The user's ideas, newest first. Every tag in `tag_filter` must be present.
    pub async fn list(
        &self,
        user_id: i64,
        tag_filter: &str,
        page: i64,
    ) -> Result<Page<Idea>, IdeaError> {
        let filter = IdeaFilter {
            tags: split_tags(tag_filter),
            ..IdeaFilter::for_user(user_id)
        };
        self.page(&filter, page).await
    }

    /// Ideas across all users, for the admin listing.
    pub async fn list_all_users(
        &self,
        status: Option<IdeaStatus>,
        title_search: Option<&str>,
        page: i64,
    ) -> Result<Page<Idea>, IdeaError> {
        let filter = IdeaFilter {
            status,
            title_search: title_search.map(str::to_string),
            ..IdeaFilter::default()
        };
        self.page(&filter, page).await
    }

    pub async fn admin_delete(&self, idea_id: i64) -> Result<(), IdeaError> {
        match self.repository.delete(idea_id).await {
            Ok(()) => {
                tracing::info!(idea_id, "idea deleted by administrator");
                Ok(())
            }
            Err(RepositoryError::NotFound) => Err(IdeaError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn page(&self, filter: &IdeaFilter, page: i64) -> Result<Page<Idea>, IdeaError> {
        let per_page = self.settings.load().await?.items_per_page;
        let total = self.repository.count(filter).await?;
        let (page, offset) = page_offset(page, per_page, total);
        let items = self.repository.list(filter, per_page, offset).await?;
        Ok(Page {
            items,
            page,
            per_page,
            total,
        })
    }

    /// Oldest first, so a re-import preserves the original order.
    async fn chronological(&self, user_id: i64) -> Result<Vec<Idea>, IdeaError> {
        let mut ideas = self
            .repository
            .list_all(&IdeaFilter::for_user(user_id))
            .await?;
        ideas.reverse();
        Ok(ideas)
    }

    pub async fn export_csv(&self, user_id: i64) -> Result<String, IdeaError> {
        let ideas = self.chronological(user_id).await?;
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(CSV_HEADER)?;
        for idea in &ideas {
            writer.write_record([
                idea.title.as_str(),
                idea.description.as_str(),
                idea.tags.as_str(),
                idea.status.as_str(),
                idea.display_date().as_str(),
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| IdeaError::Export(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| IdeaError::Export(e.to_string()))
    }

    pub async fn export_markdown(&self, user_id: i64) -> Result<String, IdeaError> {
        let ideas = self.chronological(user_id).await?;
        let mut out = String::from("# Content Ideas\n");
        for idea in &ideas {
            out.push_str(&format!("\n## {}\n\n", idea.title));
            out.push_str(&format!("- **Status:** {}\n", idea.status));
            if !idea.tags.is_empty() {
                out.push_str(&format!("- **Tags:** {}\n", idea.tag_list().join(", ")));
            }
            out.push_str(&format!("- **Created:** {}\n", idea.display_date()));
            if !idea.description.is_empty() {
                out.push_str(&format!("\n{}\n", idea.description));
            }
        }
        Ok(out)
    }

    /// Imports rows from CSV text with a header line. Only `Title` is
    /// required; unknown statuses fall back to Draft and blank titles are
    /// skipped. Either every row is stored or none is.
    pub async fn import_csv(&self, user_id: i64, data: &str) -> Result<usize, IdeaError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(data.as_bytes());

        let headers = reader.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        let title_col = column("Title").ok_or_else(|| {
            IdeaError::InvalidInput("CSV must include a Title column".to_string())
        })?;
        let description_col = column("Description");
        let tags_col = column("Tags");
        let status_col = column("Status");

        let mut inputs = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            let field = |col: Option<usize>| {
                col.and_then(|c| record.get(c))
                    .unwrap_or_default()
                    .to_string()
            };

            let title = field(Some(title_col));
            if title.trim().is_empty() {
                continue;
            }
            let status = IdeaStatus::parse(&field(status_col))
                .unwrap_or_default()
                .as_str()
                .to_string();

            let fields = IdeaFields {
                title,
                description: field(description_col),
                tags: field(tags_col),
                status,
            };
            let input = validate_fields(&fields).map_err(|e| match e {
                IdeaError::InvalidInput(msg) => {
                    IdeaError::InvalidInput(format!("Row {}: {}", index + 2, msg))
                }
                other => other,
            })?;
            inputs.push(input);
        }

        if inputs.is_empty() {
            return Ok(0);
        }

        self.ensure_quota(user_id, inputs.len() as i64).await?;
        let imported = self.repository.insert_many(user_id, &inputs).await?;
        tracing::info!(user_id, imported, "ideas imported from CSV");
        Ok(imported)
    }

    /// The user's ideas grouped by creation day, earliest day first.
    pub async fn calendar(&self, user_id: i64) -> Result<Vec<CalendarDay>, IdeaError> {
        let ideas = self.chronological(user_id).await?;
        let mut days: BTreeMap<String, Vec<Idea>> = BTreeMap::new();
        for idea in ideas {
            let date = parse_timestamp(&idea.created_at)
                .map(|dt| dt.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| idea.created_at.chars().take(10).collect());
            days.entry(date).or_default().push(idea);
        }
        Ok(days
            .into_iter()
            .map(|(date, ideas)| CalendarDay { date, ideas })
            .collect())
    }

    async fn ensure_quota(&self, user_id: i64, adding: i64) -> Result<(), IdeaError> {
        let limit = self.settings.load().await?.max_ideas_per_user;
        let owned = self.repository.count(&IdeaFilter::for_user(user_id)).await?;
        if owned + adding > limit {
            return Err(IdeaError::PolicyDenied(format!(
                "You can keep at most {} ideas",
                limit
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(title: &str, tags: &str, status: &str) -> IdeaFields {
        IdeaFields {
            title: title.to_string(),
            description: String::new(),
            tags: tags.to_string(),
            status: status.to_string(),
        }
    }

    #[test]
    fn test_normalize_tags() {
        assert_eq!(normalize_tags(" Video, FUNNY ,,tech"), "video,funny,tech");
        assert_eq!(normalize_tags(""), "");
        assert_eq!(normalize_tags(" , ,"), "");
    }

    #[test]
    fn test_validate_fields_defaults_to_draft() {
        let input = validate_fields(&fields("  My idea ", "A,b", "")).unwrap();
        assert_eq!(input.title, "My idea");
        assert_eq!(input.tags, "a,b");
        assert_eq!(input.status, IdeaStatus::Draft);
    }

    #[test]
    fn test_validate_fields_rejects_blank_and_long_titles() {
        assert!(matches!(
            validate_fields(&fields("   ", "", "")),
            Err(IdeaError::InvalidInput(_))
        ));
        let long = "x".repeat(TITLE_MAX_LENGTH + 1);
        assert!(matches!(
            validate_fields(&fields(&long, "", "")),
            Err(IdeaError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_validate_fields_parses_status() {
        let input = validate_fields(&fields("t", "", "To Film")).unwrap();
        assert_eq!(input.status, IdeaStatus::ToFilm);
        assert!(validate_fields(&fields("t", "", "Someday")).is_err());
    }
}
