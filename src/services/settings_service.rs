use crate::models::Setting;
use crate::repositories::{RepositoryError, SettingsRepository};
use std::collections::HashMap;
use std::sync::Arc;

/// Canonical defaults for every runtime setting the application reads.
///
/// Booleans use `"on"` / `""`, numbers are decimal strings. This table is the
/// only place defaults live; `SiteSettings` falls back to it when a stored
/// value is missing or unparsable.
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("site_name", "Content Idea Hub"),
    ("site_description", "Manage your content ideas efficiently"),
    ("items_per_page", "20"),
    ("timezone", "UTC"),
    ("allow_registration", "on"),
    ("require_email_verification", "on"),
    ("auto_approve_ideas", "on"),
    ("max_ideas_per_user", "100"),
    ("enable_2fa", ""),
    ("log_user_activity", "on"),
    ("session_timeout", "30"),
    ("password_min_length", "8"),
    ("email_notifications", "on"),
    ("admin_alerts", "on"),
    ("admin_email", "admin@contentideahub.com"),
    ("auto_backup", "on"),
    ("backup_frequency", "daily"),
];

/// Keys rendered as checkboxes; an unchecked box is submitted as nothing.
pub const BOOLEAN_SETTINGS: &[&str] = &[
    "allow_registration",
    "require_email_verification",
    "auto_approve_ideas",
    "enable_2fa",
    "log_user_activity",
    "email_notifications",
    "admin_alerts",
    "auto_backup",
];

pub fn default_for(key: &str) -> Option<&'static str> {
    DEFAULT_SETTINGS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Unknown setting: {0}")]
    UnknownKey(String),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Typed view of the settings table, decoded once per use site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSettings {
    pub site_name: String,
    pub site_description: String,
    pub items_per_page: i64,
    pub timezone: String,
    pub allow_registration: bool,
    pub require_email_verification: bool,
    pub auto_approve_ideas: bool,
    pub max_ideas_per_user: i64,
    pub enable_2fa: bool,
    pub log_user_activity: bool,
    pub session_timeout_minutes: i64,
    pub password_min_length: usize,
    pub email_notifications: bool,
    pub admin_alerts: bool,
    pub admin_email: String,
    pub auto_backup: bool,
    pub backup_frequency: String,
}

impl SiteSettings {
    /// Decodes from `lookup`; keys it does not know fall back to the defaults table.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| {
            lookup(key).unwrap_or_else(|| default_for(key).unwrap_or_default().to_string())
        };
        let flag = |key: &str| parse_flag(&text(key));
        let number = |key: &str| {
            parse_positive(&text(key))
                .or_else(|| default_for(key).and_then(parse_positive))
                .unwrap_or(1)
        };

        Self {
            site_name: text("site_name"),
            site_description: text("site_description"),
            items_per_page: number("items_per_page"),
            timezone: text("timezone"),
            allow_registration: flag("allow_registration"),
            require_email_verification: flag("require_email_verification"),
            auto_approve_ideas: flag("auto_approve_ideas"),
            max_ideas_per_user: number("max_ideas_per_user"),
            enable_2fa: flag("enable_2fa"),
            log_user_activity: flag("log_user_activity"),
            session_timeout_minutes: number("session_timeout"),
            password_min_length: number("password_min_length") as usize,
            email_notifications: flag("email_notifications"),
            admin_alerts: flag("admin_alerts"),
            admin_email: text("admin_email"),
            auto_backup: flag("auto_backup"),
            backup_frequency: text("backup_frequency"),
        }
    }

    pub fn defaults() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "on" | "true" | "1" | "yes"
    )
}

fn parse_positive(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|n| *n > 0)
}

/// Key-value settings with caller-supplied fallbacks.
///
/// No caching: every write is visible to the next read.
pub struct SettingsStore {
    repository: Arc<dyn SettingsRepository>,
}

impl SettingsStore {
    pub fn new(repository: Arc<dyn SettingsRepository>) -> Self {
        Self { repository }
    }

    /// Stored value for `key`, or `default` untouched when no row exists.
    pub async fn get(&self, key: &str, default: &str) -> Result<String, SettingsError> {
        Ok(self
            .repository
            .get(key)
            .await?
            .unwrap_or_else(|| default.to_string()))
    }

    /// Like `get`, with the fallback taken from the canonical table.
    pub async fn get_or_default(&self, key: &str) -> Result<String, SettingsError> {
        let default = default_for(key).ok_or_else(|| SettingsError::UnknownKey(key.to_string()))?;
        self.get(key, default).await
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.repository.upsert(key, value).await?;
        tracing::debug!(key, "setting updated");
        Ok(())
    }

    /// Writes every entry of `defaults`. Keys outside it are left alone.
    pub async fn reset(&self, defaults: &[(&str, &str)]) -> Result<(), SettingsError> {
        for (key, value) in defaults {
            self.set(key, value).await?;
        }
        tracing::info!(count = defaults.len(), "settings reset to defaults");
        Ok(())
    }

    pub async fn reset_to_defaults(&self) -> Result<(), SettingsError> {
        self.reset(DEFAULT_SETTINGS).await
    }

    /// Writes every known key from a submitted form. Missing boolean keys
    /// become `""`; missing text keys keep their stored value.
    pub async fn apply_form(&self, form: &HashMap<String, String>) -> Result<(), SettingsError> {
        for (key, _) in DEFAULT_SETTINGS {
            match form.get(*key) {
                Some(value) => self.set(key, value.trim()).await?,
                None if BOOLEAN_SETTINGS.contains(key) => self.set(key, "").await?,
                None => {}
            }
        }
        Ok(())
    }

    pub async fn load(&self) -> Result<SiteSettings, SettingsError> {
        let stored: HashMap<String, String> = self
            .repository
            .all()
            .await?
            .into_iter()
            .map(|s| (s.key, s.value))
            .collect();
        Ok(SiteSettings::from_lookup(|key| stored.get(key).cloned()))
    }

    /// Every known key with its effective value, in canonical order, followed
    /// by any stored keys outside the canonical table.
    pub async fn all(&self) -> Result<Vec<Setting>, SettingsError> {
        let mut stored: HashMap<String, String> = self
            .repository
            .all()
            .await?
            .into_iter()
            .map(|s| (s.key, s.value))
            .collect();

        let mut settings: Vec<Setting> = DEFAULT_SETTINGS
            .iter()
            .map(|(key, default)| Setting {
                key: key.to_string(),
                value: stored.remove(*key).unwrap_or_else(|| default.to_string()),
            })
            .collect();

        let mut extra: Vec<Setting> = stored
            .into_iter()
            .map(|(key, value)| Setting { key, value })
            .collect();
        extra.sort_by(|a, b| a.key.cmp(&b.key));
        settings.extend(extra);
        Ok(settings)
    }

    pub fn is_known(key: &str) -> bool {
        default_for(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::settings_repository::MockSettingsRepository;
    use mockall::predicate::*;

    #[test]
    fn test_defaults_decode() {
        let settings = SiteSettings::defaults();
        assert_eq!(settings.site_name, "Content Idea Hub");
        assert_eq!(settings.items_per_page, 20);
        assert_eq!(settings.session_timeout_minutes, 30);
        assert_eq!(settings.password_min_length, 8);
        assert!(settings.allow_registration);
        assert!(settings.require_email_verification);
        assert!(!settings.enable_2fa);
    }

    #[test]
    fn test_unparsable_numbers_fall_back() {
        let settings = SiteSettings::from_lookup(|key| match key {
            "items_per_page" => Some("lots".to_string()),
            "max_ideas_per_user" => Some("0".to_string()),
            "password_min_length" => Some(" 12 ".to_string()),
            _ => None,
        });
        assert_eq!(settings.items_per_page, 20);
        assert_eq!(settings.max_ideas_per_user, 100);
        assert_eq!(settings.password_min_length, 12);
    }

    #[test]
    fn test_flag_parsing() {
        assert!(parse_flag("on"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(!parse_flag(""));
        assert!(!parse_flag("off"));
    }

    #[tokio::test]
    async fn test_get_missing_key_returns_default_without_write() {
        let mut mock_repo = MockSettingsRepository::new();

        mock_repo
            .expect_get()
            .with(eq("missing"))
            .times(1)
            .returning(|_| Box::pin(async move { Ok(None) }));
        mock_repo.expect_upsert().never();

        let store = SettingsStore::new(Arc::new(mock_repo));
        let value = store.get("missing", "fallback").await.unwrap();
        assert_eq!(value, "fallback");
    }

    #[tokio::test]
    async fn test_get_or_default_rejects_unknown_key() {
        let mock_repo = MockSettingsRepository::new();
        let store = SettingsStore::new(Arc::new(mock_repo));

        let result = store.get_or_default("not_a_setting").await;
        assert!(matches!(result, Err(SettingsError::UnknownKey(_))));
    }
}
