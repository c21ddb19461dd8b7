pub mod idea;
pub mod setting;
pub mod user;

pub use idea::{page_offset, Idea, IdeaInput, IdeaStatus, Page};
pub use setting::Setting;
pub use user::{User, UserSummary};

use chrono::{DateTime, SecondsFormat, Utc};

/// Formats a timestamp the way every `*_at` column stores it.
///
/// Second precision with a `Z` suffix keeps lexical and chronological order
/// identical, so range filters can compare the stored text directly.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
