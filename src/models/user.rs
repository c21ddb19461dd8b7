use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub email_verified: bool,
    #[serde(skip_serializing)]
    pub email_verification_token: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<String>,
    pub created_at: String,
    pub last_seen: Option<String>,
}

/// Row shape for admin listings, with the owned idea count joined in.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub email_verified: bool,
    pub created_at: String,
    pub last_seen: Option<String>,
    pub idea_count: i64,
}
