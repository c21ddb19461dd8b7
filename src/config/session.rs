use std::env;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha512};
use time::Duration;
use tower_sessions::{
    cookie::{Key, SameSite},
    service::SignedCookie,
    Expiry, SessionManagerLayer,
};
use tower_sessions_sqlx_store::SqliteStore;
use tracing::warn;

/// Signed session layer backed by the SQLite session table.
pub type SessionLayer = SessionManagerLayer<SqliteStore, SignedCookie>;

const MIN_SESSION_SECRET_BYTES: usize = 64;
const MIN_SECRET_KEY_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
    /// Inactivity window for anonymous sessions. Login replaces it with the
    /// `session_timeout` setting.
    pub expiry: Duration,
    pub name: String,
}

impl SessionConfig {
    pub fn from_env() -> Self {
        if is_production() {
            SessionConfig {
                secure: true,
                http_only: true,
                same_site: SameSite::Strict,
                expiry: Duration::hours(2),
                name: "__Host-ideahub".to_string(),
            }
        } else {
            SessionConfig {
                secure: false,
                http_only: true,
                same_site: SameSite::Lax,
                expiry: Duration::days(1),
                name: "ideahub_session".to_string(),
            }
        }
    }

    pub fn create_layer(&self, store: SqliteStore) -> SessionLayer {
        SessionManagerLayer::new(store)
            .with_secure(self.secure)
            .with_http_only(self.http_only)
            .with_same_site(self.same_site)
            .with_name(self.name.clone())
            .with_expiry(Expiry::OnInactivity(self.expiry))
            .with_signed(load_session_key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProductionConfigError {
    #[error("Production environment requires HTTPS. Set FORCE_HTTPS=true")]
    HttpsRequired,
    #[error("{0} must be set in production")]
    Missing(&'static str),
    #[error("{0} must be at least {1} bytes in production")]
    TooShort(&'static str, usize),
    #[error("{0} appears to be a default value. Generate a secure secret")]
    DefaultValue(&'static str),
}

/// Refuses to start a production deployment with weak or missing secrets.
/// Development environments always pass.
pub fn validate_production_config() -> Result<(), ProductionConfigError> {
    if !is_production() {
        return Ok(());
    }

    if !env_flag_enabled("FORCE_HTTPS") {
        return Err(ProductionConfigError::HttpsRequired);
    }

    check_secret("SESSION_SECRET", MIN_SESSION_SECRET_BYTES)?;
    check_secret("SECRET_KEY", MIN_SECRET_KEY_BYTES)?;
    Ok(())
}

fn check_secret(name: &'static str, min_bytes: usize) -> Result<(), ProductionConfigError> {
    let secret = env::var(name).map_err(|_| ProductionConfigError::Missing(name))?;

    if decode_secret_bytes(&secret).len() < min_bytes {
        return Err(ProductionConfigError::TooShort(name, min_bytes));
    }

    let lowered = secret.to_ascii_lowercase();
    if ["example", "changeme", "default", "secret"]
        .iter()
        .any(|weak| lowered.contains(weak))
    {
        return Err(ProductionConfigError::DefaultValue(name));
    }
    Ok(())
}

pub fn is_production() -> bool {
    env::var("ENVIRONMENT")
        .map(|value| value == "production")
        .unwrap_or(false)
}

fn env_flag_enabled(key: &str) -> bool {
    env::var(key)
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn load_session_key() -> Key {
    match env::var("SESSION_SECRET") {
        Ok(secret) if !secret.is_empty() => key_from_secret_bytes(&decode_secret_bytes(&secret)),
        _ => {
            warn!("SESSION_SECRET not set; generating ephemeral key (development only)");
            Key::generate()
        }
    }
}

fn decode_secret_bytes(secret: &str) -> Vec<u8> {
    STANDARD
        .decode(secret.as_bytes())
        .unwrap_or_else(|_| secret.as_bytes().to_vec())
}

fn key_from_secret_bytes(bytes: &[u8]) -> Key {
    if bytes.len() >= 64 {
        Key::from(&bytes[..64])
    } else {
        Key::from(Sha512::digest(bytes).as_slice())
    }
}
