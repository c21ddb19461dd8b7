pub mod session;

use rand::RngCore;
use std::env;
use tracing::warn;

/// Process-level configuration read from the environment at start-up.
///
/// Behaviour that administrators change at runtime lives in the settings
/// store instead.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Absolute origin used to build links in outgoing email.
    pub base_url: String,
    pub secret_key: Vec<u8>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::Invalid("PORT"))?;
        let base_url = env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", host, port))
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            host,
            port,
            base_url,
            secret_key: load_secret_key(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    Invalid(&'static str),
}

fn load_secret_key() -> Vec<u8> {
    match env::var("SECRET_KEY") {
        Ok(secret) if !secret.is_empty() => secret.into_bytes(),
        _ => {
            warn!("SECRET_KEY not set; generating ephemeral key (outstanding email links will not survive a restart)");
            let mut bytes = vec![0u8; 64];
            rand::thread_rng().fill_bytes(&mut bytes);
            bytes
        }
    }
}
