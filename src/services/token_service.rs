//! Signed, time-limited tokens that bind an email address to a purpose.
//!
//! A token is `base64url(payload) "." base64url(mac)` where the payload is a
//! small JSON object and the MAC is HMAC-SHA256 keyed by the server secret.
//! Each purpose mixes its own salt into the MAC so a token minted for one
//! purpose never verifies under another, even for the same address.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Links in verification emails stay valid for a day.
pub const EMAIL_VERIFICATION_MAX_AGE: Duration = Duration::hours(24);
/// Reset links, and the persisted reset expiry, last one hour.
pub const PASSWORD_RESET_MAX_AGE: Duration = Duration::hours(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenPurpose {
    #[serde(rename = "email-verification")]
    EmailVerification,
    #[serde(rename = "password-reset")]
    PasswordReset,
}

impl TokenPurpose {
    pub fn salt(&self) -> &'static str {
        match self {
            TokenPurpose::EmailVerification => "email-verification",
            TokenPurpose::PasswordReset => "password-reset",
        }
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.salt())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token is malformed")]
    Malformed,
    #[error("Token signature does not match")]
    BadSignature,
    #[error("Token was issued for a different purpose")]
    WrongPurpose,
    #[error("Token has expired")]
    Expired,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    sub: String,
    pur: TokenPurpose,
    iat: i64,
}

pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn issue(&self, email: &str, purpose: TokenPurpose) -> String {
        self.issue_at(email, purpose, Utc::now())
    }

    /// Issues a token as if the current time were `issued_at`.
    pub fn issue_at(&self, email: &str, purpose: TokenPurpose, issued_at: DateTime<Utc>) -> String {
        let payload = TokenPayload {
            sub: email.to_string(),
            pur: purpose,
            iat: issued_at.timestamp(),
        };
        // Serializing a struct of plain strings and integers cannot fail.
        let json = serde_json::to_vec(&payload).unwrap_or_default();
        let encoded = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(purpose, encoded.as_bytes()));
        format!("{}.{}", encoded, signature)
    }

    /// Returns the embedded email if `token` is authentic, was issued for
    /// `purpose`, and is no older than `max_age`.
    pub fn verify(
        &self,
        token: &str,
        purpose: TokenPurpose,
        max_age: Duration,
    ) -> Result<String, TokenError> {
        self.verify_at(token, purpose, max_age, Utc::now())
    }

    pub fn verify_at(
        &self,
        token: &str,
        purpose: TokenPurpose,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let (encoded, signature) = token.trim().split_once('.').ok_or(TokenError::Malformed)?;
        if encoded.is_empty() || signature.contains('.') {
            return Err(TokenError::Malformed);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;
        self.mac(purpose, encoded.as_bytes())
            .verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| TokenError::Malformed)?;
        let payload: TokenPayload =
            serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)?;

        if payload.pur != purpose {
            return Err(TokenError::WrongPurpose);
        }

        let age = now.timestamp() - payload.iat;
        if age > max_age.num_seconds() {
            return Err(TokenError::Expired);
        }

        Ok(payload.sub)
    }

    fn mac(&self, purpose: TokenPurpose, message: &[u8]) -> HmacSha256 {
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
        };
        mac.update(purpose.salt().as_bytes());
        mac.update(b"\x00");
        mac.update(message);
        mac
    }

    fn sign(&self, purpose: TokenPurpose, message: &[u8]) -> Vec<u8> {
        self.mac(purpose, message).finalize().into_bytes().to_vec()
    }
}

/// Hex SHA-256 of a token, the form stored on the user row.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
