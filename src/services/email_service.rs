use async_trait::async_trait;
use lettre::{
    message::MultiPart, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use std::env;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Failed to build email message: {0}")]
    MessageBuild(String),
    #[error("Failed to send email: {0}")]
    SendFailed(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

#[async_trait]
pub trait EmailService: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError>;
}

/// Builds the account emails. Links are rooted at `base_url`.
#[derive(Debug, Clone)]
pub struct EmailComposer {
    base_url: String,
}

impl EmailComposer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn verification_url(&self, token: &str) -> String {
        format!("{}/verify-email/{}", self.base_url, token)
    }

    pub fn reset_url(&self, token: &str) -> String {
        format!("{}/reset-password/{}", self.base_url, token)
    }

    pub fn verification(
        &self,
        site_name: &str,
        to_email: &str,
        username: &str,
        token: &str,
    ) -> OutgoingEmail {
        let url = self.verification_url(token);
        let html_body = format!(
            r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
</head>
<body style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h1 style="color: #333;">Welcome to {site}!</h1>
    <p>Hi {user},</p>
    <p>Please verify your email address by clicking the button below:</p>
    <p style="text-align: center; margin: 30px 0;">
        <a href="{url}" style="background-color: #4CAF50; color: white; padding: 12px 24px; text-decoration: none; border-radius: 4px; display: inline-block;">Verify Email Address</a>
    </p>
    <p style="color: #666; font-size: 14px; word-break: break-all;">{url}</p>
    <p style="color: #999; font-size: 12px; margin-top: 40px;">This link will expire in 24 hours. If you didn't create an account, you can safely ignore this email.</p>
</body>
</html>
"#,
            site = site_name,
            user = username,
            url = url
        );
        let text_body = format!(
            "Welcome to {site}!\n\nHi {user},\n\nPlease verify your email address by visiting this link:\n{url}\n\nThis link will expire in 24 hours. If you didn't create an account, you can safely ignore this email.\n",
            site = site_name,
            user = username,
            url = url
        );

        OutgoingEmail {
            to: to_email.to_string(),
            subject: format!("Verify Your Email - {}", site_name),
            html_body,
            text_body,
        }
    }

    pub fn password_reset(
        &self,
        site_name: &str,
        to_email: &str,
        username: &str,
        token: &str,
    ) -> OutgoingEmail {
        let url = self.reset_url(token);
        let html_body = format!(
            r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
</head>
<body style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h1 style="color: #333;">Password Reset Request</h1>
    <p>Hi {user},</p>
    <p>You requested a password reset. Click the button below to choose a new password:</p>
    <p style="text-align: center; margin: 30px 0;">
        <a href="{url}" style="background-color: #2196F3; color: white; padding: 12px 24px; text-decoration: none; border-radius: 4px; display: inline-block;">Reset Password</a>
    </p>
    <p style="color: #666; font-size: 14px; word-break: break-all;">{url}</p>
    <p style="color: #999; font-size: 12px; margin-top: 40px;">This link will expire in 1 hour. If you didn't request a password reset, you can safely ignore this email.</p>
</body>
</html>
"#,
            user = username,
            url = url
        );
        let text_body = format!(
            "Password Reset Request\n\nHi {user},\n\nYou requested a password reset. Visit this link to reset your password:\n{url}\n\nThis link will expire in 1 hour. If you didn't request a password reset, you can safely ignore this email.\n",
            user = username,
            url = url
        );

        OutgoingEmail {
            to: to_email.to_string(),
            subject: format!("Reset Your Password - {}", site_name),
            html_body,
            text_body,
        }
    }

    pub fn registration_alert(
        &self,
        site_name: &str,
        admin_email: &str,
        username: &str,
        email: &str,
    ) -> OutgoingEmail {
        let text_body = format!(
            "A new account was registered on {}.\n\nUsername: {}\nEmail: {}\n",
            site_name, username, email
        );
        let html_body = format!(
            r#"<p>A new account was registered on {}.</p><p><strong>Username:</strong> {}<br><strong>Email:</strong> {}</p>"#,
            site_name, username, email
        );

        OutgoingEmail {
            to: admin_email.to_string(),
            subject: format!("[{}] New registration: {}", site_name, username),
            html_body,
            text_body,
        }
    }
}

pub struct MockEmailService;

impl MockEmailService {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MockEmailService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmailService for MockEmailService {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        tracing::info!("📧 [MOCK EMAIL] To: {}", email.to);
        tracing::info!("   Subject: {}", email.subject);
        for line in email.text_body.lines().filter(|l| !l.trim().is_empty()) {
            tracing::info!("   {}", line);
        }
        tracing::info!("   ---");
        Ok(())
    }
}

pub struct SmtpEmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl SmtpEmailService {
    pub fn new() -> Result<Self, EmailError> {
        let smtp_host = env::var("SMTP_HOST")
            .map_err(|_| EmailError::ConfigError("SMTP_HOST not set".to_string()))?;
        let smtp_port = env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse::<u16>()
            .map_err(|_| EmailError::ConfigError("Invalid SMTP_PORT".to_string()))?;
        let smtp_username = env::var("SMTP_USERNAME")
            .map_err(|_| EmailError::ConfigError("SMTP_USERNAME not set".to_string()))?;
        let smtp_password = env::var("SMTP_PASSWORD")
            .map_err(|_| EmailError::ConfigError("SMTP_PASSWORD not set".to_string()))?;
        let from_email = env::var("SMTP_FROM_EMAIL")
            .map_err(|_| EmailError::ConfigError("SMTP_FROM_EMAIL not set".to_string()))?;
        let from_name =
            env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Content Idea Hub".to_string());

        let encryption = env::var("SMTP_ENCRYPTION").unwrap_or_else(|_| "starttls".to_string());

        let credentials = Credentials::new(smtp_username, smtp_password);

        let mailer = match encryption.to_lowercase().as_str() {
            "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp_host)
                .map_err(|e| EmailError::ConfigError(format!("SMTP relay error: {}", e)))?
                .port(smtp_port)
                .credentials(credentials)
                .build(),
            "starttls" => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp_host)
                .map_err(|e| EmailError::ConfigError(format!("SMTP starttls error: {}", e)))?
                .port(smtp_port)
                .credentials(credentials)
                .build(),
            "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_host)
                .port(smtp_port)
                .credentials(credentials)
                .build(),
            _ => {
                return Err(EmailError::ConfigError(format!(
                    "Invalid SMTP_ENCRYPTION value: {}. Use 'tls', 'starttls', or 'none'",
                    encryption
                )))
            }
        };

        Ok(Self {
            mailer,
            from_email,
            from_name,
        })
    }
}

#[async_trait]
impl EmailService for SmtpEmailService {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        let message = Message::builder()
            .from(
                format!("{} <{}>", self.from_name, self.from_email)
                    .parse()
                    .map_err(|e| {
                        EmailError::MessageBuild(format!("Invalid from address: {}", e))
                    })?,
            )
            .to(email
                .to
                .parse()
                .map_err(|e| EmailError::MessageBuild(format!("Invalid to address: {}", e)))?)
            .subject(email.subject)
            .multipart(MultiPart::alternative_plain_html(
                email.text_body,
                email.html_body,
            ))
            .map_err(|e| EmailError::MessageBuild(e.to_string()))?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        Ok(())
    }
}

pub fn create_email_service() -> Arc<dyn EmailService> {
    if env::var("SMTP_HOST").is_ok() {
        match SmtpEmailService::new() {
            Ok(service) => {
                tracing::info!("Using SMTP email service");
                Arc::new(service)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize SMTP email service: {}. Falling back to mock service",
                    e
                );
                Arc::new(MockEmailService::new())
            }
        }
    } else {
        tracing::info!(
            "SMTP not configured. Using mock email service (emails will be logged to console)"
        );
        Arc::new(MockEmailService::new())
    }
}
