pub mod account_service;
pub mod admin_service;
pub mod email_service;
pub mod idea_service;
pub mod password;
pub mod settings_service;
pub mod token_service;
pub mod user_service;

pub use account_service::{
    AccountError, AccountService, Delivery, LoginSession, Registration, VerifyOutcome,
};
pub use admin_service::AdminService;
pub use email_service::{
    create_email_service, EmailComposer, EmailError, EmailService, MockEmailService,
    OutgoingEmail, SmtpEmailService,
};
pub use idea_service::{IdeaError, IdeaFields, IdeaService};
pub use settings_service::{SettingsError, SettingsStore, SiteSettings, DEFAULT_SETTINGS};
pub use token_service::{TokenError, TokenPurpose, TokenSigner};
pub use user_service::{AdminError, UserService};
