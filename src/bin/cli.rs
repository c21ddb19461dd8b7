use clap::{Parser, Subcommand};
use ideahub::{
    db,
    repositories::{SqliteSettingsRepository, SqliteUserRepository},
    services::{SettingsStore, UserService},
};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ideahub-cli")]
#[command(about = "CLI tool for managing IdeaHub users and settings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// User management commands
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Site settings commands
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a verified administrator account
    CreateAdmin {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        email: String,

        /// Password (will prompt if not provided)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// List users
    List {
        /// Only users whose username contains this text
        #[arg(short, long)]
        search: Option<String>,

        #[arg(long, default_value_t = 1)]
        page: i64,
    },

    /// Delete a user and every idea they own
    Delete {
        #[arg(short, long)]
        username: String,
    },

    /// Mark a user's email as verified
    Verify {
        #[arg(short, long)]
        username: String,
    },

    /// Set a new password for a user
    SetPassword {
        #[arg(short, long)]
        username: String,

        /// New password (will prompt if not provided)
        #[arg(short, long)]
        password: Option<String>,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Print the effective value of a setting
    Get { key: String },

    /// Store a value for a setting
    Set {
        key: String,
        value: String,

        /// Allow keys outside the known settings table
        #[arg(long)]
        force: bool,
    },

    /// Print every setting with its effective value
    List,

    /// Restore every known setting to its default
    Reset,
}

fn get_password(prompt: &str) -> anyhow::Result<String> {
    use std::io::{self, Write};
    print!("{}: ", prompt);
    io::stdout().flush()?;

    Ok(rpassword::read_password()?)
}

fn password_or_prompt(password: Option<String>, prompt: &str) -> anyhow::Result<String> {
    if let Some(pw) = password {
        return Ok(pw);
    }

    let password = get_password(prompt)?;
    let confirm = get_password("Confirm password")?;
    if password != confirm {
        eprintln!("❌ Passwords do not match");
        std::process::exit(1);
    }
    Ok(password)
}

async fn run_user_command(users: &UserService, command: UserCommands) -> anyhow::Result<()> {
    match command {
        UserCommands::CreateAdmin {
            username,
            email,
            password,
        } => {
            let password = password_or_prompt(password, "Password")?;
            match users.create_admin(&username, &email, &password).await {
                Ok(user) => {
                    println!("✅ Administrator created successfully!");
                    println!("  ID: {}", user.id);
                    println!("  Username: {}", user.username);
                    println!("  Email: {}", user.email);
                }
                Err(err) => {
                    eprintln!("❌ Failed to create administrator: {}", err);
                    std::process::exit(1);
                }
            }
        }

        UserCommands::List { search, page } => {
            let page = users.list_users(search.as_deref(), page).await?;
            if page.items.is_empty() {
                println!("No users found.");
                return Ok(());
            }

            println!(
                "{:<5} {:<20} {:<32} {:<9} {:<6} {:<6} {:<20}",
                "ID", "Username", "Email", "Verified", "Admin", "Ideas", "Created"
            );
            println!("{}", "-".repeat(104));
            for user in &page.items {
                println!(
                    "{:<5} {:<20} {:<32} {:<9} {:<6} {:<6} {:<20}",
                    user.id,
                    user.username,
                    user.email,
                    if user.email_verified { "Yes" } else { "No" },
                    if user.is_admin { "Yes" } else { "No" },
                    user.idea_count,
                    user.created_at
                );
            }
            println!(
                "\nPage {} of {} ({} users)",
                page.page,
                page.total_pages(),
                page.total
            );
        }

        UserCommands::Delete { username } => match users.find_by_username(&username).await? {
            Some(user) => match users.remove(user.id).await {
                Ok(_) => println!("✅ User '{}' deleted successfully!", username),
                Err(err) => {
                    eprintln!("❌ Failed to delete user: {}", err);
                    std::process::exit(1);
                }
            },
            None => {
                eprintln!("❌ User '{}' not found", username);
                std::process::exit(1);
            }
        },

        UserCommands::Verify { username } => match users.find_by_username(&username).await? {
            Some(user) if user.email_verified => {
                println!("ℹ️  User '{}' is already verified", username);
            }
            Some(_) => match users.mark_verified(&username).await {
                Ok(()) => println!("✅ User '{}' email verified successfully!", username),
                Err(err) => {
                    eprintln!("❌ Failed to verify user: {}", err);
                    std::process::exit(1);
                }
            },
            None => {
                eprintln!("❌ User '{}' not found", username);
                std::process::exit(1);
            }
        },

        UserCommands::SetPassword { username, password } => {
            let password = password_or_prompt(password, "New password")?;
            match users.set_password(&username, &password).await {
                Ok(()) => println!("✅ Password updated successfully for '{}'!", username),
                Err(err) => {
                    eprintln!("❌ Failed to update password: {}", err);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

async fn run_settings_command(
    settings: &SettingsStore,
    command: SettingsCommands,
) -> anyhow::Result<()> {
    match command {
        SettingsCommands::Get { key } => match settings.get_or_default(&key).await {
            Ok(value) => println!("{}", value),
            Err(err) => {
                eprintln!("❌ {}", err);
                std::process::exit(1);
            }
        },

        SettingsCommands::Set { key, value, force } => {
            if !force && !SettingsStore::is_known(&key) {
                eprintln!("❌ Unknown setting '{}' (use --force to store it anyway)", key);
                std::process::exit(1);
            }
            settings.set(&key, &value).await?;
            println!("✅ {} = {}", key, value);
        }

        SettingsCommands::List => {
            for setting in settings.all().await? {
                println!("{:<28} {}", setting.key, setting.value);
            }
        }

        SettingsCommands::Reset => {
            settings.reset_to_defaults().await?;
            println!("✅ Settings restored to their defaults");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ideahub=warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let pool = db::create_pool().await?;
    db::run_migrations(&pool).await?;

    match cli.command {
        Commands::User { command } => {
            let users = UserService::new(Arc::new(SqliteUserRepository::new(pool)));
            run_user_command(&users, command).await
        }
        Commands::Settings { command } => {
            let settings = SettingsStore::new(Arc::new(SqliteSettingsRepository::new(pool)));
            run_settings_command(&settings, command).await
        }
    }
}
