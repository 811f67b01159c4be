//! shelf-rs server entry point.

use clap::Parser;
use shelf_rs::{
    auth::AuthService,
    catalog::{EntryQuery, NewEntry},
    config::{CatalogCommand, Cli, Command, Config, UserCommand},
    db::{Database, timestamp_to_datetime},
    server,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Some(Command::Init { force }) => cmd_init(force).await,
        Some(Command::User { action }) => cmd_user(action, &config).await,
        Some(Command::Catalog { action }) => cmd_catalog(action, config).await,
        Some(Command::Serve { bind }) => cmd_serve(config, bind).await,
        None => cmd_serve(config, None).await,
    }
}

/// Initialize logging.
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelf_rs=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize config and database.
async fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    let _db = Database::open(&config.database.path)?;
    println!("Initialized database: {}", config.database.path.display());

    println!("\nEdit config.toml to configure your server.");
    println!("Then run: shelf-rs user add <username> --email <email> --role admin");

    Ok(())
}

/// User management commands.
async fn cmd_user(action: UserCommand, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let auth = AuthService::new(
        db,
        config.auth.session_days,
        config.auth.registration_enabled(),
    );

    match action {
        UserCommand::Add {
            username,
            email,
            password,
            role,
        } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("Password: ")?,
            };

            let user = auth.create_user(&username, &email, &password, &role)?;
            println!(
                "Created user: {} <{}> (role: {}, id: {})",
                user.username, user.email, user.role, user.id
            );
        }

        UserCommand::Del { username } => {
            if auth.delete_user(&username)? {
                println!("Deleted user: {}", username);
            } else {
                println!("User not found: {}", username);
            }
        }

        UserCommand::List => {
            let users = auth.list_users()?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!(
                    "{:<20} {:<30} {:<8} LAST LOGIN",
                    "USERNAME", "EMAIL", "ROLE"
                );
                println!("{}", "-".repeat(80));
                for user in users {
                    let last_login = user
                        .last_login
                        .map(|ts| timestamp_to_datetime(ts).format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "{:<20} {:<30} {:<8} {}",
                        user.username, user.email, user.role, last_login
                    );
                }
            }
        }

        UserCommand::Passwd { username, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("New password: ")?,
            };

            if auth.change_password(&username, &password)? {
                println!("Password changed for: {}", username);
            } else {
                println!("User not found: {}", username);
            }
        }
    }

    Ok(())
}

/// Catalog management commands.
async fn cmd_catalog(action: CatalogCommand, config: Config) -> anyhow::Result<()> {
    init_logging();

    let db = Database::open(&config.database.path)?;
    let state = server::AppState::from_config(config, db)?;

    match action {
        CatalogCommand::Add {
            title,
            author,
            genre,
            pages,
            isbn,
            year,
        } => {
            let entry = state.catalog.create_entry(NewEntry {
                title,
                author,
                isbn,
                genres: genre,
                published_year: year,
                page_count: pages,
                ..Default::default()
            })?;
            println!("Added: {} by {} (id: {})", entry.title, entry.author, entry.id);
        }

        CatalogCommand::Import { work_id } => {
            let entry = state.catalog.resolver().resolve(&work_id).await?;
            println!(
                "Imported: {} by {} (id: {}, pages: {})",
                entry.title,
                entry.author,
                entry.id,
                entry
                    .known_page_count()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            );
        }

        CatalogCommand::Del { id } => {
            if state.catalog.delete_entry(&id)? {
                println!("Deleted entry: {}", id);
            } else {
                println!("Entry not found: {}", id);
            }
        }

        CatalogCommand::List { search, limit } => {
            let page = state.catalog.list_entries(&EntryQuery {
                search,
                limit: Some(limit),
                ..Default::default()
            })?;

            if page.books.is_empty() {
                println!("No entries found.");
            } else {
                println!("{:<36} {:<30} {:<20} PAGES", "ID", "TITLE", "AUTHOR");
                println!("{}", "-".repeat(100));
                for entry in &page.books {
                    println!(
                        "{:<36} {:<30} {:<20} {}",
                        entry.id,
                        truncate(&entry.title, 30),
                        truncate(&entry.author, 20),
                        entry
                            .known_page_count()
                            .map(|p| p.to_string())
                            .unwrap_or_else(|| "-".to_string())
                    );
                }
                println!("\n{} of {} entries", page.books.len(), page.total);
            }
        }
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(mut config: Config, bind: Option<std::net::SocketAddr>) -> anyhow::Result<()> {
    if let Some(addr) = bind {
        config.server.bind = addr;
    }

    init_logging();

    let db = Database::open(&config.database.path)?;

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        source = %config.source.base_url,
        "Starting shelf-rs server"
    );

    let bind_addr = config.server.bind;
    let state = server::AppState::from_config(config, db.clone())?;

    // Expired sessions are purged periodically
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_CLEANUP_INTERVAL);

        loop {
            ticker.tick().await;
            match db.cleanup_expired_sessions() {
                Ok(0) => {}
                Ok(count) => tracing::debug!(count, "Removed expired sessions"),
                Err(e) => tracing::warn!(error = %e, "Session cleanup failed"),
            }
        }
    });

    let app = server::create_router(state);

    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(address = %bind_addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Shorten a column value for table output.
fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let mut out: String = value.chars().take(width.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}

/// Prompt for password input.
fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut password = String::new();
    io::stdin().read_line(&mut password)?;

    Ok(password.trim().to_string())
}
