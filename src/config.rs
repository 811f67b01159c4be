use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Reading tracker server with favorites, progress and recommendations.
#[derive(Parser, Debug, Clone)]
#[command(name = "shelf-rs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "SHELF_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// User management commands.
    User {
        /// User subcommand action.
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Local catalog management commands.
    Catalog {
        /// Catalog subcommand action.
        #[command(subcommand)]
        action: CatalogCommand,
    },

    /// Initialize database and create default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// User management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum UserCommand {
    /// Add a new user.
    Add {
        /// Username.
        username: String,
        /// Email address used to log in.
        #[arg(short, long)]
        email: String,
        /// Password (will prompt if not provided).
        #[arg(short, long)]
        password: Option<String>,
        /// User role (admin or user).
        #[arg(short, long, default_value = "user")]
        role: String,
    },

    /// Delete a user.
    Del {
        /// Username to delete.
        username: String,
    },

    /// List all users.
    List,

    /// Change user password.
    Passwd {
        /// Username.
        username: String,
        /// New password (will prompt if not provided).
        #[arg(short, long)]
        password: Option<String>,
    },
}

/// Catalog management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum CatalogCommand {
    /// Add a book to the local catalog by hand.
    Add {
        /// Title.
        title: String,
        /// Author.
        #[arg(short, long)]
        author: String,
        /// Genre tags (repeatable).
        #[arg(short, long)]
        genre: Vec<String>,
        /// Page count.
        #[arg(long)]
        pages: Option<i64>,
        /// ISBN.
        #[arg(long)]
        isbn: Option<String>,
        /// Publication year.
        #[arg(long)]
        year: Option<i32>,
    },

    /// Import a work from the external source into the local catalog.
    Import {
        /// External work ID, e.g. OL45883W or /works/OL45883W.
        work_id: String,
    },

    /// Remove a catalog entry (and any favorites that reference it).
    Del {
        /// Internal entry ID.
        id: String,
    },

    /// List catalog entries.
    List {
        /// Filter by text.
        #[arg(short, long)]
        search: Option<String>,
        /// Maximum number of entries.
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// External bibliographic source.
    #[serde(default)]
    pub source: SourceConfig,

    /// Recommendation configuration.
    #[serde(default)]
    pub recommendations: RecommendationConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        8080,
    )
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/shelf.db")
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Registration mode: "open", "disabled".
    #[serde(default = "default_registration")]
    pub registration: String,

    /// Session token duration in days.
    #[serde(default = "default_session_days")]
    pub session_days: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            registration: default_registration(),
            session_days: default_session_days(),
        }
    }
}

fn default_registration() -> String {
    "open".to_string()
}

fn default_session_days() -> u32 {
    7
}

impl AuthConfig {
    /// Check if registration is enabled.
    pub fn registration_enabled(&self) -> bool {
        self.registration == "open"
    }
}

/// External bibliographic source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Cover image base URL.
    #[serde(default = "default_covers_url")]
    pub covers_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Editions sampled for the median page count fallback.
    #[serde(default = "default_edition_sample")]
    pub edition_sample: usize,

    /// Subjects kept as genre tags on materialized entries.
    #[serde(default = "default_max_subjects")]
    pub max_subjects: usize,

    /// User-Agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            covers_url: default_covers_url(),
            timeout_seconds: default_timeout_seconds(),
            edition_sample: default_edition_sample(),
            max_subjects: default_max_subjects(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "https://openlibrary.org".to_string()
}

fn default_covers_url() -> String {
    "https://covers.openlibrary.org".to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_edition_sample() -> usize {
    10
}

fn default_max_subjects() -> usize {
    10
}

fn default_user_agent() -> String {
    format!("shelf-rs/{}", env!("CARGO_PKG_VERSION"))
}

/// Recommendation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// Provider: "subjects", "inference" or "static".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Text-generation endpoint used by the "inference" provider.
    #[serde(default)]
    pub inference_url: Option<String>,

    /// Bearer key for the inference endpoint.
    #[serde(default)]
    pub inference_api_key: Option<String>,

    /// Number of recommendations returned.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            inference_url: None,
            inference_api_key: None,
            limit: default_limit(),
        }
    }
}

fn default_provider() -> String {
    "subjects".to_string()
}

fn default_limit() -> usize {
    5
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("shelf-rs.toml"),
            dirs::config_dir()
                .map(|p| p.join("shelf-rs").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/shelf-rs/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# shelf-rs configuration

[server]
bind = "0.0.0.0:8080"

[database]
# path = "/var/lib/shelf-rs/shelf.db"

[auth]
# Registration mode: "open" or "disabled"
registration = "open"
# Session duration in days
session_days = 7

[source]
base_url = "https://openlibrary.org"
covers_url = "https://covers.openlibrary.org"
timeout_seconds = 10
# Editions sampled when a work has no page count
edition_sample = 10
max_subjects = 10

[recommendations]
# Provider: "subjects", "inference" or "static"
provider = "subjects"
# inference_url = "https://example.com/v1/generate"
# inference_api_key = "..."
limit = 5
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(&Config::generate_default()).unwrap();
        assert_eq!(config.server.bind.port(), 8080);
        assert_eq!(config.auth.session_days, 7);
        assert!(config.auth.registration_enabled());
        assert_eq!(config.source.edition_sample, 10);
        assert_eq!(config.recommendations.provider, "subjects");
        assert_eq!(config.recommendations.limit, 5);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [auth]
            registration = "disabled"
            "#,
        )
        .unwrap();
        assert!(!config.auth.registration_enabled());
        assert_eq!(config.database.path, PathBuf::from("data/shelf.db"));
        assert_eq!(config.source.base_url, "https://openlibrary.org");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[source]\ntimeout_seconds = 3\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.source.timeout_seconds, 3);

        std::fs::write(&path, "[source\n").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(crate::error::AppError::Config(_))
        ));
    }
}
