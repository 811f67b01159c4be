mod schema;

pub use schema::{Database, EntryFilter};

use crate::progress::{ReadingProgress, ReadingStatus};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// User account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Public username.
    pub username: String,
    /// Login email (lower-cased).
    pub email: String,
    /// Argon2 password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// User role: "admin" or "user".
    pub role: String,
    /// Reading preferences.
    pub preferences: Preferences,
    /// Account creation timestamp.
    pub created_at: i64,
    /// Last login timestamp.
    pub last_login: Option<i64>,
}

/// Reading preferences, used as recommendation hints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Favorite genres.
    #[serde(default)]
    pub favorite_genres: Vec<String>,
    /// Favorite authors.
    #[serde(default)]
    pub favorite_authors: Vec<String>,
}

/// Authentication session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session token.
    pub token: String,
    /// User ID.
    pub user_id: String,
    /// Expiration timestamp.
    pub expires_at: i64,
}

/// A book in the local catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Internal ID (UUID).
    pub id: String,
    /// External source work ID, without namespace prefix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// ISBN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    /// Title.
    pub title: String,
    /// Primary author.
    pub author: String,
    /// Genre / subject tags.
    pub genres: Vec<String>,
    /// First publication year.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i32>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Cover image URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    /// Page count, when known. Authoritative for progress totals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<i64>,
    /// Median page count reported by search results (legacy field).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<i64>,
    /// Language code.
    pub language: String,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

impl CatalogEntry {
    /// Best known page count: `page_count`, then the legacy `pages` field.
    pub fn known_page_count(&self) -> Option<i64> {
        self.page_count
            .filter(|p| *p > 0)
            .or(self.pages.filter(|p| *p > 0))
    }
}

/// One user's relationship to one catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteRecord {
    /// Favorite ID.
    pub id: String,
    /// Owner.
    pub user_id: String,
    /// Catalog entry ID.
    pub entry_id: String,
    /// Reading status.
    pub status: ReadingStatus,
    /// Rating 1-5.
    pub rating: Option<u8>,
    /// Private notes.
    pub notes: Option<String>,
    /// Review text.
    pub review: Option<String>,
    /// When the book was added.
    pub added_at: i64,
    /// First time the status became completed.
    pub completed_at: Option<i64>,
    /// Page-level progress.
    pub reading_progress: ReadingProgress,
    /// Last update timestamp.
    pub updated_at: i64,
}

impl FavoriteRecord {
    /// Stamp `completed_at` the first time the record is completed.
    pub fn stamp_completion(&mut self, now: i64) {
        if self.status == ReadingStatus::Completed && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
    }
}

/// A favorite joined with its catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavoriteWithBook {
    /// The favorite record.
    #[serde(flatten)]
    pub favorite: FavoriteRecord,
    /// The referenced book.
    pub book: CatalogEntry,
}

impl ToSql for ReadingStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ReadingStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}
