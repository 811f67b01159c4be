use crate::db::*;
use crate::error::{AppError, Result};
use crate::progress::{ReadingProgress, ReadingStatus};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;

/// Catalog entry columns, aliased as `e`.
const ENTRY_COLUMNS: &str = "e.id, e.external_id, e.isbn, e.title, e.author, e.genres_json,
    e.published_year, e.description, e.cover_image, e.page_count, e.pages, e.language,
    e.created_at, e.updated_at";

/// Number of columns in `ENTRY_COLUMNS`.
const ENTRY_COLUMN_COUNT: usize = 14;

/// Favorite columns, aliased as `f`.
const FAVORITE_COLUMNS: &str = "f.id, f.user_id, f.entry_id, f.status, f.rating, f.notes,
    f.review, f.added_at, f.completed_at, f.current_page, f.total_pages,
    f.progress_percentage, f.progress_updated_at, f.updated_at";

const USER_COLUMNS: &str = "id, username, email, password_hash, role, favorite_genres_json,
    favorite_authors_json, created_at, last_login";

/// Filter for listing local catalog entries.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    /// Free text matched against title, author and description.
    pub search: Option<String>,
    /// Exact genre tag.
    pub genre: Option<String>,
    /// Author substring.
    pub author: Option<String>,
    /// Rows to skip.
    pub offset: i64,
    /// Maximum rows to return.
    pub limit: i64,
}

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Users table
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                favorite_genres_json TEXT,
                favorite_authors_json TEXT,
                created_at INTEGER NOT NULL,
                last_login INTEGER
            );

            -- Sessions table
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Catalog entries (local books, curated or materialized)
            CREATE TABLE IF NOT EXISTS catalog_entries (
                id TEXT PRIMARY KEY,
                external_id TEXT UNIQUE,
                isbn TEXT UNIQUE,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                genres_json TEXT,
                published_year INTEGER,
                description TEXT,
                cover_image TEXT,
                page_count INTEGER,
                pages INTEGER,
                language TEXT NOT NULL DEFAULT 'en',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Favorites (one per user and book)
            CREATE TABLE IF NOT EXISTS favorites (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                entry_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'want_to_read',
                rating INTEGER,
                notes TEXT,
                review TEXT,
                added_at INTEGER NOT NULL,
                completed_at INTEGER,
                current_page INTEGER NOT NULL DEFAULT 0,
                total_pages INTEGER NOT NULL DEFAULT 1,
                progress_percentage INTEGER NOT NULL DEFAULT 0,
                progress_updated_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (user_id, entry_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (entry_id) REFERENCES catalog_entries(id) ON DELETE CASCADE
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_entries_author ON catalog_entries(author);
            CREATE INDEX IF NOT EXISTS idx_favorites_user_status ON favorites(user_id, status);
            CREATE INDEX IF NOT EXISTS idx_favorites_user_added ON favorites(user_id, added_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    // ========== USER OPERATIONS ==========

    /// Create a new user.
    pub fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, role, favorite_genres_json,
                                favorite_authors_json, created_at, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                user.id,
                user.username,
                user.email,
                user.password_hash,
                user.role,
                to_json(&user.preferences.favorite_genres),
                to_json(&user.preferences.favorite_authors),
                user.created_at,
                user.last_login,
            ],
        )
        .map_err(|e| match AppError::from(e) {
            AppError::UniqueViolation(msg) if msg.contains("users.email") => {
                AppError::AlreadyExists(format!("Email '{}' already registered", user.email))
            }
            AppError::UniqueViolation(_) => {
                AppError::AlreadyExists(format!("Username '{}' already taken", user.username))
            }
            other => other,
        })?;
        Ok(())
    }

    /// Get user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.query_user("username", username)
    }

    /// Get user by email.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.query_user("email", email)
    }

    /// Get user by ID.
    pub fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        self.query_user("id", id)
    }

    fn query_user(&self, column: &str, value: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column),
            params![value],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM users ORDER BY username",
                USER_COLUMNS
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let users = stmt
            .query_map([], Self::row_to_user)
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect users: {}", e)))?;

        Ok(users)
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            role: row.get(4)?,
            preferences: Preferences {
                favorite_genres: from_json(row.get(5)?),
                favorite_authors: from_json(row.get(6)?),
            },
            created_at: row.get(7)?,
            last_login: row.get(8)?,
        })
    }

    /// Update user password.
    pub fn update_user_password(&self, username: &str, password_hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET password_hash = ?1 WHERE username = ?2",
                params![password_hash, username],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update password: {}", e)))?;
        Ok(rows > 0)
    }

    /// Update user reading preferences.
    pub fn update_user_preferences(&self, user_id: &str, prefs: &Preferences) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET favorite_genres_json = ?1, favorite_authors_json = ?2
                 WHERE id = ?3",
                params![
                    to_json(&prefs.favorite_genres),
                    to_json(&prefs.favorite_authors),
                    user_id
                ],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update preferences: {}", e)))?;
        Ok(rows > 0)
    }

    /// Update user last login.
    pub fn update_user_last_login(&self, user_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![now_timestamp(), user_id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to update last login: {}", e)))?;
        Ok(())
    }

    /// Delete user.
    pub fn delete_user(&self, username: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM users WHERE username = ?1", params![username])
            .map_err(|e| AppError::Internal(format!("Failed to delete user: {}", e)))?;
        Ok(rows > 0)
    }

    // ========== SESSION OPERATIONS ==========

    /// Create session.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![session.token, session.user_id, session.expires_at],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create session: {}", e)))?;
        Ok(())
    }

    /// Get session by token.
    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| {
                Ok(Session {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get session: {}", e)))
    }

    /// Delete session.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .map_err(|e| AppError::Internal(format!("Failed to delete session: {}", e)))?;
        Ok(())
    }

    /// Cleanup expired sessions.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM sessions WHERE expires_at < ?1",
                params![now_timestamp()],
            )
            .map_err(|e| AppError::Internal(format!("Failed to cleanup sessions: {}", e)))?;
        Ok(rows)
    }

    // ========== CATALOG OPERATIONS ==========

    /// Insert a new catalog entry.
    ///
    /// A duplicate external id or ISBN fails with `AppError::UniqueViolation`.
    pub fn insert_entry(&self, entry: &CatalogEntry) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO catalog_entries
             (id, external_id, isbn, title, author, genres_json, published_year, description,
              cover_image, page_count, pages, language, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                entry.id,
                entry.external_id,
                entry.isbn,
                entry.title,
                entry.author,
                to_json(&entry.genres),
                entry.published_year,
                entry.description,
                entry.cover_image,
                entry.page_count,
                entry.pages,
                entry.language,
                entry.created_at,
                entry.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Overwrite an existing catalog entry. Returns false if it does not exist.
    pub fn save_entry(&self, entry: &CatalogEntry) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE catalog_entries SET
                external_id = ?2, isbn = ?3, title = ?4, author = ?5, genres_json = ?6,
                published_year = ?7, description = ?8, cover_image = ?9, page_count = ?10,
                pages = ?11, language = ?12, updated_at = ?13
             WHERE id = ?1",
            params![
                entry.id,
                entry.external_id,
                entry.isbn,
                entry.title,
                entry.author,
                to_json(&entry.genres),
                entry.published_year,
                entry.description,
                entry.cover_image,
                entry.page_count,
                entry.pages,
                entry.language,
                entry.updated_at,
            ],
        )?;
        Ok(rows > 0)
    }

    /// Get catalog entry by internal ID.
    pub fn get_entry(&self, id: &str) -> Result<Option<CatalogEntry>> {
        self.query_entry("id", id)
    }

    /// Get catalog entry by external source ID.
    pub fn get_entry_by_external_id(&self, external_id: &str) -> Result<Option<CatalogEntry>> {
        self.query_entry("external_id", external_id)
    }

    /// Get catalog entry by ISBN.
    pub fn get_entry_by_isbn(&self, isbn: &str) -> Result<Option<CatalogEntry>> {
        self.query_entry("isbn", isbn)
    }

    fn query_entry(&self, column: &str, value: &str) -> Result<Option<CatalogEntry>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM catalog_entries e WHERE e.{} = ?1",
                ENTRY_COLUMNS, column
            ),
            params![value],
            |row| Self::row_to_entry(row, 0),
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get catalog entry: {}", e)))
    }

    /// List catalog entries matching a filter, newest first, with the total match count.
    pub fn list_entries(&self, filter: &EntryFilter) -> Result<(Vec<CatalogEntry>, i64)> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(search) = &filter.search {
            clauses.push(
                "(e.title LIKE '%' || ? || '%' OR e.author LIKE '%' || ? || '%'
                  OR e.description LIKE '%' || ? || '%')",
            );
            values.extend([search.clone(), search.clone(), search.clone()]);
        }
        if let Some(genre) = &filter.genre {
            clauses.push("EXISTS (SELECT 1 FROM json_each(e.genres_json) WHERE value = ?)");
            values.push(genre.clone());
        }
        if let Some(author) = &filter.author {
            clauses.push("e.author LIKE '%' || ? || '%'");
            values.push(author.clone());
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let conn = self.conn.lock();

        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM catalog_entries e {}", where_sql),
                rusqlite::params_from_iter(values.iter()),
                |row| row.get(0),
            )
            .map_err(|e| AppError::Internal(format!("Failed to count catalog entries: {}", e)))?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM catalog_entries e {}
                 ORDER BY e.created_at DESC, e.rowid DESC
                 LIMIT {} OFFSET {}",
                ENTRY_COLUMNS, where_sql, filter.limit, filter.offset
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let entries = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), |row| {
                Self::row_to_entry(row, 0)
            })
            .map_err(|e| AppError::Internal(format!("Failed to list catalog entries: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect catalog entries: {}", e)))?;

        Ok((entries, total))
    }

    /// Count all catalog entries.
    pub fn count_entries(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM catalog_entries", [], |row| row.get(0))
            .map_err(|e| AppError::Internal(format!("Failed to count catalog entries: {}", e)))
    }

    /// Delete a catalog entry (favorites referencing it cascade).
    pub fn delete_entry(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM catalog_entries WHERE id = ?1", params![id])
            .map_err(|e| AppError::Internal(format!("Failed to delete catalog entry: {}", e)))?;
        Ok(rows > 0)
    }

    /// Helper to convert a row to CatalogEntry, starting at column `offset`.
    fn row_to_entry(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<CatalogEntry> {
        Ok(CatalogEntry {
            id: row.get(offset)?,
            external_id: row.get(offset + 1)?,
            isbn: row.get(offset + 2)?,
            title: row.get(offset + 3)?,
            author: row.get(offset + 4)?,
            genres: from_json(row.get(offset + 5)?),
            published_year: row.get(offset + 6)?,
            description: row.get(offset + 7)?,
            cover_image: row.get(offset + 8)?,
            page_count: row.get(offset + 9)?,
            pages: row.get(offset + 10)?,
            language: row.get(offset + 11)?,
            created_at: row.get(offset + 12)?,
            updated_at: row.get(offset + 13)?,
        })
    }

    // ========== FAVORITE OPERATIONS ==========

    /// Insert a new favorite.
    ///
    /// A second favorite for the same (user, entry) fails with `AppError::UniqueViolation`.
    pub fn insert_favorite(&self, favorite: &FavoriteRecord) -> Result<()> {
        let conn = self.conn.lock();
        let progress = &favorite.reading_progress;
        conn.execute(
            "INSERT INTO favorites
             (id, user_id, entry_id, status, rating, notes, review, added_at, completed_at,
              current_page, total_pages, progress_percentage, progress_updated_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                favorite.id,
                favorite.user_id,
                favorite.entry_id,
                favorite.status,
                favorite.rating,
                favorite.notes,
                favorite.review,
                favorite.added_at,
                favorite.completed_at,
                progress.current_page,
                progress.total_pages,
                progress.progress_percentage,
                progress.last_updated,
                favorite.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Persist a modified favorite. Only matches when both id and owner match.
    pub fn save_favorite(&self, favorite: &FavoriteRecord) -> Result<bool> {
        let conn = self.conn.lock();
        let progress = &favorite.reading_progress;
        let rows = conn.execute(
            "UPDATE favorites SET
                status = ?3, rating = ?4, notes = ?5, review = ?6, completed_at = ?7,
                current_page = ?8, total_pages = ?9, progress_percentage = ?10,
                progress_updated_at = ?11, updated_at = ?12
             WHERE id = ?1 AND user_id = ?2",
            params![
                favorite.id,
                favorite.user_id,
                favorite.status,
                favorite.rating,
                favorite.notes,
                favorite.review,
                favorite.completed_at,
                progress.current_page,
                progress.total_pages,
                progress.progress_percentage,
                progress.last_updated,
                favorite.updated_at,
            ],
        )?;
        Ok(rows > 0)
    }

    /// Get a favorite with its book, scoped to its owner.
    pub fn get_favorite(&self, id: &str, user_id: &str) -> Result<Option<FavoriteWithBook>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {}, {} FROM favorites f
                 JOIN catalog_entries e ON e.id = f.entry_id
                 WHERE f.id = ?1 AND f.user_id = ?2",
                FAVORITE_COLUMNS, ENTRY_COLUMNS
            ),
            params![id, user_id],
            Self::row_to_favorite,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get favorite: {}", e)))
    }

    /// Get the favorite a user holds for a catalog entry, if any.
    pub fn get_favorite_by_entry(
        &self,
        user_id: &str,
        entry_id: &str,
    ) -> Result<Option<FavoriteWithBook>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {}, {} FROM favorites f
                 JOIN catalog_entries e ON e.id = f.entry_id
                 WHERE f.user_id = ?1 AND f.entry_id = ?2",
                FAVORITE_COLUMNS, ENTRY_COLUMNS
            ),
            params![user_id, entry_id],
            Self::row_to_favorite,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get favorite: {}", e)))
    }

    /// List a user's favorites, most recently added first.
    pub fn list_favorites(
        &self,
        user_id: &str,
        status: Option<ReadingStatus>,
    ) -> Result<Vec<FavoriteWithBook>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {}, {} FROM favorites f
                 JOIN catalog_entries e ON e.id = f.entry_id
                 WHERE f.user_id = ?1 AND (?2 IS NULL OR f.status = ?2)
                 ORDER BY f.added_at DESC, f.rowid DESC",
                FAVORITE_COLUMNS, ENTRY_COLUMNS
            ))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let favorites = stmt
            .query_map(params![user_id, status], Self::row_to_favorite)
            .map_err(|e| AppError::Internal(format!("Failed to list favorites: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect favorites: {}", e)))?;

        Ok(favorites)
    }

    /// Delete a favorite, scoped to its owner.
    pub fn delete_favorite(&self, id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM favorites WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to delete favorite: {}", e)))?;
        Ok(rows > 0)
    }

    /// Helper to convert a joined favorite row.
    fn row_to_favorite(row: &rusqlite::Row<'_>) -> rusqlite::Result<FavoriteWithBook> {
        let favorite = FavoriteRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            entry_id: row.get(2)?,
            status: row.get(3)?,
            rating: row.get(4)?,
            notes: row.get(5)?,
            review: row.get(6)?,
            added_at: row.get(7)?,
            completed_at: row.get(8)?,
            reading_progress: ReadingProgress {
                current_page: row.get(9)?,
                total_pages: row.get(10)?,
                progress_percentage: row.get(11)?,
                last_updated: row.get(12)?,
            },
            updated_at: row.get(13)?,
        };
        let book = Self::row_to_entry(row, ENTRY_COLUMN_COUNT)?;

        Ok(FavoriteWithBook { favorite, book })
    }
}

/// Encode a string list as a JSON column (NULL when empty).
fn to_json(values: &[String]) -> Option<String> {
    if values.is_empty() {
        None
    } else {
        serde_json::to_string(values).ok()
    }
}

/// Decode a JSON string-list column.
fn from_json(value: Option<String>) -> Vec<String> {
    value
        .as_deref()
        .and_then(|j| serde_json::from_str::<Vec<String>>(j).ok())
        .unwrap_or_default()
}
