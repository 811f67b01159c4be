use super::{Catalog, Paged, clamp_paging, normalize_external_id};
use crate::db::{CatalogEntry, EntryFilter, now_timestamp};
use crate::error::{AppError, Result};
use chrono::{Datelike, Utc};
use serde::Deserialize;

const MAX_TITLE_LEN: usize = 200;
const MAX_AUTHOR_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 5000;
const MIN_YEAR: i32 = 1000;

/// Input for creating a catalog entry by hand.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEntry {
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// ISBN.
    pub isbn: Option<String>,
    /// External work id.
    pub external_id: Option<String>,
    /// Genre tags.
    #[serde(default)]
    pub genres: Vec<String>,
    /// Publication year.
    pub published_year: Option<i32>,
    /// Description.
    pub description: Option<String>,
    /// Cover image URL.
    pub cover_image: Option<String>,
    /// Page count.
    pub page_count: Option<i64>,
    /// Median page count reported by search results.
    pub pages: Option<i64>,
    /// Language code, defaults to "en".
    pub language: Option<String>,
}

/// Partial update of a catalog entry. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryChanges {
    /// Title.
    pub title: Option<String>,
    /// Author.
    pub author: Option<String>,
    /// ISBN.
    pub isbn: Option<String>,
    /// External work id.
    pub external_id: Option<String>,
    /// Genre tags.
    pub genres: Option<Vec<String>>,
    /// Publication year.
    pub published_year: Option<i32>,
    /// Description.
    pub description: Option<String>,
    /// Cover image URL.
    pub cover_image: Option<String>,
    /// Page count.
    pub page_count: Option<i64>,
    /// Median page count reported by search results.
    pub pages: Option<i64>,
    /// Language code.
    pub language: Option<String>,
}

/// Local catalog listing parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryQuery {
    /// Text matched against title, author and description.
    pub search: Option<String>,
    /// Exact genre.
    pub genre: Option<String>,
    /// Author substring.
    pub author: Option<String>,
    /// 1-based page.
    pub page: Option<u32>,
    /// Page size.
    pub limit: Option<u32>,
}

fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{} cannot exceed {} characters",
            field, max
        )));
    }
    Ok(())
}

/// Validate and normalize an entry before it is stored.
fn validate(entry: &mut CatalogEntry) -> Result<()> {
    entry.title = entry.title.trim().to_string();
    entry.author = entry.author.trim().to_string();

    if entry.title.is_empty() {
        return Err(AppError::Validation("Title is required".to_string()));
    }
    if entry.author.is_empty() {
        return Err(AppError::Validation("Author is required".to_string()));
    }
    check_len("Title", &entry.title, MAX_TITLE_LEN)?;
    check_len("Author", &entry.author, MAX_AUTHOR_LEN)?;
    if let Some(description) = &entry.description {
        check_len("Description", description, MAX_DESCRIPTION_LEN)?;
    }

    if let Some(year) = entry.published_year {
        let max_year = Utc::now().year() + 1;
        if !(MIN_YEAR..=max_year).contains(&year) {
            return Err(AppError::Validation(format!(
                "Published year must be between {} and {}",
                MIN_YEAR, max_year
            )));
        }
    }

    if entry.page_count.is_some_and(|p| p < 0) || entry.pages.is_some_and(|p| p < 0) {
        return Err(AppError::Validation(
            "Page count cannot be negative".to_string(),
        ));
    }

    entry.language = entry.language.trim().to_lowercase();
    if entry.language.is_empty() {
        entry.language = "en".to_string();
    }

    entry.isbn = entry
        .isbn
        .take()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty());
    entry.external_id = entry
        .external_id
        .take()
        .map(|id| normalize_external_id(&id))
        .filter(|id| !id.is_empty());
    entry.genres = entry
        .genres
        .iter()
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .collect();

    Ok(())
}

fn duplicate(e: AppError) -> AppError {
    match e {
        AppError::UniqueViolation(_) => AppError::AlreadyExists(
            "A book with this external id or ISBN already exists".to_string(),
        ),
        other => other,
    }
}

impl Catalog {
    /// Create a catalog entry from administrative input.
    pub fn create_entry(&self, input: NewEntry) -> Result<CatalogEntry> {
        let now = now_timestamp();
        let mut entry = CatalogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            external_id: input.external_id,
            isbn: input.isbn,
            title: input.title,
            author: input.author,
            genres: input.genres,
            published_year: input.published_year,
            description: input.description,
            cover_image: input.cover_image,
            page_count: input.page_count,
            pages: input.pages,
            language: input.language.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        validate(&mut entry)?;

        self.db.insert_entry(&entry).map_err(duplicate)?;
        tracing::info!(entry = %entry.id, title = %entry.title, "Catalog entry created");
        Ok(entry)
    }

    /// Apply a partial update to a catalog entry.
    pub fn update_entry(&self, id: &str, changes: EntryChanges) -> Result<CatalogEntry> {
        let mut entry = self.get_entry(id)?;

        if let Some(title) = changes.title {
            entry.title = title;
        }
        if let Some(author) = changes.author {
            entry.author = author;
        }
        if changes.isbn.is_some() {
            entry.isbn = changes.isbn;
        }
        if changes.external_id.is_some() {
            entry.external_id = changes.external_id;
        }
        if let Some(genres) = changes.genres {
            entry.genres = genres;
        }
        if changes.published_year.is_some() {
            entry.published_year = changes.published_year;
        }
        if changes.description.is_some() {
            entry.description = changes.description;
        }
        if changes.cover_image.is_some() {
            entry.cover_image = changes.cover_image;
        }
        if changes.page_count.is_some() {
            entry.page_count = changes.page_count;
        }
        if changes.pages.is_some() {
            entry.pages = changes.pages;
        }
        if let Some(language) = changes.language {
            entry.language = language;
        }
        validate(&mut entry)?;

        entry.updated_at = now_timestamp();
        if !self.db.save_entry(&entry).map_err(duplicate)? {
            return Err(AppError::NotFound(format!("Book {}", id)));
        }
        Ok(entry)
    }

    /// Delete a catalog entry. Returns false when it did not exist.
    pub fn delete_entry(&self, id: &str) -> Result<bool> {
        let deleted = self.db.delete_entry(id)?;
        if deleted {
            tracing::info!(entry = %id, "Catalog entry deleted");
        }
        Ok(deleted)
    }

    /// List local entries, newest first.
    pub fn list_entries(&self, query: &EntryQuery) -> Result<Paged<CatalogEntry>> {
        let (page, limit) = clamp_paging(query.page, query.limit);
        let clean = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let filter = EntryFilter {
            search: clean(&query.search),
            genre: clean(&query.genre),
            author: clean(&query.author),
            offset: i64::from(page - 1) * i64::from(limit),
            limit: i64::from(limit),
        };

        let (books, total) = self.db.list_entries(&filter)?;
        Ok(Paged::new(books, total, page, limit))
    }
}
