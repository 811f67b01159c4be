//! Favorite reconciliation engine.
//!
//! Every write goes through the same steps: load the record together with its
//! catalog entry (scoped to the owner), resync the page total from the entry,
//! apply the change, re-derive progress, then persist.

use crate::catalog::CatalogResolver;
use crate::db::{CatalogEntry, Database, FavoriteRecord, FavoriteWithBook, now_timestamp};
use crate::error::{AppError, Result};
use crate::progress::{ReadingProgress, ReadingStatus, UNKNOWN_TOTAL_PAGES, auto_transition};
use crate::stats::{Statistics, reduce};
use serde::Deserialize;

const MAX_NOTES_LEN: usize = 1000;
const MAX_REVIEW_LEN: usize = 2000;

/// Input for adding a book to a user's favorites.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewFavorite {
    /// Internal catalog id or external work id.
    #[serde(alias = "bookId")]
    pub book_id: String,
    /// Initial status, defaults to want_to_read.
    pub status: Option<String>,
    /// Rating 1-5.
    pub rating: Option<f64>,
    /// Private notes.
    pub notes: Option<String>,
    /// Review.
    pub review: Option<String>,
    /// Median page count shown in search results, kept on a newly
    /// materialized entry.
    pub pages: Option<i64>,
}

/// Partial update of a favorite. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FavoriteChanges {
    /// New status.
    pub status: Option<String>,
    /// Rating 1-5.
    pub rating: Option<f64>,
    /// Private notes.
    pub notes: Option<String>,
    /// Review.
    pub review: Option<String>,
}

/// Progress tick.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ProgressUpdate {
    /// Page the reader is on.
    #[serde(alias = "currentPage")]
    pub current_page: i64,
}

fn parse_status(status: Option<&str>) -> Result<Option<ReadingStatus>> {
    status.map(str::parse).transpose()
}

fn parse_rating(rating: Option<f64>) -> Result<Option<u8>> {
    match rating {
        None => Ok(None),
        Some(r) if r.fract() == 0.0 && (1.0..=5.0).contains(&r) => Ok(Some(r as u8)),
        Some(r) => Err(AppError::Validation(format!(
            "Rating must be an integer between 1 and 5, got {}",
            r
        ))),
    }
}

fn check_text(field: &str, value: Option<&String>, max: usize) -> Result<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(AppError::Validation(format!(
            "{} cannot exceed {} characters",
            field, max
        ))),
        _ => Ok(()),
    }
}

/// Progress total for an entry, and whether it is a real page count.
fn page_total(entry: &CatalogEntry) -> (i64, bool) {
    match entry.known_page_count() {
        Some(total) => (total, true),
        None => (UNKNOWN_TOTAL_PAGES, false),
    }
}

fn not_found(favorite_id: &str) -> AppError {
    AppError::NotFound(format!("Favorite {}", favorite_id))
}

/// Favorites service.
#[derive(Clone)]
pub struct FavoriteService {
    db: Database,
    resolver: CatalogResolver,
}

impl FavoriteService {
    /// Create a new favorites service.
    pub fn new(db: Database, resolver: CatalogResolver) -> Self {
        Self { db, resolver }
    }

    /// Add a book to a user's favorites, materializing it if needed.
    pub async fn create(&self, user_id: &str, input: NewFavorite) -> Result<FavoriteWithBook> {
        let status = parse_status(input.status.as_deref())?.unwrap_or_default();
        let rating = parse_rating(input.rating)?;
        check_text("Notes", input.notes.as_ref(), MAX_NOTES_LEN)?;
        check_text("Review", input.review.as_ref(), MAX_REVIEW_LEN)?;

        let entry = self
            .resolver
            .resolve_with_pages(&input.book_id, input.pages)
            .await?;

        if self.db.get_favorite_by_entry(user_id, &entry.id)?.is_some() {
            return Err(AppError::AlreadyExists(
                "Book already in favorites".to_string(),
            ));
        }

        let now = now_timestamp();
        let (total, _) = page_total(&entry);
        let mut favorite = FavoriteRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            entry_id: entry.id.clone(),
            status,
            rating,
            notes: input.notes,
            review: input.review,
            added_at: now,
            completed_at: None,
            reading_progress: ReadingProgress::initialize(total, now),
            updated_at: now,
        };
        favorite.stamp_completion(now);

        self.db.insert_favorite(&favorite).map_err(|e| match e {
            AppError::UniqueViolation(_) => {
                AppError::AlreadyExists("Book already in favorites".to_string())
            }
            other => other,
        })?;

        tracing::info!(
            user = %user_id,
            favorite = %favorite.id,
            entry = %entry.id,
            total_pages = total,
            "Favorite created"
        );

        Ok(FavoriteWithBook {
            favorite,
            book: entry,
        })
    }

    /// List a user's favorites, newest first.
    ///
    /// Entries without a page count are backfilled from the external source
    /// on the way out; failures there are logged and skipped.
    pub async fn list(
        &self,
        user_id: &str,
        status: Option<ReadingStatus>,
    ) -> Result<Vec<FavoriteWithBook>> {
        let mut favorites = self.db.list_favorites(user_id, status)?;

        for item in favorites.iter_mut() {
            if item.book.page_count.is_none() && item.book.external_id.is_some() {
                match self.resolver.backfill_page_count(&item.book).await {
                    Ok(Some(updated)) => item.book = updated,
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(
                            entry = %item.book.id,
                            error = %e,
                            "Page count backfill failed"
                        );
                    }
                }
            }

            let Some(total) = item.book.known_page_count() else {
                continue;
            };
            let resynced = item.favorite.reading_progress.resync_total(total);
            if resynced != item.favorite.reading_progress {
                item.favorite.reading_progress = resynced;
                item.favorite.updated_at = now_timestamp();
                if let Err(e) = self.db.save_favorite(&item.favorite) {
                    tracing::warn!(
                        favorite = %item.favorite.id,
                        error = %e,
                        "Failed to persist resynced progress"
                    );
                }
            }
        }

        Ok(favorites)
    }

    /// All of a user's favorites as stored, without enrichment.
    pub fn snapshot(&self, user_id: &str) -> Result<Vec<FavoriteWithBook>> {
        self.db.list_favorites(user_id, None)
    }

    /// Get one favorite, scoped to its owner.
    pub fn get(&self, favorite_id: &str, user_id: &str) -> Result<FavoriteWithBook> {
        self.db
            .get_favorite(favorite_id, user_id)?
            .ok_or_else(|| not_found(favorite_id))
    }

    /// Apply a partial update. The page total is always resynced, falling back
    /// to the sentinel when the entry no longer has a page count.
    pub fn update(
        &self,
        favorite_id: &str,
        user_id: &str,
        changes: FavoriteChanges,
    ) -> Result<FavoriteWithBook> {
        let status = parse_status(changes.status.as_deref())?;
        let rating = parse_rating(changes.rating)?;
        check_text("Notes", changes.notes.as_ref(), MAX_NOTES_LEN)?;
        check_text("Review", changes.review.as_ref(), MAX_REVIEW_LEN)?;

        let FavoriteWithBook { mut favorite, book } = self.get(favorite_id, user_id)?;

        if let Some(status) = status {
            favorite.status = status;
        }
        if rating.is_some() {
            favorite.rating = rating;
        }
        if changes.notes.is_some() {
            favorite.notes = changes.notes;
        }
        if changes.review.is_some() {
            favorite.review = changes.review;
        }

        let (total, _) = page_total(&book);
        favorite.reading_progress = favorite
            .reading_progress
            .resync_total(total)
            .recalculated();

        let now = now_timestamp();
        favorite.stamp_completion(now);
        favorite.updated_at = now;

        self.persist(favorite, book)
    }

    /// Record the current page and apply automatic status transitions.
    ///
    /// The total is resynced from the catalog first. An entry whose page
    /// count is no longer known falls back to the sentinel total, which
    /// keeps the favorite from completing.
    pub fn update_progress(
        &self,
        favorite_id: &str,
        user_id: &str,
        current_page: i64,
    ) -> Result<FavoriteWithBook> {
        if current_page < 0 {
            return Err(AppError::Validation(
                "Current page cannot be negative".to_string(),
            ));
        }

        let FavoriteWithBook { mut favorite, book } = self.get(favorite_id, user_id)?;

        let now = now_timestamp();
        let (total, total_known) = page_total(&book);
        let progress = favorite
            .reading_progress
            .resync_total(total)
            .set_current_page(current_page, now);

        let status = auto_transition(favorite.status, &progress, total_known);
        if status != favorite.status {
            tracing::debug!(
                favorite = %favorite.id,
                from = %favorite.status,
                to = %status,
                "Status advanced by progress"
            );
        }

        favorite.status = status;
        favorite.reading_progress = progress;
        favorite.stamp_completion(now);
        favorite.updated_at = now;

        self.persist(favorite, book)
    }

    /// Delete a favorite. Returns false when nothing was removed.
    pub fn delete(&self, favorite_id: &str, user_id: &str) -> Result<bool> {
        let deleted = self.db.delete_favorite(favorite_id, user_id)?;
        if deleted {
            tracing::info!(user = %user_id, favorite = %favorite_id, "Favorite deleted");
        }
        Ok(deleted)
    }

    /// Reading statistics for a user.
    pub fn statistics(&self, user_id: &str) -> Result<Statistics> {
        Ok(reduce(&self.snapshot(user_id)?))
    }

    fn persist(&self, favorite: FavoriteRecord, book: CatalogEntry) -> Result<FavoriteWithBook> {
        if !self.db.save_favorite(&favorite)? {
            return Err(not_found(&favorite.id));
        }
        Ok(FavoriteWithBook { favorite, book })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rating() {
        assert_eq!(parse_rating(None).unwrap(), None);
        assert_eq!(parse_rating(Some(1.0)).unwrap(), Some(1));
        assert_eq!(parse_rating(Some(5.0)).unwrap(), Some(5));
        assert!(parse_rating(Some(0.0)).is_err());
        assert!(parse_rating(Some(6.0)).is_err());
        assert!(parse_rating(Some(3.5)).is_err());
        assert!(parse_rating(Some(f64::NAN)).is_err());
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status(None).unwrap(), None);
        assert_eq!(
            parse_status(Some("reading")).unwrap(),
            Some(ReadingStatus::Reading)
        );
        assert!(matches!(
            parse_status(Some("READING")),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_check_text() {
        let ok = "n".repeat(MAX_NOTES_LEN);
        let long = "n".repeat(MAX_NOTES_LEN + 1);
        assert!(check_text("Notes", Some(&ok), MAX_NOTES_LEN).is_ok());
        assert!(check_text("Notes", Some(&long), MAX_NOTES_LEN).is_err());
        assert!(check_text("Notes", None, MAX_NOTES_LEN).is_ok());
    }
}
