use super::{is_internal_id, normalize_external_id};
use crate::config::SourceConfig;
use crate::db::{CatalogEntry, Database, now_timestamp};
use crate::error::{AppError, Result};
use crate::source::{BookSource, CoverRef, CoverSize, SourceError};
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};

/// Author name stored when the author lookup fails.
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// Title stored when the work record has none.
pub const UNKNOWN_TITLE: &str = "Unknown Title";

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("valid regex"));

/// Bibliographic detail resolved from the external source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookDetails {
    /// Normalized external id.
    pub external_id: String,
    /// Title.
    pub title: String,
    /// Author name.
    pub author: String,
    /// Author biography.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_bio: Option<String>,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Large cover URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    /// Subject tags, capped.
    pub subjects: Vec<String>,
    /// First publication year.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i32>,
    /// Page count from the work record or the edition median.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<i64>,
}

/// Upper median of the positive values.
pub fn median_page_count(mut counts: Vec<i64>) -> Option<i64> {
    counts.retain(|p| *p > 0);
    if counts.is_empty() {
        return None;
    }
    counts.sort_unstable();
    Some(counts[counts.len() / 2])
}

/// First four-digit year in a free-form date.
pub fn parse_year(date: &str) -> Option<i32> {
    YEAR_RE
        .captures(date)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Maps book references to local catalog entries, materializing unseen
/// external works on first use.
#[derive(Clone)]
pub struct CatalogResolver {
    db: Database,
    source: Arc<dyn BookSource>,
    edition_sample: usize,
    max_subjects: usize,
}

impl CatalogResolver {
    /// Create a resolver.
    pub fn new(db: Database, source: Arc<dyn BookSource>, config: &SourceConfig) -> Self {
        Self {
            db,
            source,
            edition_sample: config.edition_sample,
            max_subjects: config.max_subjects,
        }
    }

    /// The external source.
    pub fn source(&self) -> &dyn BookSource {
        self.source.as_ref()
    }

    /// Resolve an internal id or external id to a catalog entry.
    pub async fn resolve(&self, book_ref: &str) -> Result<CatalogEntry> {
        self.resolve_with_pages(book_ref, None).await
    }

    /// Like [`resolve`](Self::resolve), carrying the median page count seen in
    /// search results. The hint is stored in `pages` when the work is
    /// materialized by this call.
    pub async fn resolve_with_pages(
        &self,
        book_ref: &str,
        pages_hint: Option<i64>,
    ) -> Result<CatalogEntry> {
        let book_ref = book_ref.trim();
        if book_ref.is_empty() {
            return Err(AppError::Validation("Book id is required".to_string()));
        }

        if is_internal_id(book_ref) {
            return self
                .db
                .get_entry(book_ref)?
                .ok_or_else(|| AppError::NotFound(format!("Book {}", book_ref)));
        }

        let external_id = normalize_external_id(book_ref);
        if let Some(entry) = self.db.get_entry_by_external_id(&external_id)? {
            return Ok(entry);
        }

        self.materialize(&external_id, pages_hint).await
    }

    /// Fetch detail for an external work without persisting anything.
    pub async fn details(&self, external_id: &str) -> Result<BookDetails> {
        let external_id = normalize_external_id(external_id);
        self.fetch_details(&external_id)
            .await
            .map_err(|e| match e {
                SourceError::NotFound(_) => {
                    AppError::NotFound(format!("Book {} not found in external source", external_id))
                }
                other => AppError::ExternalSource {
                    id: external_id.clone(),
                    message: other.to_string(),
                },
            })
    }

    /// Fill in a missing page count from the external source.
    ///
    /// Returns the updated entry when a new positive page count was stored,
    /// `None` when there was nothing to do.
    pub async fn backfill_page_count(
        &self,
        entry: &CatalogEntry,
    ) -> Result<Option<CatalogEntry>> {
        if entry.page_count.is_some() {
            return Ok(None);
        }
        let Some(external_id) = entry.external_id.as_deref() else {
            return Ok(None);
        };

        let details = self
            .fetch_details(external_id)
            .await
            .map_err(|e| AppError::ExternalSource {
                id: external_id.to_string(),
                message: e.to_string(),
            })?;

        match details.page_count {
            Some(pages) if pages > 0 => {
                let updated = CatalogEntry {
                    page_count: Some(pages),
                    updated_at: now_timestamp(),
                    ..entry.clone()
                };
                self.db.save_entry(&updated)?;
                tracing::info!(entry = %entry.id, pages, "Backfilled page count");
                Ok(Some(updated))
            }
            _ => Ok(None),
        }
    }

    async fn materialize(
        &self,
        external_id: &str,
        pages_hint: Option<i64>,
    ) -> Result<CatalogEntry> {
        tracing::debug!(external_id, "Materializing catalog entry");

        let details = self
            .fetch_details(external_id)
            .await
            .map_err(|e| AppError::ExternalSource {
                id: external_id.to_string(),
                message: e.to_string(),
            })?;

        let now = now_timestamp();
        let entry = CatalogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            external_id: Some(details.external_id),
            isbn: None,
            title: details.title,
            author: details.author,
            genres: details.subjects,
            published_year: details.published_year,
            description: details.description,
            cover_image: details.cover_image,
            page_count: details.page_count,
            pages: pages_hint.filter(|p| *p > 0),
            language: "en".to_string(),
            created_at: now,
            updated_at: now,
        };

        match self.db.insert_entry(&entry) {
            Ok(()) => {
                tracing::info!(
                    external_id,
                    entry = %entry.id,
                    page_count = ?entry.page_count,
                    pages = ?entry.pages,
                    "Materialized catalog entry"
                );
                Ok(entry)
            }
            Err(AppError::UniqueViolation(_)) => {
                // Another request materialized the same work first
                tracing::debug!(external_id, "Catalog entry already created, re-reading");
                self.db
                    .get_entry_by_external_id(external_id)?
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "Catalog entry for {} vanished after unique violation",
                            external_id
                        ))
                    })
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve full detail for a normalized external id.
    ///
    /// Only the work lookup is fatal; author and edition lookups degrade.
    async fn fetch_details(
        &self,
        external_id: &str,
    ) -> std::result::Result<BookDetails, SourceError> {
        let work = self.source.work_detail(external_id).await?;

        let (author, author_bio) = match work.author_keys.first() {
            Some(key) => match self.source.author_detail(key).await {
                Ok(author) => (author.name, author.bio),
                Err(e) => {
                    tracing::warn!(external_id, author = %key, error = %e, "Author lookup failed");
                    (UNKNOWN_AUTHOR.to_string(), None)
                }
            },
            None => (UNKNOWN_AUTHOR.to_string(), None),
        };

        let page_count = match work.page_count.filter(|p| *p > 0) {
            Some(pages) => Some(pages),
            None => match self
                .source
                .edition_page_counts(external_id, self.edition_sample)
                .await
            {
                Ok(counts) => median_page_count(counts),
                Err(e) => {
                    tracing::warn!(external_id, error = %e, "Edition page count lookup failed");
                    None
                }
            },
        };

        let cover_image = work
            .cover_ids
            .first()
            .map(|id| self.source.cover_url(&CoverRef::Id(*id), CoverSize::Large));

        Ok(BookDetails {
            external_id: external_id.to_string(),
            title: work
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            author,
            author_bio,
            description: work.description.filter(|d| !d.trim().is_empty()),
            cover_image,
            subjects: work.subjects.into_iter().take(self.max_subjects).collect(),
            published_year: work.first_publish_date.as_deref().and_then(parse_year),
            page_count,
        })
    }
}
