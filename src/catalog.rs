//! Book catalog: the local store of [`CatalogEntry`] rows, the resolver that
//! materializes entries from the external source, and external browsing.

mod entries;
mod resolver;
mod search;

pub use entries::{EntryChanges, EntryQuery, NewEntry};
pub use resolver::{BookDetails, CatalogResolver, UNKNOWN_AUTHOR, UNKNOWN_TITLE};
pub use search::{
    ExternalBook, SearchQuery, TRENDING_SUBJECTS, pick_trending_subject, subject_books,
    trending_books,
};

use crate::db::{CatalogEntry, Database};
use serde::Serialize;

/// Default page size for listings.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest accepted page size.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Paging envelope shared by local and external listings.
#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    /// Items on this page.
    pub books: Vec<T>,
    /// Total matches.
    pub total: i64,
    /// 1-based page number.
    pub page: u32,
    /// Number of pages.
    pub pages: i64,
}

impl<T> Paged<T> {
    /// Wrap one page of results.
    pub fn new(books: Vec<T>, total: i64, page: u32, limit: u32) -> Self {
        let limit = i64::from(limit.max(1));
        Self {
            books,
            total,
            page,
            pages: (total.max(0) + limit - 1) / limit,
        }
    }
}

/// Clamp user paging input to sane values.
pub fn clamp_paging(page: Option<u32>, limit: Option<u32>) -> (u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, limit)
}

/// Strip a namespace prefix from an external id: `/works/OL1W` -> `OL1W`.
pub fn normalize_external_id(id: &str) -> String {
    let id = id.trim();
    let id = id.strip_prefix('/').unwrap_or(id);
    for prefix in ["works/", "subjects/"] {
        if let Some(rest) = id.strip_prefix(prefix) {
            return rest.to_string();
        }
    }
    id.to_string()
}

/// Whether a book reference is an internal catalog id.
pub fn is_internal_id(book_ref: &str) -> bool {
    book_ref.len() == 36 && uuid::Uuid::parse_str(book_ref).is_ok()
}

/// Catalog service: local administration plus external browsing.
#[derive(Clone)]
pub struct Catalog {
    db: Database,
    resolver: CatalogResolver,
}

impl Catalog {
    /// Create a catalog service.
    pub fn new(db: Database, resolver: CatalogResolver) -> Self {
        Self { db, resolver }
    }

    /// The resolver backing this catalog.
    pub fn resolver(&self) -> &CatalogResolver {
        &self.resolver
    }

    /// Look up a local entry by internal id.
    pub fn get_entry(&self, id: &str) -> crate::Result<CatalogEntry> {
        self.db
            .get_entry(id)?
            .ok_or_else(|| crate::AppError::NotFound(format!("Book {}", id)))
    }
}
