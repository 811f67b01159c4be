//! External bibliographic source.
//!
//! The resolver and the search endpoints only see the [`BookSource`] trait;
//! [`openlibrary::OpenLibraryClient`] is the production implementation.

pub mod openlibrary;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use openlibrary::OpenLibraryClient;

/// Failure talking to the external source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The source has no record for this id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Network failure, timeout or unexpected HTTP status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Decode(e.to_string())
        } else {
            SourceError::Transport(e.to_string())
        }
    }
}

/// One book as it appears in search or subject listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceBook {
    /// Raw work key, possibly namespaced (`/works/OL1W`).
    pub key: String,
    /// Title.
    pub title: Option<String>,
    /// Author display names.
    pub author_names: Vec<String>,
    /// Author ids, without namespace.
    pub author_keys: Vec<String>,
    /// First publication year.
    pub first_publish_year: Option<i32>,
    /// Known ISBNs.
    pub isbns: Vec<String>,
    /// Cover image id.
    pub cover_id: Option<i64>,
    /// Subject tags.
    pub subjects: Vec<String>,
    /// Language codes.
    pub languages: Vec<String>,
    /// Publishers.
    pub publishers: Vec<String>,
    /// Median page count across editions.
    pub median_pages: Option<i64>,
    /// Average reader rating.
    pub ratings_average: Option<f64>,
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    /// Results on this page.
    pub entries: Vec<SourceBook>,
    /// Total matches reported by the source.
    pub total_count: i64,
}

/// Detail record for a single work.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkDetail {
    /// Title.
    pub title: Option<String>,
    /// Description text.
    pub description: Option<String>,
    /// Cover image ids.
    pub cover_ids: Vec<i64>,
    /// Subject tags.
    pub subjects: Vec<String>,
    /// Author ids, without namespace.
    pub author_keys: Vec<String>,
    /// Free-form first publish date, e.g. "1954" or "July 29, 1954".
    pub first_publish_date: Option<String>,
    /// Page count when the work record carries one.
    pub page_count: Option<i64>,
}

/// Detail record for an author.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthorDetail {
    /// Display name.
    pub name: String,
    /// Biography.
    pub bio: Option<String>,
}

/// Reference to a cover image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverRef {
    /// Cover id.
    Id(i64),
    /// Cover looked up by ISBN.
    Isbn(String),
}

/// Cover image size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverSize {
    /// Small thumbnail.
    Small,
    /// Medium, used in listings.
    Medium,
    /// Large, used on detail pages.
    Large,
}

impl CoverSize {
    /// Size suffix used in cover URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverSize::Small => "S",
            CoverSize::Medium => "M",
            CoverSize::Large => "L",
        }
    }
}

/// Capability interface of an external bibliographic catalog.
///
/// `page` is 1-based in both search operations.
#[async_trait]
pub trait BookSource: Send + Sync {
    /// Free-text search.
    async fn search_by_query(
        &self,
        text: &str,
        page: u32,
        page_size: u32,
    ) -> Result<SearchPage, SourceError>;

    /// Books filed under a subject.
    async fn search_by_subject(
        &self,
        subject: &str,
        page: u32,
        page_size: u32,
    ) -> Result<SearchPage, SourceError>;

    /// Work detail by normalized external id.
    async fn work_detail(&self, external_id: &str) -> Result<WorkDetail, SourceError>;

    /// Author detail by author id.
    async fn author_detail(&self, author_id: &str) -> Result<AuthorDetail, SourceError>;

    /// Page counts of up to `sample_size` editions of a work.
    async fn edition_page_counts(
        &self,
        external_id: &str,
        sample_size: usize,
    ) -> Result<Vec<i64>, SourceError>;

    /// Cover image URL. Pure, no network.
    fn cover_url(&self, cover: &CoverRef, size: CoverSize) -> String;
}
