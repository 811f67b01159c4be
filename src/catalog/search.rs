use super::{BookDetails, Catalog, Paged, clamp_paging, normalize_external_id};
use crate::error::{AppError, Result};
use crate::source::{BookSource, CoverRef, CoverSize, SourceBook, SourceError};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

/// Subjects browsed when no query or genre is given.
pub const TRENDING_SUBJECTS: [&str; 5] = [
    "fiction",
    "fantasy",
    "science_fiction",
    "mystery",
    "romance",
];

/// Genre tags kept on a listed book.
const LISTED_GENRES: usize = 5;

/// External search parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    /// Free-text query.
    pub search: Option<String>,
    /// Subject to browse when there is no query.
    pub genre: Option<String>,
    /// 1-based page.
    pub page: Option<u32>,
    /// Page size.
    pub limit: Option<u32>,
}

/// A book from the external source, shaped for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalBook {
    /// Normalized external id, usable as a favorite book reference.
    pub external_id: String,
    /// Title.
    pub title: String,
    /// First listed author.
    pub author: String,
    /// First author id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_key: Option<String>,
    /// First publication year.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_year: Option<i32>,
    /// First ISBN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    /// Medium cover URL, from the cover id or else the ISBN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    /// Up to five subject tags.
    pub genres: Vec<String>,
    /// Language code.
    pub language: String,
    /// First publisher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    /// Median page count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<i64>,
    /// Average reader rating.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
}

impl ExternalBook {
    /// Shape a source listing entry.
    pub fn from_source(book: &SourceBook, source: &dyn BookSource) -> Self {
        let isbn = book.isbns.first().cloned();
        let cover = match (book.cover_id, &isbn) {
            (Some(id), _) => Some(CoverRef::Id(id)),
            (None, Some(isbn)) => Some(CoverRef::Isbn(isbn.clone())),
            (None, None) => None,
        };

        Self {
            external_id: normalize_external_id(&book.key),
            title: book
                .title
                .clone()
                .unwrap_or_else(|| super::UNKNOWN_TITLE.to_string()),
            author: book
                .author_names
                .first()
                .cloned()
                .unwrap_or_else(|| super::UNKNOWN_AUTHOR.to_string()),
            author_key: book.author_keys.first().cloned(),
            published_year: book.first_publish_year,
            isbn,
            cover_image: cover.map(|c| source.cover_url(&c, CoverSize::Medium)),
            genres: book.subjects.iter().take(LISTED_GENRES).cloned().collect(),
            language: book
                .languages
                .first()
                .cloned()
                .unwrap_or_else(|| "en".to_string()),
            publisher: book.publishers.first().cloned(),
            pages: book.median_pages,
            average_rating: book.ratings_average,
        }
    }
}

/// Pick one of the trending subjects at random.
pub fn pick_trending_subject() -> &'static str {
    TRENDING_SUBJECTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(TRENDING_SUBJECTS[0])
}

/// First page of books under a subject.
pub async fn subject_books(
    source: &dyn BookSource,
    subject: &str,
    limit: u32,
) -> std::result::Result<Vec<ExternalBook>, SourceError> {
    let page = source.search_by_subject(subject, 1, limit).await?;
    Ok(page
        .entries
        .iter()
        .map(|b| ExternalBook::from_source(b, source))
        .collect())
}

/// First page of a randomly chosen trending subject.
pub async fn trending_books(
    source: &dyn BookSource,
    limit: u32,
) -> std::result::Result<Vec<ExternalBook>, SourceError> {
    subject_books(source, pick_trending_subject(), limit).await
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Catalog {
    /// Browse the external source: text search, then subject, then trending.
    pub async fn search(&self, query: &SearchQuery) -> Result<Paged<ExternalBook>> {
        let (page, limit) = clamp_paging(query.page, query.limit);
        let source = self.resolver.source();

        let (label, result) = if let Some(text) = non_empty(&query.search) {
            (text, source.search_by_query(text, page, limit).await)
        } else if let Some(genre) = non_empty(&query.genre) {
            (genre, source.search_by_subject(genre, page, limit).await)
        } else {
            let subject = pick_trending_subject();
            (subject, source.search_by_subject(subject, page, limit).await)
        };

        let result = result.map_err(|e| AppError::ExternalSource {
            id: label.to_string(),
            message: e.to_string(),
        })?;

        let books = result
            .entries
            .iter()
            .map(|b| ExternalBook::from_source(b, source))
            .collect();

        Ok(Paged::new(books, result.total_count, page, limit))
    }

    /// Detail for an external work, without adding it to the catalog.
    pub async fn details(&self, external_id: &str) -> Result<BookDetails> {
        self.resolver.details(external_id).await
    }
}
