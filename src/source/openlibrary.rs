use super::{
    AuthorDetail, BookSource, CoverRef, CoverSize, SearchPage, SourceBook, SourceError,
    WorkDetail,
};
use crate::config::SourceConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

const SEARCH_FIELDS: &str = "key,title,author_name,author_key,first_publish_year,isbn,cover_i,\
subject,language,publisher,number_of_pages_median,ratings_average";

/// Open Library HTTP client.
pub struct OpenLibraryClient {
    base_url: String,
    covers_url: String,
    http: Client,
}

impl OpenLibraryClient {
    /// Build a client with the configured timeout and user agent.
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SourceError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            covers_url: config.covers_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "Open Library request");

        let response = self.http.get(&url).query(query).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(SourceError::Transport(format!("{} returned {}", path, status)));
        }

        let body = response.text().await?;
        decode(&body)
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, SourceError> {
    serde_json::from_str(body).map_err(|e| SourceError::Decode(e.to_string()))
}

fn offset(page: u32, page_size: u32) -> u32 {
    page.saturating_sub(1) * page_size
}

/// Subject path segment: "Science Fiction" -> "science_fiction".
fn subject_slug(subject: &str) -> String {
    subject
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

fn strip_author_prefix(key: &str) -> String {
    key.trim_start_matches("/authors/").to_string()
}

#[async_trait]
impl BookSource for OpenLibraryClient {
    async fn search_by_query(
        &self,
        text: &str,
        page: u32,
        page_size: u32,
    ) -> Result<SearchPage, SourceError> {
        let raw: RawSearch = self
            .get_json(
                "/search.json",
                &[
                    ("q", text.to_string()),
                    ("limit", page_size.to_string()),
                    ("offset", offset(page, page_size).to_string()),
                    ("fields", SEARCH_FIELDS.to_string()),
                ],
            )
            .await?;
        Ok(raw.into())
    }

    async fn search_by_subject(
        &self,
        subject: &str,
        page: u32,
        page_size: u32,
    ) -> Result<SearchPage, SourceError> {
        let path = format!(
            "/subjects/{}.json",
            urlencoding::encode(&subject_slug(subject))
        );
        let raw: RawSubject = self
            .get_json(
                &path,
                &[
                    ("limit", page_size.to_string()),
                    ("offset", offset(page, page_size).to_string()),
                ],
            )
            .await?;
        Ok(raw.into())
    }

    async fn work_detail(&self, external_id: &str) -> Result<WorkDetail, SourceError> {
        let path = format!("/works/{}.json", urlencoding::encode(external_id));
        let raw: RawWork = self.get_json(&path, &[]).await?;
        Ok(raw.into())
    }

    async fn author_detail(&self, author_id: &str) -> Result<AuthorDetail, SourceError> {
        let path = format!("/authors/{}.json", urlencoding::encode(author_id));
        let raw: RawAuthor = self.get_json(&path, &[]).await?;
        raw.try_into()
    }

    async fn edition_page_counts(
        &self,
        external_id: &str,
        sample_size: usize,
    ) -> Result<Vec<i64>, SourceError> {
        let path = format!("/works/{}/editions.json", urlencoding::encode(external_id));
        let raw: RawEditions = self
            .get_json(
                &path,
                &[
                    ("limit", sample_size.to_string()),
                    ("fields", "number_of_pages".to_string()),
                ],
            )
            .await?;
        Ok(raw.page_counts())
    }

    fn cover_url(&self, cover: &CoverRef, size: CoverSize) -> String {
        match cover {
            CoverRef::Id(id) => format!("{}/b/id/{}-{}.jpg", self.covers_url, id, size.as_str()),
            CoverRef::Isbn(isbn) => format!(
                "{}/b/isbn/{}-{}.jpg",
                self.covers_url,
                urlencoding::encode(isbn),
                size.as_str()
            ),
        }
    }
}

// ========== WIRE TYPES ==========

/// Either a bare string or `{"type": "/type/text", "value": "..."}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextValue {
    Plain(String),
    Typed { value: String },
}

impl TextValue {
    fn into_string(self) -> String {
        match self {
            TextValue::Plain(s) | TextValue::Typed { value: s } => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSearch {
    #[serde(default)]
    docs: Vec<RawDoc>,
    #[serde(default, rename = "numFound")]
    num_found: i64,
}

#[derive(Debug, Deserialize)]
struct RawSubject {
    #[serde(default)]
    works: Vec<RawDoc>,
    #[serde(default)]
    work_count: i64,
}

/// A search doc or a subject work; the two differ in how authors and covers are named.
#[derive(Debug, Deserialize)]
struct RawDoc {
    key: String,
    title: Option<String>,
    #[serde(default)]
    author_name: Vec<String>,
    #[serde(default)]
    author_key: Vec<String>,
    #[serde(default)]
    authors: Vec<RawListedAuthor>,
    first_publish_year: Option<i32>,
    #[serde(default)]
    isbn: Vec<String>,
    cover_i: Option<i64>,
    cover_id: Option<i64>,
    #[serde(default)]
    subject: Vec<String>,
    #[serde(default)]
    language: Vec<String>,
    #[serde(default)]
    publisher: Vec<String>,
    number_of_pages_median: Option<i64>,
    ratings_average: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawListedAuthor {
    key: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawWork {
    title: Option<String>,
    description: Option<TextValue>,
    #[serde(default)]
    covers: Vec<i64>,
    #[serde(default)]
    subjects: Vec<String>,
    #[serde(default)]
    authors: Vec<RawWorkAuthor>,
    first_publish_date: Option<String>,
    number_of_pages: Option<i64>,
    number_of_pages_median: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawWorkAuthor {
    author: Option<RawKey>,
}

#[derive(Debug, Deserialize)]
struct RawKey {
    key: String,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    name: Option<String>,
    bio: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct RawEditions {
    #[serde(default)]
    entries: Vec<RawEdition>,
}

#[derive(Debug, Deserialize)]
struct RawEdition {
    number_of_pages: Option<i64>,
}

impl RawEditions {
    fn page_counts(self) -> Vec<i64> {
        self.entries
            .into_iter()
            .filter_map(|e| e.number_of_pages)
            .filter(|p| *p > 0)
            .collect()
    }
}

impl From<RawDoc> for SourceBook {
    fn from(doc: RawDoc) -> Self {
        let author_names = if doc.author_name.is_empty() {
            doc.authors.iter().filter_map(|a| a.name.clone()).collect()
        } else {
            doc.author_name
        };

        let author_keys = if doc.author_key.is_empty() {
            doc.authors
                .iter()
                .filter_map(|a| a.key.as_deref().map(strip_author_prefix))
                .collect()
        } else {
            doc.author_key
        };

        SourceBook {
            key: doc.key,
            title: doc.title,
            author_names,
            author_keys,
            first_publish_year: doc.first_publish_year,
            isbns: doc.isbn,
            cover_id: doc.cover_i.or(doc.cover_id).filter(|id| *id > 0),
            subjects: doc.subject,
            languages: doc.language,
            publishers: doc.publisher,
            median_pages: doc.number_of_pages_median.filter(|p| *p > 0),
            ratings_average: doc.ratings_average,
        }
    }
}

impl From<RawSearch> for SearchPage {
    fn from(raw: RawSearch) -> Self {
        SearchPage {
            entries: raw.docs.into_iter().map(SourceBook::from).collect(),
            total_count: raw.num_found,
        }
    }
}

impl From<RawSubject> for SearchPage {
    fn from(raw: RawSubject) -> Self {
        SearchPage {
            entries: raw.works.into_iter().map(SourceBook::from).collect(),
            total_count: raw.work_count,
        }
    }
}

impl From<RawWork> for WorkDetail {
    fn from(raw: RawWork) -> Self {
        WorkDetail {
            title: raw.title,
            description: raw.description.map(TextValue::into_string),
            // Open Library uses -1 for "no cover"
            cover_ids: raw.covers.into_iter().filter(|id| *id > 0).collect(),
            subjects: raw.subjects,
            author_keys: raw
                .authors
                .into_iter()
                .filter_map(|a| a.author)
                .map(|k| strip_author_prefix(&k.key))
                .collect(),
            first_publish_date: raw.first_publish_date,
            page_count: raw
                .number_of_pages
                .filter(|p| *p > 0)
                .or(raw.number_of_pages_median.filter(|p| *p > 0)),
        }
    }
}

impl TryFrom<RawAuthor> for AuthorDetail {
    type Error = SourceError;

    fn try_from(raw: RawAuthor) -> Result<Self, Self::Error> {
        let name = raw
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| SourceError::Decode("author record has no name".to_string()))?;

        Ok(AuthorDetail {
            name,
            bio: raw.bio.map(TextValue::into_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenLibraryClient {
        OpenLibraryClient::new(&SourceConfig::default()).unwrap()
    }

    #[test]
    fn test_decode_search() {
        let raw: RawSearch = decode(
            r#"{
                "numFound": 1234,
                "start": 0,
                "docs": [{
                    "key": "/works/OL27448W",
                    "title": "The Lord of the Rings",
                    "author_name": ["J.R.R. Tolkien"],
                    "author_key": ["OL26320A"],
                    "first_publish_year": 1954,
                    "isbn": ["9780618640157"],
                    "cover_i": 14625765,
                    "subject": ["Fantasy", "Fiction", "Middle Earth"],
                    "language": ["eng"],
                    "number_of_pages_median": 1193
                }]
            }"#,
        )
        .unwrap();

        let page = SearchPage::from(raw);
        assert_eq!(page.total_count, 1234);
        let book = &page.entries[0];
        assert_eq!(book.key, "/works/OL27448W");
        assert_eq!(book.author_names, vec!["J.R.R. Tolkien"]);
        assert_eq!(book.cover_id, Some(14625765));
        assert_eq!(book.median_pages, Some(1193));
        assert_eq!(book.first_publish_year, Some(1954));
    }

    #[test]
    fn test_decode_subject_works() {
        let raw: RawSubject = decode(
            r#"{
                "name": "fantasy",
                "work_count": 9000,
                "works": [{
                    "key": "/works/OL138052W",
                    "title": "Alice's Adventures in Wonderland",
                    "authors": [{"key": "/authors/OL22098A", "name": "Lewis Carroll"}],
                    "cover_id": 10527843,
                    "subject": ["Fantasy"],
                    "first_publish_year": 1865
                }]
            }"#,
        )
        .unwrap();

        let page = SearchPage::from(raw);
        assert_eq!(page.total_count, 9000);
        let book = &page.entries[0];
        assert_eq!(book.author_names, vec!["Lewis Carroll"]);
        assert_eq!(book.author_keys, vec!["OL22098A"]);
        assert_eq!(book.cover_id, Some(10527843));
    }

    #[test]
    fn test_decode_work_with_typed_description() {
        let raw: RawWork = decode(
            r#"{
                "title": "Dune",
                "description": {"type": "/type/text", "value": "A desert planet."},
                "covers": [-1, 11481354],
                "subjects": ["Science fiction"],
                "authors": [{"author": {"key": "/authors/OL79034A"}, "type": {"key": "/type/author_role"}}],
                "first_publish_date": "1965"
            }"#,
        )
        .unwrap();

        let work = WorkDetail::from(raw);
        assert_eq!(work.description.as_deref(), Some("A desert planet."));
        assert_eq!(work.cover_ids, vec![11481354]);
        assert_eq!(work.author_keys, vec!["OL79034A"]);
        assert_eq!(work.page_count, None);
    }

    #[test]
    fn test_decode_work_page_count_fields() {
        let raw: RawWork =
            decode(r#"{"title": "X", "description": "plain", "number_of_pages_median": 288}"#)
                .unwrap();
        let work = WorkDetail::from(raw);
        assert_eq!(work.description.as_deref(), Some("plain"));
        assert_eq!(work.page_count, Some(288));
    }

    #[test]
    fn test_decode_author() {
        let raw: RawAuthor =
            decode(r#"{"name": "Frank Herbert", "bio": {"value": "American author."}}"#).unwrap();
        let author = AuthorDetail::try_from(raw).unwrap();
        assert_eq!(author.name, "Frank Herbert");
        assert_eq!(author.bio.as_deref(), Some("American author."));

        let raw: RawAuthor = decode(r#"{"bio": "no name"}"#).unwrap();
        assert!(matches!(
            AuthorDetail::try_from(raw),
            Err(SourceError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_editions_skips_missing_counts() {
        let raw: RawEditions = decode(
            r#"{"entries": [{"number_of_pages": 412}, {}, {"number_of_pages": 0}, {"number_of_pages": 398}]}"#,
        )
        .unwrap();
        assert_eq!(raw.page_counts(), vec![412, 398]);
    }

    #[test]
    fn test_decode_error() {
        assert!(matches!(
            decode::<RawWork>("<html>"),
            Err(SourceError::Decode(_))
        ));
    }

    #[test]
    fn test_subject_slug_and_offset() {
        assert_eq!(subject_slug("Science Fiction"), "science_fiction");
        assert_eq!(subject_slug("  fantasy "), "fantasy");
        assert_eq!(offset(1, 20), 0);
        assert_eq!(offset(3, 20), 40);
        assert_eq!(offset(0, 20), 0);
    }

    #[test]
    fn test_cover_urls() {
        let client = client();
        assert_eq!(
            client.cover_url(&CoverRef::Id(42), CoverSize::Large),
            "https://covers.openlibrary.org/b/id/42-L.jpg"
        );
        assert_eq!(
            client.cover_url(&CoverRef::Isbn("9780441013593".to_string()), CoverSize::Medium),
            "https://covers.openlibrary.org/b/isbn/9780441013593-M.jpg"
        );
    }
}
