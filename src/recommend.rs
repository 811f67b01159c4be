//! Book recommendations.
//!
//! The strategy is picked once at startup. Whatever the strategy, the caller
//! always gets a full list: inference falls back to subject browsing, and
//! subject browsing tops up with trending books and then a fixed list.

use crate::catalog::{subject_books, trending_books};
use crate::config::RecommendationConfig;
use crate::db::{FavoriteWithBook, User};
use crate::error::{AppError, Result};
use crate::progress::ReadingStatus;
use crate::source::BookSource;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Genres explored per request.
const MAX_GENRES: usize = 3;
/// Books fetched per genre.
const BOOKS_PER_GENRE_FETCH: u32 = 5;
/// Books kept per genre.
const BOOKS_PER_GENRE: usize = 2;
/// Score given to trending top-ups.
const TRENDING_SCORE: u8 = 70;

static JSON_ARRAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("valid regex"));

/// One recommended book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Title.
    pub title: String,
    /// Author.
    pub author: String,
    /// Genres.
    #[serde(default)]
    pub genre: Vec<String>,
    /// Why it was picked.
    #[serde(default)]
    pub reason: String,
    /// Match score, 1-100.
    #[serde(default, alias = "matchScore")]
    pub match_score: u8,
}

/// How recommendations are produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecommendationStrategy {
    /// Subject search on the external source, seeded by reading history.
    Subjects,
    /// Text-generation endpoint, falling back to `Subjects`.
    Inference {
        /// Endpoint URL.
        url: String,
        /// Bearer key.
        api_key: Option<String>,
    },
    /// The fixed list only.
    Static,
}

impl RecommendationStrategy {
    /// Pick the strategy from configuration.
    pub fn from_config(config: &RecommendationConfig) -> Self {
        match config.provider.as_str() {
            "static" => RecommendationStrategy::Static,
            "inference" => match &config.inference_url {
                Some(url) => RecommendationStrategy::Inference {
                    url: url.clone(),
                    api_key: config.inference_api_key.clone(),
                },
                None => {
                    tracing::warn!(
                        "Inference provider selected without inference_url, using subjects"
                    );
                    RecommendationStrategy::Subjects
                }
            },
            "subjects" => RecommendationStrategy::Subjects,
            other => {
                tracing::warn!(
                    provider = %other,
                    "Unknown recommendation provider, using subjects"
                );
                RecommendationStrategy::Subjects
            }
        }
    }
}

/// The fixed fallback list.
pub fn static_recommendations() -> Vec<Recommendation> {
    let item = |title: &str, author: &str, genre: &[&str], reason: &str, score: u8| Recommendation {
        title: title.to_string(),
        author: author.to_string(),
        genre: genre.iter().map(|g| g.to_string()).collect(),
        reason: reason.to_string(),
        match_score: score,
    };

    vec![
        item(
            "The Midnight Library",
            "Matt Haig",
            &["Fiction", "Philosophy"],
            "A reflective novel about the lives we might have lived.",
            85,
        ),
        item(
            "Project Hail Mary",
            "Andy Weir",
            &["Science Fiction", "Adventure"],
            "Hard-science problem solving in deep space, with plenty of humor.",
            90,
        ),
        item(
            "Educated",
            "Tara Westover",
            &["Biography", "Memoir"],
            "A memoir about how education can remake a life.",
            88,
        ),
        item(
            "The Seven Husbands of Evelyn Hugo",
            "Taylor Jenkins Reid",
            &["Historical Fiction", "Romance"],
            "A character-driven story of a Hollywood star and her secrets.",
            87,
        ),
        item(
            "Atomic Habits",
            "James Clear",
            &["Self-Help", "Psychology"],
            "A practical guide to building good habits and dropping bad ones.",
            82,
        ),
    ]
}

/// Pull the first JSON array of recommendations out of generated text.
pub fn parse_generated(text: &str) -> Option<Vec<Recommendation>> {
    let array = JSON_ARRAY_RE.find(text)?;
    serde_json::from_str(array.as_str()).ok()
}

/// Favorites that count as reading history.
fn history(favorites: &[FavoriteWithBook]) -> impl Iterator<Item = &FavoriteWithBook> {
    favorites.iter().filter(|f| {
        matches!(
            f.favorite.status,
            ReadingStatus::Reading | ReadingStatus::Completed
        )
    })
}

/// Distinct lower-cased genres from history, then from preferences.
fn seed_genres(user: &User, favorites: &[FavoriteWithBook]) -> Vec<String> {
    let mut seen = HashSet::new();
    history(favorites)
        .flat_map(|f| f.book.genres.iter())
        .chain(user.preferences.favorite_genres.iter())
        .map(|g| g.trim().to_lowercase())
        .filter(|g| !g.is_empty() && seen.insert(g.clone()))
        .take(MAX_GENRES)
        .collect()
}

fn build_prompt(user: &User, favorites: &[FavoriteWithBook], limit: usize) -> String {
    let books: Vec<String> = history(favorites)
        .map(|f| {
            format!(
                "- \"{}\" by {} (Genre: {}, Rating: {})",
                f.book.title,
                f.book.author,
                f.book.genres.join(", "),
                f.favorite
                    .rating
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "N/A".to_string())
            )
        })
        .collect();

    let or_unspecified = |v: &[String]| {
        if v.is_empty() {
            "Not specified".to_string()
        } else {
            v.join(", ")
        }
    };

    format!(
        "Based on the following books that the user has read and enjoyed:\n\n{}\n\n\
         User's favorite genres: {}\n\
         User's favorite authors: {}\n\n\
         Recommend {} books this user would likely enjoy. Answer with a JSON array only, \
         each item shaped like {{\"title\": \"...\", \"author\": \"...\", \"genre\": [\"...\"], \
         \"reason\": \"...\", \"matchScore\": 90}}.",
        books.join("\n"),
        or_unspecified(&user.preferences.favorite_genres),
        or_unspecified(&user.preferences.favorite_authors),
        limit
    )
}

/// Generated text from either `[{"generated_text": ..}]` or `{"generated_text": ..}`.
fn generated_text(body: &serde_json::Value) -> Option<&str> {
    let item = match body {
        serde_json::Value::Array(items) => items.first()?,
        other => other,
    };
    item.get("generated_text")?.as_str()
}

/// Recommendation service.
pub struct Recommender {
    strategy: RecommendationStrategy,
    source: Arc<dyn BookSource>,
    http: reqwest::Client,
    limit: usize,
}

impl Recommender {
    /// Create a recommender.
    pub fn new(
        strategy: RecommendationStrategy,
        source: Arc<dyn BookSource>,
        limit: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            strategy,
            source,
            http,
            limit: limit.max(1),
        })
    }

    /// Active strategy.
    pub fn strategy(&self) -> &RecommendationStrategy {
        &self.strategy
    }

    /// Recommendations for a user. Never fails.
    pub async fn recommend(
        &self,
        user: &User,
        favorites: &[FavoriteWithBook],
    ) -> Vec<Recommendation> {
        match &self.strategy {
            RecommendationStrategy::Static => return self.top_up(Vec::new()),
            RecommendationStrategy::Inference { url, api_key } => {
                match self
                    .from_inference(url, api_key.as_deref(), user, favorites)
                    .await
                {
                    Ok(mut recs) if !recs.is_empty() => {
                        recs.truncate(self.limit);
                        return recs;
                    }
                    Ok(_) => {
                        tracing::warn!("Inference returned no recommendations, using subjects")
                    }
                    Err(e) => tracing::warn!(error = %e, "Inference failed, using subjects"),
                }
            }
            RecommendationStrategy::Subjects => {}
        }

        self.from_subjects(user, favorites).await
    }

    async fn from_subjects(
        &self,
        user: &User,
        favorites: &[FavoriteWithBook],
    ) -> Vec<Recommendation> {
        let owned: HashSet<&str> = favorites
            .iter()
            .flat_map(|f| [Some(f.book.id.as_str()), f.book.external_id.as_deref()])
            .flatten()
            .collect();

        let mut recs = Vec::new();

        for genre in seed_genres(user, favorites) {
            let books = match subject_books(self.source.as_ref(), &genre, BOOKS_PER_GENRE_FETCH)
                .await
            {
                Ok(books) => books,
                Err(e) => {
                    tracing::warn!(genre = %genre, error = %e, "Subject lookup failed");
                    continue;
                }
            };

            for book in books
                .into_iter()
                .filter(|b| !owned.contains(b.external_id.as_str()))
                .take(BOOKS_PER_GENRE)
            {
                recs.push(Recommendation {
                    title: book.title,
                    author: book.author,
                    genre: book.genres,
                    reason: format!(
                        "Recommended because you enjoy {} books; it shares themes with what you have been reading.",
                        genre
                    ),
                    match_score: rand::rng().random_range(75..95),
                });
            }
        }

        if recs.len() < self.limit {
            let wanted = (self.limit - recs.len()) as u32;
            match trending_books(self.source.as_ref(), wanted).await {
                Ok(books) => {
                    for book in books {
                        if recs.len() >= self.limit {
                            break;
                        }
                        if owned.contains(book.external_id.as_str())
                            || recs.iter().any(|r| r.title == book.title)
                        {
                            continue;
                        }
                        recs.push(Recommendation {
                            title: book.title,
                            author: book.author,
                            genre: book.genres,
                            reason: "Popular right now with many readers.".to_string(),
                            match_score: TRENDING_SCORE,
                        });
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Trending lookup failed"),
            }
        }

        self.top_up(recs)
    }

    /// Fill up to the limit from the fixed list.
    fn top_up(&self, mut recs: Vec<Recommendation>) -> Vec<Recommendation> {
        for rec in static_recommendations() {
            if recs.len() >= self.limit {
                break;
            }
            if !recs.iter().any(|r| r.title == rec.title) {
                recs.push(rec);
            }
        }
        recs.truncate(self.limit);
        recs
    }

    async fn from_inference(
        &self,
        url: &str,
        api_key: Option<&str>,
        user: &User,
        favorites: &[FavoriteWithBook],
    ) -> Result<Vec<Recommendation>> {
        let failed = |message: String| AppError::ExternalSource {
            id: url.to_string(),
            message,
        };

        let body = serde_json::json!({
            "inputs": build_prompt(user, favorites, self.limit),
            "parameters": {
                "max_new_tokens": 500,
                "temperature": 0.7,
                "return_full_text": false,
            },
        });

        let mut request = self.http.post(url).json(&body);
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(failed(format!("status {}", response.status())));
        }

        let value: serde_json::Value = response.json().await.map_err(|e| failed(e.to_string()))?;
        let text = generated_text(&value).ok_or_else(|| failed("no generated text".to_string()))?;

        parse_generated(text).ok_or_else(|| failed("no JSON array in generated text".to_string()))
    }
}
