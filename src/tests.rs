use crate::catalog::{
    Catalog, CatalogResolver, EntryChanges, EntryQuery, NewEntry, SearchQuery, UNKNOWN_AUTHOR,
};
use crate::config::Config;
use crate::db::{Database, Preferences, User, now_timestamp};
use crate::error::AppError;
use crate::favorites::{FavoriteChanges, FavoriteService, NewFavorite};
use crate::progress::ReadingStatus;
use crate::recommend::{RecommendationStrategy, Recommender};
use crate::source::{
    AuthorDetail, BookSource, CoverRef, CoverSize, SearchPage, SourceBook, SourceError, WorkDetail,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const TOLKIEN: &str = "OL26320A";

/// In-memory book source with switchable failures.
#[derive(Default)]
struct FakeSource {
    works: Mutex<HashMap<String, WorkDetail>>,
    editions: Mutex<HashMap<String, Vec<i64>>>,
    subjects: Mutex<HashMap<String, Vec<SourceBook>>>,
    work_calls: AtomicUsize,
    offline: AtomicBool,
}

impl FakeSource {
    fn add_work(&self, id: &str, title: &str, page_count: Option<i64>, subjects: &[&str]) {
        self.works.lock().insert(
            id.to_string(),
            WorkDetail {
                title: Some(title.to_string()),
                description: Some(format!("About {}", title)),
                cover_ids: vec![1234],
                subjects: subjects.iter().map(|s| s.to_string()).collect(),
                author_keys: vec![TOLKIEN.to_string()],
                first_publish_date: Some("July 29, 1954".to_string()),
                page_count,
            },
        );
    }

    fn set_editions(&self, id: &str, counts: &[i64]) {
        self.editions.lock().insert(id.to_string(), counts.to_vec());
    }

    fn add_subject_book(&self, subject: &str, key: &str, title: &str) {
        self.subjects
            .lock()
            .entry(subject.to_string())
            .or_default()
            .push(SourceBook {
                key: format!("/works/{}", key),
                title: Some(title.to_string()),
                author_names: vec!["Some Author".to_string()],
                subjects: vec![subject.to_string()],
                ..Default::default()
            });
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn work_calls(&self) -> usize {
        self.work_calls.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), SourceError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SourceError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BookSource for FakeSource {
    async fn search_by_query(
        &self,
        text: &str,
        _page: u32,
        _page_size: u32,
    ) -> Result<SearchPage, SourceError> {
        self.check_online()?;
        let needle = text.to_lowercase();
        let entries: Vec<SourceBook> = self
            .subjects
            .lock()
            .values()
            .flatten()
            .filter(|b| {
                b.title
                    .as_deref()
                    .is_some_and(|t| t.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        Ok(SearchPage {
            total_count: entries.len() as i64,
            entries,
        })
    }

    async fn search_by_subject(
        &self,
        subject: &str,
        _page: u32,
        page_size: u32,
    ) -> Result<SearchPage, SourceError> {
        self.check_online()?;
        let all = self.subjects.lock().get(subject).cloned().unwrap_or_default();
        Ok(SearchPage {
            total_count: all.len() as i64,
            entries: all.into_iter().take(page_size as usize).collect(),
        })
    }

    async fn work_detail(&self, external_id: &str) -> Result<WorkDetail, SourceError> {
        self.work_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.check_online()?;
        let work = self.works.lock().get(external_id).cloned();
        work.ok_or_else(|| SourceError::NotFound(external_id.to_string()))
    }

    async fn author_detail(&self, author_id: &str) -> Result<AuthorDetail, SourceError> {
        self.check_online()?;
        if author_id == TOLKIEN {
            Ok(AuthorDetail {
                name: "J. R. R. Tolkien".to_string(),
                bio: None,
            })
        } else {
            Err(SourceError::NotFound(author_id.to_string()))
        }
    }

    async fn edition_page_counts(
        &self,
        external_id: &str,
        sample_size: usize,
    ) -> Result<Vec<i64>, SourceError> {
        self.check_online()?;
        let counts = self.editions.lock().get(external_id).cloned().unwrap_or_default();
        Ok(counts.into_iter().take(sample_size).collect())
    }

    fn cover_url(&self, cover: &CoverRef, size: CoverSize) -> String {
        match cover {
            CoverRef::Id(id) => format!("https://covers.test/b/id/{}-{}.jpg", id, size.as_str()),
            CoverRef::Isbn(isbn) => {
                format!("https://covers.test/b/isbn/{}-{}.jpg", isbn, size.as_str())
            }
        }
    }
}

struct Harness {
    db: Database,
    source: Arc<FakeSource>,
    catalog: Catalog,
    favorites: FavoriteService,
}

fn setup() -> Harness {
    let db = Database::open_memory().unwrap();
    let source = Arc::new(FakeSource::default());
    let config = Config::default();

    let resolver = CatalogResolver::new(db.clone(), source.clone(), &config.source);
    let catalog = Catalog::new(db.clone(), resolver.clone());
    let favorites = FavoriteService::new(db.clone(), resolver);

    create_user(&db, "user-1", "alice");

    Harness {
        db,
        source,
        catalog,
        favorites,
    }
}

fn test_user(id: &str, username: &str) -> User {
    User {
        id: id.to_string(),
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password_hash: "hash".to_string(),
        role: "user".to_string(),
        preferences: Preferences::default(),
        created_at: now_timestamp(),
        last_login: None,
    }
}

fn create_user(db: &Database, id: &str, username: &str) {
    db.create_user(&test_user(id, username)).unwrap();
}

fn favorite(book_id: &str) -> NewFavorite {
    NewFavorite {
        book_id: book_id.to_string(),
        ..Default::default()
    }
}

fn manual_entry(title: &str, pages: Option<i64>) -> NewEntry {
    NewEntry {
        title: title.to_string(),
        author: "Ursula K. Le Guin".to_string(),
        genres: vec!["fantasy".to_string()],
        page_count: pages,
        ..Default::default()
    }
}

// ========== MATERIALIZATION ==========

#[tokio::test]
async fn favorite_materializes_external_work() {
    let h = setup();
    h.source
        .add_work("OL27448W", "The Lord of the Rings", None, &["Fantasy", "Epic"]);
    h.source.set_editions("OL27448W", &[1216, 1178, 0, 1193]);

    let created = h
        .favorites
        .create("user-1", favorite("/works/OL27448W"))
        .await
        .unwrap();

    assert_eq!(created.book.external_id.as_deref(), Some("OL27448W"));
    assert_eq!(created.book.author, "J. R. R. Tolkien");
    assert_eq!(created.book.published_year, Some(1954));
    // Upper median of the positive edition counts
    assert_eq!(created.book.page_count, Some(1193));
    assert_eq!(
        created.book.cover_image.as_deref(),
        Some("https://covers.test/b/id/1234-L.jpg")
    );
    assert_eq!(created.favorite.status, ReadingStatus::WantToRead);
    assert_eq!(created.favorite.reading_progress.total_pages, 1193);
    assert_eq!(created.favorite.reading_progress.current_page, 0);
    assert_eq!(h.db.count_entries().unwrap(), 1);
}

#[tokio::test]
async fn second_reference_reuses_entry() {
    let h = setup();
    create_user(&h.db, "user-2", "bob");
    h.source.add_work("OL1W", "Dune", Some(412), &[]);

    let a = h.favorites.create("user-1", favorite("OL1W")).await.unwrap();
    let b = h
        .favorites
        .create("user-2", favorite("works/OL1W"))
        .await
        .unwrap();

    assert_eq!(a.book.id, b.book.id);
    assert_eq!(h.source.work_calls(), 1);
    assert_eq!(h.db.count_entries().unwrap(), 1);
}

#[tokio::test]
async fn concurrent_creates_materialize_one_entry() {
    let h = setup();
    create_user(&h.db, "user-2", "bob");
    h.source.add_work("OL45883W", "The Hobbit", Some(310), &[]);

    let (a, b) = tokio::join!(
        h.favorites.create("user-1", favorite("/works/OL45883W")),
        h.favorites.create("user-2", favorite("OL45883W")),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    // Both requests reached the source before either stored the entry
    assert_eq!(h.source.work_calls(), 2);
    assert_eq!(a.book.id, b.book.id);
    assert_eq!(h.db.count_entries().unwrap(), 1);
}

#[tokio::test]
async fn duplicate_favorite_is_rejected() {
    let h = setup();
    h.source.add_work("OL1W", "Dune", Some(412), &[]);

    h.favorites.create("user-1", favorite("OL1W")).await.unwrap();
    let err = h
        .favorites
        .create("user-1", favorite("/works/OL1W"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::AlreadyExists(_)));
    assert_eq!(h.favorites.snapshot("user-1").unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_references_fail() {
    let h = setup();

    let missing_internal = uuid::Uuid::new_v4().to_string();
    assert!(matches!(
        h.favorites.create("user-1", favorite(&missing_internal)).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        h.favorites.create("user-1", favorite("   ")).await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        h.favorites.create("user-1", favorite("OL404W")).await,
        Err(AppError::ExternalSource { .. })
    ));
    assert_eq!(h.db.count_entries().unwrap(), 0);
}

#[tokio::test]
async fn author_failure_degrades_to_unknown() {
    let h = setup();
    h.source.add_work("OL9W", "Anonymous Tales", Some(100), &[]);
    h.source
        .works
        .lock()
        .get_mut("OL9W")
        .unwrap()
        .author_keys = vec!["OL0A".to_string()];

    let details = h.catalog.details("/works/OL9W").await.unwrap();
    assert_eq!(details.author, UNKNOWN_AUTHOR);
    assert_eq!(details.page_count, Some(100));
    // Details never persist
    assert_eq!(h.db.count_entries().unwrap(), 0);
}

#[tokio::test]
async fn details_maps_missing_work_to_not_found() {
    let h = setup();
    assert!(matches!(
        h.catalog.details("OL404W").await,
        Err(AppError::NotFound(_))
    ));

    h.source.set_offline(true);
    assert!(matches!(
        h.catalog.details("OL404W").await,
        Err(AppError::ExternalSource { .. })
    ));
}

// ========== PROGRESS ==========

#[tokio::test]
async fn progress_auto_transitions_to_completed() {
    let h = setup();
    h.source.add_work("OL1W", "Dune", Some(400), &[]);
    let fav = h.favorites.create("user-1", favorite("OL1W")).await.unwrap();
    let id = fav.favorite.id;

    let reading = h.favorites.update_progress(&id, "user-1", 120).unwrap();
    assert_eq!(reading.favorite.status, ReadingStatus::Reading);
    assert_eq!(reading.favorite.reading_progress.progress_percentage, 30);
    assert!(reading.favorite.completed_at.is_none());

    let done = h.favorites.update_progress(&id, "user-1", 400).unwrap();
    assert_eq!(done.favorite.status, ReadingStatus::Completed);
    assert_eq!(done.favorite.reading_progress.progress_percentage, 100);
    assert!(done.favorite.completed_at.is_some());

    // Going back a few pages never reopens the book
    let back = h.favorites.update_progress(&id, "user-1", 10).unwrap();
    assert_eq!(back.favorite.status, ReadingStatus::Completed);
    assert_eq!(back.favorite.reading_progress.progress_percentage, 3);
}

#[tokio::test]
async fn progress_jump_from_want_to_read_completes() {
    let h = setup();
    h.source.add_work("OL1W", "Dune", Some(200), &[]);
    let fav = h.favorites.create("user-1", favorite("OL1W")).await.unwrap();

    let done = h
        .favorites
        .update_progress(&fav.favorite.id, "user-1", 200)
        .unwrap();
    assert_eq!(done.favorite.status, ReadingStatus::Completed);
}

#[tokio::test]
async fn unknown_page_count_never_completes() {
    let h = setup();
    h.source.add_work("OL2W", "Untitled Draft", None, &[]);

    let reading = h
        .favorites
        .create(
            "user-1",
            NewFavorite {
                book_id: "OL2W".to_string(),
                status: Some("reading".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(reading.favorite.reading_progress.total_pages, 1);

    let ticked = h
        .favorites
        .update_progress(&reading.favorite.id, "user-1", 1)
        .unwrap();
    assert_eq!(ticked.favorite.reading_progress.progress_percentage, 100);
    assert_eq!(ticked.favorite.status, ReadingStatus::Reading);

    // A want_to_read favorite only moves to reading
    create_user(&h.db, "user-2", "bob");
    let wanted = h.favorites.create("user-2", favorite("OL2W")).await.unwrap();
    let ticked = h
        .favorites
        .update_progress(&wanted.favorite.id, "user-2", 5)
        .unwrap();
    assert_eq!(ticked.favorite.status, ReadingStatus::Reading);
    assert!(ticked.favorite.completed_at.is_none());
}

#[tokio::test]
async fn negative_page_is_rejected() {
    let h = setup();
    h.source.add_work("OL1W", "Dune", Some(200), &[]);
    let fav = h.favorites.create("user-1", favorite("OL1W")).await.unwrap();

    assert!(matches!(
        h.favorites.update_progress(&fav.favorite.id, "user-1", -1),
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn completed_at_is_stamped_once() {
    let h = setup();
    h.source.add_work("OL1W", "Dune", Some(200), &[]);
    let fav = h.favorites.create("user-1", favorite("OL1W")).await.unwrap();
    let id = fav.favorite.id;

    let done = h.favorites.update_progress(&id, "user-1", 200).unwrap();
    let stamped = done.favorite.completed_at;
    assert!(stamped.is_some());

    let reopened = h
        .favorites
        .update(
            &id,
            "user-1",
            FavoriteChanges {
                status: Some("reading".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(reopened.favorite.status, ReadingStatus::Reading);
    assert_eq!(reopened.favorite.completed_at, stamped);

    let again = h
        .favorites
        .update(
            &id,
            "user-1",
            FavoriteChanges {
                status: Some("completed".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(again.favorite.completed_at, stamped);
}

#[tokio::test]
async fn created_completed_is_stamped() {
    let h = setup();
    h.source.add_work("OL1W", "Dune", Some(200), &[]);

    let fav = h
        .favorites
        .create(
            "user-1",
            NewFavorite {
                book_id: "OL1W".to_string(),
                status: Some("completed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(fav.favorite.completed_at.is_some());
}

// ========== RECONCILIATION ==========

#[tokio::test]
async fn list_backfills_page_count_and_resyncs() {
    let h = setup();
    h.source.add_work("OL3W", "Slow Publisher", None, &[]);
    let fav = h.favorites.create("user-1", favorite("OL3W")).await.unwrap();
    assert_eq!(fav.book.page_count, None);
    h.favorites
        .update_progress(&fav.favorite.id, "user-1", 80)
        .unwrap();

    // The source learns the page count later
    h.source.set_editions("OL3W", &[320]);

    let listed = h.favorites.list("user-1", None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].book.page_count, Some(320));
    assert_eq!(listed[0].favorite.reading_progress.total_pages, 320);
    assert_eq!(listed[0].favorite.reading_progress.progress_percentage, 25);

    // Persisted, and a second pass changes nothing
    let stored = h.favorites.get(&fav.favorite.id, "user-1").unwrap();
    assert_eq!(stored.favorite.reading_progress.total_pages, 320);
    assert_eq!(stored.book.page_count, Some(320));

    let again = h.favorites.list("user-1", None).await.unwrap();
    assert_eq!(again[0].favorite.reading_progress, stored.favorite.reading_progress);
}

#[tokio::test]
async fn list_swallows_source_failures() {
    let h = setup();
    h.source.add_work("OL3W", "Slow Publisher", None, &[]);
    h.favorites.create("user-1", favorite("OL3W")).await.unwrap();

    h.source.set_offline(true);
    let listed = h.favorites.list("user-1", None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].book.page_count, None);
    assert_eq!(listed[0].favorite.reading_progress.total_pages, 1);
}

#[tokio::test]
async fn update_resyncs_total_from_catalog() {
    let h = setup();
    let entry = h
        .catalog
        .create_entry(manual_entry("A Wizard of Earthsea", None))
        .unwrap();
    let fav = h.favorites.create("user-1", favorite(&entry.id)).await.unwrap();
    assert_eq!(fav.favorite.reading_progress.total_pages, 1);
    h.favorites
        .update_progress(&fav.favorite.id, "user-1", 50)
        .unwrap();

    h.catalog
        .update_entry(
            &entry.id,
            EntryChanges {
                page_count: Some(200),
                ..Default::default()
            },
        )
        .unwrap();

    let updated = h
        .favorites
        .update(
            &fav.favorite.id,
            "user-1",
            FavoriteChanges {
                notes: Some("Re-read the first chapter".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.favorite.reading_progress.total_pages, 200);
    assert_eq!(updated.favorite.reading_progress.progress_percentage, 25);
    assert_eq!(
        updated.favorite.notes.as_deref(),
        Some("Re-read the first chapter")
    );
}

#[tokio::test]
async fn legacy_pages_count_as_total() {
    let h = setup();
    let entry = h
        .catalog
        .create_entry(NewEntry {
            pages: Some(250),
            ..manual_entry("The Tombs of Atuan", None)
        })
        .unwrap();
    assert_eq!(entry.page_count, None);
    assert_eq!(entry.known_page_count(), Some(250));

    let fav = h.favorites.create("user-1", favorite(&entry.id)).await.unwrap();
    assert_eq!(fav.favorite.reading_progress.total_pages, 250);

    let done = h
        .favorites
        .update_progress(&fav.favorite.id, "user-1", 250)
        .unwrap();
    assert_eq!(done.favorite.status, ReadingStatus::Completed);
    assert_eq!(done.favorite.reading_progress.progress_percentage, 100);
    assert!(done.favorite.completed_at.is_some());
}

#[tokio::test]
async fn pages_hint_is_stored_on_materialization() {
    let h = setup();
    h.source.add_work("OL9W", "The Farthest Shore", None, &[]);

    let fav = h
        .favorites
        .create(
            "user-1",
            NewFavorite {
                book_id: "OL9W".to_string(),
                pages: Some(250),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(fav.book.page_count, None);
    assert_eq!(fav.book.pages, Some(250));
    assert_eq!(fav.favorite.reading_progress.total_pages, 250);
}

#[tokio::test]
async fn progress_resyncs_total_when_count_becomes_known() {
    let h = setup();
    let entry = h
        .catalog
        .create_entry(manual_entry("Tehanu", None))
        .unwrap();
    let fav = h
        .favorites
        .create(
            "user-1",
            NewFavorite {
                book_id: entry.id.clone(),
                status: Some("reading".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let ticked = h
        .favorites
        .update_progress(&fav.favorite.id, "user-1", 10)
        .unwrap();
    assert_eq!(ticked.favorite.reading_progress.total_pages, 1);
    assert_eq!(ticked.favorite.status, ReadingStatus::Reading);

    h.catalog
        .update_entry(
            &entry.id,
            EntryChanges {
                page_count: Some(320),
                ..Default::default()
            },
        )
        .unwrap();

    let ticked = h
        .favorites
        .update_progress(&fav.favorite.id, "user-1", 80)
        .unwrap();
    assert_eq!(ticked.favorite.reading_progress.total_pages, 320);
    assert_eq!(ticked.favorite.reading_progress.progress_percentage, 25);
    assert_eq!(ticked.favorite.status, ReadingStatus::Reading);

    let done = h
        .favorites
        .update_progress(&fav.favorite.id, "user-1", 320)
        .unwrap();
    assert_eq!(done.favorite.reading_progress.total_pages, 320);
    assert_eq!(done.favorite.status, ReadingStatus::Completed);
    assert!(done.favorite.completed_at.is_some());
}

#[tokio::test]
async fn cleared_page_count_falls_back_to_unknown_total() {
    let h = setup();
    let entry = h
        .catalog
        .create_entry(manual_entry("The Other Wind", Some(300)))
        .unwrap();
    let fav = h.favorites.create("user-1", favorite(&entry.id)).await.unwrap();
    let ticked = h
        .favorites
        .update_progress(&fav.favorite.id, "user-1", 100)
        .unwrap();
    assert_eq!(ticked.favorite.reading_progress.total_pages, 300);

    h.catalog
        .update_entry(
            &entry.id,
            EntryChanges {
                page_count: Some(0),
                ..Default::default()
            },
        )
        .unwrap();

    let ticked = h
        .favorites
        .update_progress(&fav.favorite.id, "user-1", 100)
        .unwrap();
    assert_eq!(ticked.favorite.reading_progress.total_pages, 1);
    assert_eq!(ticked.favorite.status, ReadingStatus::Reading);
    assert!(ticked.favorite.completed_at.is_none());
}

#[tokio::test]
async fn list_filters_by_status() {
    let h = setup();
    h.source.add_work("OL1W", "Dune", Some(200), &[]);
    h.source.add_work("OL2W", "Emma", Some(300), &[]);
    let dune = h.favorites.create("user-1", favorite("OL1W")).await.unwrap();
    h.favorites.create("user-1", favorite("OL2W")).await.unwrap();
    h.favorites
        .update_progress(&dune.favorite.id, "user-1", 10)
        .unwrap();

    let reading = h
        .favorites
        .list("user-1", Some(ReadingStatus::Reading))
        .await
        .unwrap();
    assert_eq!(reading.len(), 1);
    assert_eq!(reading[0].book.title, "Dune");

    let all = h.favorites.list("user-1", None).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn rating_is_validated() {
    let h = setup();
    h.source.add_work("OL1W", "Dune", Some(200), &[]);
    let fav = h.favorites.create("user-1", favorite("OL1W")).await.unwrap();

    let bad = h.favorites.update(
        &fav.favorite.id,
        "user-1",
        FavoriteChanges {
            rating: Some(6.0),
            ..Default::default()
        },
    );
    assert!(matches!(bad, Err(AppError::Validation(_))));

    let good = h
        .favorites
        .update(
            &fav.favorite.id,
            "user-1",
            FavoriteChanges {
                rating: Some(3.0),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(good.favorite.rating, Some(3));

    let later = h
        .favorites
        .update(
            &fav.favorite.id,
            "user-1",
            FavoriteChanges {
                review: Some("Sprawling but worth it".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(later.favorite.rating, Some(3));
    assert_eq!(later.favorite.review.as_deref(), Some("Sprawling but worth it"));
}

#[tokio::test]
async fn progress_update_is_idempotent() {
    let h = setup();
    h.source.add_work("OL1W", "Dune", Some(412), &[]);
    let fav = h.favorites.create("user-1", favorite("OL1W")).await.unwrap();

    let first = h
        .favorites
        .update_progress(&fav.favorite.id, "user-1", 137)
        .unwrap();
    let second = h
        .favorites
        .update_progress(&fav.favorite.id, "user-1", 137)
        .unwrap();

    assert_eq!(first.favorite.status, second.favorite.status);
    assert_eq!(
        first.favorite.reading_progress.progress_percentage,
        second.favorite.reading_progress.progress_percentage
    );
    assert_eq!(second.favorite.reading_progress.progress_percentage, 33);
}

#[tokio::test]
async fn favorites_are_scoped_to_owner() {
    let h = setup();
    create_user(&h.db, "user-2", "bob");
    h.source.add_work("OL1W", "Dune", Some(200), &[]);
    let fav = h.favorites.create("user-1", favorite("OL1W")).await.unwrap();
    let id = fav.favorite.id;

    assert!(matches!(
        h.favorites.get(&id, "user-2"),
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        h.favorites.update_progress(&id, "user-2", 5),
        Err(AppError::NotFound(_))
    ));
    assert!(!h.favorites.delete(&id, "user-2").unwrap());
    assert!(h.favorites.list("user-2", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_twice() {
    let h = setup();
    h.source.add_work("OL1W", "Dune", Some(200), &[]);
    let fav = h.favorites.create("user-1", favorite("OL1W")).await.unwrap();

    assert!(assert_ok!(h.favorites.delete(&fav.favorite.id, "user-1")));
    assert!(!assert_ok!(h.favorites.delete(&fav.favorite.id, "user-1")));
    assert_err!(h.favorites.get(&fav.favorite.id, "user-1"));
    // The catalog entry stays
    assert_eq!(h.db.count_entries().unwrap(), 1);
}

#[tokio::test]
async fn statistics_reflect_favorites() {
    let h = setup();
    h.source.add_work("OL1W", "Dune", Some(200), &["Science Fiction"]);
    h.source.add_work("OL2W", "Emma", Some(300), &["Romance"]);
    let dune = h.favorites.create("user-1", favorite("OL1W")).await.unwrap();
    h.favorites.create("user-1", favorite("OL2W")).await.unwrap();

    h.favorites
        .update_progress(&dune.favorite.id, "user-1", 200)
        .unwrap();
    h.favorites
        .update(
            &dune.favorite.id,
            "user-1",
            FavoriteChanges {
                rating: Some(4.0),
                ..Default::default()
            },
        )
        .unwrap();

    let stats = h.favorites.statistics("user-1").unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.want_to_read, 1);
    assert_eq!(stats.total_pages_read, 200);
    assert_eq!(stats.average_rating, 4.0);
    assert_eq!(stats.genre_distribution["Romance"], 1);
}

// ========== CATALOG ==========

#[tokio::test]
async fn catalog_crud() {
    let h = setup();

    let entry = h
        .catalog
        .create_entry(NewEntry {
            isbn: Some(" 9780553383041 ".to_string()),
            ..manual_entry("The Left Hand of Darkness", Some(304))
        })
        .unwrap();
    assert_eq!(entry.isbn.as_deref(), Some("9780553383041"));
    assert_eq!(entry.language, "en");

    let dup = h.catalog.create_entry(NewEntry {
        isbn: Some("9780553383041".to_string()),
        ..manual_entry("Copy", None)
    });
    assert!(matches!(dup, Err(AppError::AlreadyExists(_))));

    assert!(matches!(
        h.catalog.create_entry(manual_entry("", None)),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        h.catalog.create_entry(NewEntry {
            published_year: Some(999),
            ..manual_entry("Too Old", None)
        }),
        Err(AppError::Validation(_))
    ));

    let updated = h
        .catalog
        .update_entry(
            &entry.id,
            EntryChanges {
                title: Some("The Left Hand of Darkness (Ace)".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.title, "The Left Hand of Darkness (Ace)");
    assert_eq!(updated.page_count, Some(304));

    h.catalog
        .create_entry(manual_entry("The Dispossessed", Some(387)))
        .unwrap();
    let found = h
        .catalog
        .list_entries(&EntryQuery {
            search: Some("darkness".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(found.total, 1);
    assert_eq!(found.books[0].id, entry.id);

    let by_genre = h
        .catalog
        .list_entries(&EntryQuery {
            genre: Some("fantasy".to_string()),
            limit: Some(1),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_genre.total, 2);
    assert_eq!(by_genre.books.len(), 1);
    assert_eq!(by_genre.pages, 2);

    assert!(h.catalog.delete_entry(&entry.id).unwrap());
    assert!(!h.catalog.delete_entry(&entry.id).unwrap());
    assert!(matches!(
        h.catalog.get_entry(&entry.id),
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn deleting_entry_removes_favorites() {
    let h = setup();
    let entry = h
        .catalog
        .create_entry(manual_entry("Tehanu", Some(252)))
        .unwrap();
    h.favorites.create("user-1", favorite(&entry.id)).await.unwrap();

    assert!(h.catalog.delete_entry(&entry.id).unwrap());
    assert!(h.favorites.snapshot("user-1").unwrap().is_empty());
}

#[tokio::test]
async fn external_search_by_query_and_genre() {
    let h = setup();
    h.source.add_subject_book("fantasy", "OL10W", "The Name of the Wind");
    h.source.add_subject_book("fantasy", "OL11W", "The Wise Man's Fear");
    h.source.add_subject_book("mystery", "OL12W", "Gone Girl");

    let by_genre = h
        .catalog
        .search(&SearchQuery {
            genre: Some("fantasy".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_genre.total, 2);
    assert_eq!(by_genre.books[0].external_id, "OL10W");
    assert_eq!(by_genre.page, 1);

    let by_text = h
        .catalog
        .search(&SearchQuery {
            search: Some("gone".to_string()),
            genre: Some("fantasy".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_text.total, 1);
    assert_eq!(by_text.books[0].title, "Gone Girl");

    h.source.set_offline(true);
    assert!(matches!(
        h.catalog.search(&SearchQuery::default()).await,
        Err(AppError::ExternalSource { .. })
    ));
}

// ========== RECOMMENDATIONS ==========

#[tokio::test]
async fn recommendations_skip_owned_books() {
    let h = setup();
    h.source.add_work("OL10W", "The Name of the Wind", Some(662), &["fantasy"]);
    h.source.add_subject_book("fantasy", "OL10W", "The Name of the Wind");
    h.source.add_subject_book("fantasy", "OL11W", "The Wise Man's Fear");
    h.source.add_subject_book("fantasy", "OL12W", "The Slow Regard of Silent Things");

    let fav = h
        .favorites
        .create(
            "user-1",
            NewFavorite {
                book_id: "OL10W".to_string(),
                status: Some("reading".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let recommender = Recommender::new(
        RecommendationStrategy::Subjects,
        h.source.clone(),
        5,
        Duration::from_secs(5),
    )
    .unwrap();

    let user = test_user("user-1", "alice");
    let recs = recommender.recommend(&user, &[fav]).await;

    assert_eq!(recs.len(), 5);
    assert_eq!(recs[0].title, "The Wise Man's Fear");
    assert_eq!(recs[1].title, "The Slow Regard of Silent Things");
    assert!(recs.iter().all(|r| r.title != "The Name of the Wind"));
}

#[tokio::test]
async fn recommendations_survive_offline_source() {
    let h = setup();
    h.source.set_offline(true);

    let recommender = Recommender::new(
        RecommendationStrategy::Subjects,
        h.source.clone(),
        3,
        Duration::from_secs(5),
    )
    .unwrap();

    let mut user = test_user("user-1", "alice");
    user.preferences.favorite_genres = vec!["history".to_string()];

    let recs = recommender.recommend(&user, &[]).await;
    assert_eq!(recs.len(), 3);
    assert_eq!(recs[0].title, "The Midnight Library");
}
