//! Reading statistics over a user's favorites.

use crate::db::FavoriteWithBook;
use crate::progress::ReadingStatus;
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate reading statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    /// Number of favorites.
    pub total: usize,
    /// Favorites per status.
    pub want_to_read: usize,
    /// Currently reading.
    pub reading: usize,
    /// Finished.
    pub completed: usize,
    /// Abandoned.
    pub dropped: usize,
    /// Mean rating over rated favorites, 0 when none are rated.
    pub average_rating: f64,
    /// Sum of the current page over completed favorites.
    pub total_pages_read: i64,
    /// Genre tag to number of favorites carrying it.
    pub genre_distribution: BTreeMap<String, usize>,
}

/// Fold favorites into statistics.
pub fn reduce(favorites: &[FavoriteWithBook]) -> Statistics {
    let mut stats = Statistics {
        total: favorites.len(),
        ..Default::default()
    };

    let mut rating_sum = 0u32;
    let mut rated = 0u32;

    for item in favorites {
        let favorite = &item.favorite;

        match favorite.status {
            ReadingStatus::WantToRead => stats.want_to_read += 1,
            ReadingStatus::Reading => stats.reading += 1,
            ReadingStatus::Completed => {
                stats.completed += 1;
                stats.total_pages_read += favorite.reading_progress.current_page;
            }
            ReadingStatus::Dropped => stats.dropped += 1,
        }

        if let Some(rating) = favorite.rating {
            rating_sum += u32::from(rating);
            rated += 1;
        }

        for genre in &item.book.genres {
            *stats.genre_distribution.entry(genre.clone()).or_insert(0) += 1;
        }
    }

    if rated > 0 {
        stats.average_rating = f64::from(rating_sum) / f64::from(rated);
    }

    stats
}
