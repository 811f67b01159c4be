//! Reading progress model.
//!
//! Everything here is pure: the favorites engine calls these functions
//! before every write so that `progress_percentage` always matches
//! `current_page / total_pages`.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Total used when a book's page count is unknown.
///
/// Keeps the percentage formula well defined; it is never treated as a real
/// page count for completion purposes.
pub const UNKNOWN_TOTAL_PAGES: i64 = 1;

/// A user's reading status for one book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    /// On the reading list, not started.
    #[default]
    WantToRead,
    /// Currently being read.
    Reading,
    /// Finished.
    Completed,
    /// Abandoned.
    Dropped,
}

impl ReadingStatus {
    /// All statuses, in display order.
    pub const ALL: [ReadingStatus; 4] = [
        ReadingStatus::WantToRead,
        ReadingStatus::Reading,
        ReadingStatus::Completed,
        ReadingStatus::Dropped,
    ];

    /// Storage / wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::WantToRead => "want_to_read",
            ReadingStatus::Reading => "reading",
            ReadingStatus::Completed => "completed",
            ReadingStatus::Dropped => "dropped",
        }
    }
}

impl fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "want_to_read" => Ok(ReadingStatus::WantToRead),
            "reading" => Ok(ReadingStatus::Reading),
            "completed" => Ok(ReadingStatus::Completed),
            "dropped" => Ok(ReadingStatus::Dropped),
            other => Err(AppError::Validation(format!(
                "'{}' is not a valid status",
                other
            ))),
        }
    }
}

/// Page-level progress embedded in a favorite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingProgress {
    /// Current page (>= 0).
    pub current_page: i64,
    /// Total pages, mirrored from the catalog entry.
    pub total_pages: i64,
    /// Derived percentage, 0-100 in normal flow.
    pub progress_percentage: i64,
    /// Last time the current page changed.
    pub last_updated: i64,
}

/// `round(current / total * 100)`, or 0 when the total is not positive.
pub fn percentage(current_page: i64, total_pages: i64) -> i64 {
    if total_pages <= 0 {
        return 0;
    }
    (current_page as f64 / total_pages as f64 * 100.0).round() as i64
}

impl ReadingProgress {
    /// Fresh progress at page 0.
    pub fn initialize(total_pages: i64, now: i64) -> Self {
        Self {
            current_page: 0,
            total_pages,
            progress_percentage: 0,
            last_updated: now,
        }
    }

    /// Replace the total if it changed and is positive; otherwise no-op.
    pub fn resync_total(self, new_total: i64) -> Self {
        if new_total > 0 && new_total != self.total_pages {
            Self {
                total_pages: new_total,
                ..self
            }
            .recalculated()
        } else {
            self
        }
    }

    /// Move to `page` and stamp `last_updated`.
    pub fn set_current_page(self, page: i64, now: i64) -> Self {
        Self {
            current_page: page,
            last_updated: now,
            ..self
        }
        .recalculated()
    }

    /// Re-derive the percentage from the current ratio.
    pub fn recalculated(self) -> Self {
        Self {
            progress_percentage: percentage(self.current_page, self.total_pages),
            ..self
        }
    }
}

/// Automatic status change after a progress tick.
///
/// `want_to_read` becomes `reading` once any page is read, and `reading`
/// becomes `completed` once the current page reaches a known total. Both
/// rules apply in sequence. Nothing ever moves backwards; `dropped` is left
/// alone.
pub fn auto_transition(
    status: ReadingStatus,
    progress: &ReadingProgress,
    total_known: bool,
) -> ReadingStatus {
    let mut next = status;

    if progress.current_page > 0 && next == ReadingStatus::WantToRead {
        next = ReadingStatus::Reading;
    }

    if total_known
        && progress.total_pages > 0
        && progress.current_page >= progress.total_pages
        && next == ReadingStatus::Reading
    {
        next = ReadingStatus::Completed;
    }

    next
}
