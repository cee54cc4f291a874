//! Library domain types and the listing contract.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{LibraryRootId, MediaId, ScanRunId};
use crate::Error;

/// One indexed video file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: MediaId,
    pub title: String,
    pub path: PathBuf,
    pub nfo_path: Option<PathBuf>,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Hash of path and OS file identity; never exposed as the item's ID
    /// when a writable store assigns IDs.
    pub stable_key: String,
    pub poster_path: Option<PathBuf>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl MediaItem {
    /// Whether any field the scanner tracks differs from `other`.
    pub fn differs_from(&self, other: &MediaItem) -> bool {
        self.title != other.title
            || self.path != other.path
            || self.nfo_path != other.nfo_path
            || self.size != other.size
            || self.modified != other.modified
            || self.stable_key != other.stable_key
    }
}

/// A configured scan root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryRoot {
    pub id: LibraryRootId,
    pub path: PathBuf,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    Success,
    Failed,
}

impl ScanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanStatus::Running => "running",
            ScanStatus::Success => "success",
            ScanStatus::Failed => "failed",
        }
    }
}

impl FromStr for ScanStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ScanStatus::Running),
            "success" => Ok(ScanStatus::Success),
            "failed" => Ok(ScanStatus::Failed),
            other => Err(Error::Validation(format!("unknown scan status '{other}'"))),
        }
    }
}

/// One scan execution, immutable once finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRun {
    pub id: ScanRunId,
    pub root_id: LibraryRootId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: ScanStatus,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Title,
    /// Newest first.
    Modified,
    /// Largest first.
    Size,
}

impl FromStr for SortBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "title" | "name" => Ok(SortBy::Title),
            "modified" | "date" => Ok(SortBy::Modified),
            "size" => Ok(SortBy::Size),
            other => Err(Error::Validation(format!("unknown sort '{other}'"))),
        }
    }
}

/// Filter, sort and page parameters for item listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    /// Case-insensitive substring matched against titles.
    pub search: Option<String>,
    pub sort: SortBy,
    pub offset: usize,
    /// `None` returns everything after `offset`.
    pub limit: Option<usize>,
}

/// A page of results plus the size of the filtered set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
}

fn title_order(a: &MediaItem, b: &MediaItem) -> Ordering {
    a.title
        .to_lowercase()
        .cmp(&b.title.to_lowercase())
        .then_with(|| a.id.cmp(&b.id))
}

/// Order items per `sort`; title breaks ties for every mode.
pub fn sort_items(items: &mut [MediaItem], sort: SortBy) {
    match sort {
        SortBy::Title => items.sort_by(title_order),
        SortBy::Modified => {
            items.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| title_order(a, b)))
        }
        SortBy::Size => items.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| title_order(a, b))),
    }
}

/// Filter, sort and paginate an in-memory item set.
///
/// An offset past the end yields an empty page.
pub fn apply_query(items: impl IntoIterator<Item = MediaItem>, query: &ListQuery) -> Page<MediaItem> {
    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut filtered: Vec<MediaItem> = items
        .into_iter()
        .filter(|item| match &needle {
            Some(n) => item.title.to_lowercase().contains(n.as_str()),
            None => true,
        })
        .collect();

    sort_items(&mut filtered, query.sort);
    let total = filtered.len();

    let items = filtered
        .into_iter()
        .skip(query.offset)
        .take(query.limit.unwrap_or(usize::MAX))
        .collect();

    Page {
        items,
        total,
        offset: query.offset,
    }
}
