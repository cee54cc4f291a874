//! Row mappings.
//!
//! Store-local models implement `from_row`; domain types owned by rh-core
//! are built by the free `*_from_row` functions. Timestamps are stored as
//! RFC 3339 text with nanosecond precision so that lexical order matches
//! chronological order.

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use rh_core::{
    CollectionId, JobId, LibraryRoot, MediaId, MediaItem, ProfileId, ScanRun, SeasonId, ShowId,
    TranscodingCache,
};
use rusqlite::types::Type;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

/// Format a timestamp for storage.
pub fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn conversion_err(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

pub(crate) fn parse_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn parse_opt_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|v| {
        DateTime::parse_from_rfc3339(&v)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e))
    })
    .transpose()
}

/// Parse a UUID-based ID from a text column.
pub(crate) fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| conversion_err(idx, e))?;
    Ok(T::from(uuid))
}

fn opt_path(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<PathBuf>> {
    let s: Option<String> = row.get(idx)?;
    Ok(s.map(PathBuf::from))
}

fn opt_u32(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<u32>> {
    let v: Option<i64> = row.get(idx)?;
    Ok(v.map(|n| n as u32))
}

// ---------------------------------------------------------------------------
// Domain rows
// ---------------------------------------------------------------------------

/// Column list matching [`media_item_from_row`].
pub const MEDIA_ITEM_COLS: &str =
    "id, title, path, nfo_path, size, modified, stable_key, poster_path, season, episode";

pub fn media_item_from_row(row: &rusqlite::Row) -> rusqlite::Result<MediaItem> {
    let size: i64 = row.get(4)?;
    Ok(MediaItem {
        id: MediaId::new(row.get::<_, String>(0)?),
        title: row.get(1)?,
        path: PathBuf::from(row.get::<_, String>(2)?),
        nfo_path: opt_path(row, 3)?,
        size: size as u64,
        modified: parse_ts(row, 5)?,
        stable_key: row.get(6)?,
        poster_path: opt_path(row, 7)?,
        season: opt_u32(row, 8)?,
        episode: opt_u32(row, 9)?,
    })
}

pub const LIBRARY_ROOT_COLS: &str = "id, path, kind, created_at";

pub fn library_root_from_row(row: &rusqlite::Row) -> rusqlite::Result<LibraryRoot> {
    Ok(LibraryRoot {
        id: parse_id(row, 0)?,
        path: PathBuf::from(row.get::<_, String>(1)?),
        kind: row.get(2)?,
        created_at: parse_ts(row, 3)?,
    })
}

pub const SCAN_RUN_COLS: &str = "id, root_id, started_at, finished_at, status, error";

pub fn scan_run_from_row(row: &rusqlite::Row) -> rusqlite::Result<ScanRun> {
    let status: String = row.get(4)?;
    Ok(ScanRun {
        id: parse_id(row, 0)?,
        root_id: parse_id(row, 1)?,
        started_at: parse_ts(row, 2)?,
        finished_at: parse_opt_ts(row, 3)?,
        status: status.parse().map_err(|e| conversion_err(4, e))?,
        error: row.get(5)?,
    })
}

pub const CACHE_COLS: &str = "id, media_id, profile_id, path, created_at, last_accessed, size_bytes";

pub fn cache_from_row(row: &rusqlite::Row) -> rusqlite::Result<TranscodingCache> {
    let size: i64 = row.get(6)?;
    Ok(TranscodingCache {
        id: JobId::new(row.get::<_, String>(0)?),
        media_id: MediaId::new(row.get::<_, String>(1)?),
        profile_id: ProfileId::new(row.get::<_, String>(2)?),
        path: PathBuf::from(row.get::<_, String>(3)?),
        created_at: parse_ts(row, 4)?,
        last_accessed: parse_ts(row, 5)?,
        size_bytes: size as u64,
    })
}

// ---------------------------------------------------------------------------
// Store-local models
// ---------------------------------------------------------------------------

/// Resume position for a (media, client) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub media_id: MediaId,
    pub client_id: String,
    pub position_secs: f64,
    pub duration_secs: Option<f64>,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl PlaybackState {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            media_id: MediaId::new(row.get::<_, String>(0)?),
            client_id: row.get(1)?,
            position_secs: row.get(2)?,
            duration_secs: row.get(3)?,
            completed: row.get(4)?,
            updated_at: parse_ts(row, 5)?,
        })
    }
}

/// Favorite and watched flags for a (media, client) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserFlags {
    pub favorite: bool,
    pub watched: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Collection {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            name: row.get(1)?,
            created_at: parse_ts(row, 2)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TvShow {
    pub id: ShowId,
    pub title: String,
}

impl TvShow {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            title: row.get(1)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TvSeason {
    pub id: SeasonId,
    pub show_id: ShowId,
    pub season_number: u32,
}

impl TvSeason {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let n: i64 = row.get(2)?;
        Ok(Self {
            id: parse_id(row, 0)?,
            show_id: parse_id(row, 1)?,
            season_number: n as u32,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TvEpisode {
    pub media_id: MediaId,
    pub season_id: SeasonId,
    pub episode_number: u32,
}

impl TvEpisode {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let n: i64 = row.get(2)?;
        Ok(Self {
            media_id: MediaId::new(row.get::<_, String>(0)?),
            season_id: parse_id(row, 1)?,
            episode_number: n as u32,
        })
    }
}
