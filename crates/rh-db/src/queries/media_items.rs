//! Media item operations.

use std::path::Path;

use chrono::Utc;
use rh_core::{Error, ListQuery, MediaId, MediaItem, Page, Result, SortBy};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{fmt_ts, media_item_from_row, MEDIA_ITEM_COLS};

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Insert or update a batch of items inside one transaction.
///
/// Items are matched on ID. `created_at` is preserved on update.
pub fn upsert_items(conn: &Connection, items: &[MediaItem]) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    let now = fmt_ts(&Utc::now());
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;
    {
        let mut stmt = tx
            .prepare_cached(
                "INSERT INTO media_items
                    (id, title, path, nfo_path, size, modified, stable_key, poster_path,
                     season, episode, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    path = excluded.path,
                    nfo_path = excluded.nfo_path,
                    size = excluded.size,
                    modified = excluded.modified,
                    stable_key = excluded.stable_key,
                    poster_path = excluded.poster_path,
                    season = excluded.season,
                    episode = excluded.episode,
                    updated_at = excluded.updated_at",
            )
            .map_err(|e| Error::database(e.to_string()))?;

        for item in items {
            stmt.execute(params![
                item.id.as_str(),
                item.title,
                path_str(&item.path),
                item.nfo_path.as_deref().map(path_str),
                item.size as i64,
                fmt_ts(&item.modified),
                item.stable_key,
                item.poster_path.as_deref().map(path_str),
                item.season,
                item.episode,
                now,
            ])
            .map_err(|e| Error::database(format!("upsert {}: {e}", item.id)))?;
        }
    }
    tx.commit().map_err(|e| Error::database(e.to_string()))
}

/// Delete a batch of items. Dependent rows cascade.
pub fn delete_items(conn: &Connection, ids: &[MediaId]) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;
    let mut deleted = 0;
    {
        let mut stmt = tx
            .prepare_cached("DELETE FROM media_items WHERE id = ?1")
            .map_err(|e| Error::database(e.to_string()))?;
        for id in ids {
            deleted += stmt
                .execute([id.as_str()])
                .map_err(|e| Error::database(e.to_string()))?;
        }
    }
    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(deleted)
}

pub fn get_item(conn: &Connection, id: &MediaId) -> Result<Option<MediaItem>> {
    let q = format!("SELECT {MEDIA_ITEM_COLS} FROM media_items WHERE id = ?1");
    conn.query_row(&q, [id.as_str()], media_item_from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

pub fn get_item_by_path(conn: &Connection, path: &Path) -> Result<Option<MediaItem>> {
    let q = format!("SELECT {MEDIA_ITEM_COLS} FROM media_items WHERE path = ?1");
    conn.query_row(&q, [path_str(path)], media_item_from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

pub fn all_items(conn: &Connection) -> Result<Vec<MediaItem>> {
    let q = format!("SELECT {MEDIA_ITEM_COLS} FROM media_items ORDER BY title COLLATE NOCASE, id");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], media_item_from_row)
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}

/// Filtered, sorted, paginated listing.
///
/// Mirrors [`rh_core::apply_query`]: title order is case-insensitive and
/// breaks ties for the other sort modes.
pub fn list_items(conn: &Connection, query: &ListQuery) -> Result<Page<MediaItem>> {
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", escape_like(s)));

    let where_clause = if search.is_some() {
        "WHERE title LIKE ?1 ESCAPE '\\'"
    } else {
        "WHERE ?1 IS NULL"
    };

    let order = match query.sort {
        SortBy::Title => "lower(title), id",
        SortBy::Modified => "modified DESC, lower(title), id",
        SortBy::Size => "size DESC, lower(title), id",
    };

    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM media_items {where_clause}"),
            [&search],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let limit = query.limit.map(|l| l as i64).unwrap_or(-1);
    let q = format!(
        "SELECT {MEDIA_ITEM_COLS} FROM media_items {where_clause}
         ORDER BY {order} LIMIT ?2 OFFSET ?3"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let items = stmt
        .query_map(params![search, limit, query.offset as i64], media_item_from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(Page {
        items,
        total: total as usize,
        offset: query.offset,
    })
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
