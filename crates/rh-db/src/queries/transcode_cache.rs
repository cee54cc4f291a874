//! Transcoding cache bookkeeping.
//!
//! A row records a completed encode. Rows never verify their own files;
//! callers check that `path` still exists before trusting a hit.

use chrono::{DateTime, Utc};
use rh_core::{Error, JobId, Result, TranscodingCache};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{cache_from_row, fmt_ts, CACHE_COLS};

pub fn put_cache(conn: &Connection, entry: &TranscodingCache) -> Result<()> {
    conn.execute(
        "INSERT INTO transcoding_cache
            (id, media_id, profile_id, path, created_at, last_accessed, size_bytes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
            path = excluded.path,
            created_at = excluded.created_at,
            last_accessed = excluded.last_accessed,
            size_bytes = excluded.size_bytes",
        params![
            entry.id.as_str(),
            entry.media_id.as_str(),
            entry.profile_id.as_str(),
            entry.path.to_string_lossy(),
            fmt_ts(&entry.created_at),
            fmt_ts(&entry.last_accessed),
            entry.size_bytes as i64,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

pub fn get_cache(conn: &Connection, id: &JobId) -> Result<Option<TranscodingCache>> {
    let q = format!("SELECT {CACHE_COLS} FROM transcoding_cache WHERE id = ?1");
    conn.query_row(&q, [id.as_str()], cache_from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

/// Bump `last_accessed`.
pub fn touch_cache(conn: &Connection, id: &JobId, at: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE transcoding_cache SET last_accessed = ?2 WHERE id = ?1",
        params![id.as_str(), fmt_ts(&at)],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

pub fn delete_cache(conn: &Connection, id: &JobId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM transcoding_cache WHERE id = ?1", [id.as_str()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Rows last accessed before `cutoff`, oldest first.
pub fn expired_cache(conn: &Connection, cutoff: DateTime<Utc>) -> Result<Vec<TranscodingCache>> {
    let q = format!(
        "SELECT {CACHE_COLS} FROM transcoding_cache WHERE last_accessed < ?1 ORDER BY last_accessed"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([fmt_ts(&cutoff)], cache_from_row)
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}

/// Delete rows last accessed before `cutoff`, returning what was removed.
pub fn delete_cache_older_than(conn: &Connection, cutoff: DateTime<Utc>) -> Result<Vec<TranscodingCache>> {
    let cutoff = fmt_ts(&cutoff);
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let expired = {
        let q = format!("SELECT {CACHE_COLS} FROM transcoding_cache WHERE last_accessed < ?1");
        let mut stmt = tx.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
        let rows = stmt
            .query_map([&cutoff], cache_from_row)
            .map_err(|e| Error::database(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::database(e.to_string()))?
    };

    tx.execute("DELETE FROM transcoding_cache WHERE last_accessed < ?1", [&cutoff])
        .map_err(|e| Error::database(e.to_string()))?;
    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(expired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use chrono::Duration;
    use rh_core::{MediaId, ProfileId};
    use std::path::PathBuf;

    fn entry(id: &str, accessed: DateTime<Utc>) -> TranscodingCache {
        TranscodingCache {
            id: JobId::new(id),
            media_id: MediaId::new("m"),
            profile_id: ProfileId::new("web-720p"),
            path: PathBuf::from(format!("/cache/{id}.mp4")),
            created_at: accessed,
            last_accessed: accessed,
            size_bytes: 42,
        }
    }

    #[test]
    fn upsert_and_get() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let e = entry("j1", Utc::now());
        put_cache(&conn, &e).unwrap();
        assert_eq!(get_cache(&conn, &e.id).unwrap(), Some(e.clone()));
        assert!(delete_cache(&conn, &e.id).unwrap());
        assert!(get_cache(&conn, &e.id).unwrap().is_none());
    }

    #[test]
    fn touch_updates_last_accessed() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let old = Utc::now() - Duration::hours(2);
        put_cache(&conn, &entry("j1", old)).unwrap();
        let now = Utc::now();
        touch_cache(&conn, &JobId::new("j1"), now).unwrap();
        let got = get_cache(&conn, &JobId::new("j1")).unwrap().unwrap();
        assert_eq!(got.last_accessed, now);
        assert_eq!(got.created_at, old);
    }

    #[test]
    fn delete_older_than_keeps_recent_rows() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let now = Utc::now();
        put_cache(&conn, &entry("stale", now - Duration::hours(25))).unwrap();
        put_cache(&conn, &entry("fresh", now - Duration::hours(1))).unwrap();

        let cutoff = now - Duration::hours(24);
        assert_eq!(expired_cache(&conn, cutoff).unwrap().len(), 1);
        let removed = delete_cache_older_than(&conn, cutoff).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, JobId::new("stale"));
        assert!(get_cache(&conn, &JobId::new("fresh")).unwrap().is_some());
        assert!(get_cache(&conn, &JobId::new("stale")).unwrap().is_none());
    }
}
