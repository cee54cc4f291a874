//! Parsed sidecar metadata, in basic (typed) and extended (free-form) forms.

use chrono::Utc;
use rh_core::{Error, MediaId, NfoMetadata, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::fmt_ts;

/// Store the typed metadata record for an item, replacing any previous one.
pub fn put_metadata(conn: &Connection, media_id: &MediaId, meta: &NfoMetadata) -> Result<()> {
    let data = serde_json::to_string(meta)
        .map_err(|e| Error::Internal(format!("serialize metadata: {e}")))?;
    conn.execute(
        "INSERT INTO media_metadata (media_id, kind, title, data, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(media_id) DO UPDATE SET
            kind = excluded.kind,
            title = excluded.title,
            data = excluded.data,
            updated_at = excluded.updated_at",
        params![
            media_id.as_str(),
            meta.kind(),
            meta.title(),
            data,
            fmt_ts(&Utc::now())
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

pub fn get_metadata(conn: &Connection, media_id: &MediaId) -> Result<Option<NfoMetadata>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM media_metadata WHERE media_id = ?1",
            [media_id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::database(e.to_string()))?;

    data.map(|d| {
        serde_json::from_str(&d).map_err(|e| Error::database(format!("corrupt metadata row: {e}")))
    })
    .transpose()
}

/// Remove both the typed and the extended record. Returns whether anything was removed.
pub fn clear_metadata(conn: &Connection, media_id: &MediaId) -> Result<bool> {
    let a = conn
        .execute("DELETE FROM media_metadata WHERE media_id = ?1", [media_id.as_str()])
        .map_err(|e| Error::database(e.to_string()))?;
    let b = conn
        .execute(
            "DELETE FROM media_metadata_ext WHERE media_id = ?1",
            [media_id.as_str()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(a + b > 0)
}

pub fn put_extended_metadata(
    conn: &Connection,
    media_id: &MediaId,
    data: &serde_json::Value,
) -> Result<()> {
    conn.execute(
        "INSERT INTO media_metadata_ext (media_id, data, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(media_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        params![media_id.as_str(), data.to_string(), fmt_ts(&Utc::now())],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

pub fn get_extended_metadata(
    conn: &Connection,
    media_id: &MediaId,
) -> Result<Option<serde_json::Value>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM media_metadata_ext WHERE media_id = ?1",
            [media_id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::database(e.to_string()))?;

    data.map(|d| serde_json::from_str(&d).map_err(|e| Error::database(e.to_string())))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use crate::queries::media_items;
    use chrono::TimeZone;
    use rh_core::MediaItem;
    use std::path::PathBuf;

    fn setup() -> (crate::pool::PooledConnection, MediaId) {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let item = MediaItem {
            id: MediaId::new("ep1"),
            title: "Show S01E01".into(),
            path: PathBuf::from("/tv/Show.S01E01.mkv"),
            nfo_path: None,
            size: 10,
            modified: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
            stable_key: "k".into(),
            poster_path: None,
            season: Some(1),
            episode: Some(1),
        };
        media_items::upsert_items(&conn, &[item.clone()]).unwrap();
        (conn, item.id)
    }

    #[test]
    fn put_get_and_replace() {
        let (conn, id) = setup();
        let meta = NfoMetadata::episode_fallback(Some("Show".into()), 1, 1, None);
        put_metadata(&conn, &id, &meta).unwrap();
        assert_eq!(get_metadata(&conn, &id).unwrap(), Some(meta));

        let other = NfoMetadata::Unknown { root: "artist".into() };
        put_metadata(&conn, &id, &other).unwrap();
        assert_eq!(get_metadata(&conn, &id).unwrap(), Some(other));
    }

    #[test]
    fn clear_removes_both_forms() {
        let (conn, id) = setup();
        put_metadata(&conn, &id, &NfoMetadata::Unknown { root: "x".into() }).unwrap();
        put_extended_metadata(&conn, &id, &serde_json::json!({"tagline": "hi"})).unwrap();
        assert!(clear_metadata(&conn, &id).unwrap());
        assert!(get_metadata(&conn, &id).unwrap().is_none());
        assert!(get_extended_metadata(&conn, &id).unwrap().is_none());
        assert!(!clear_metadata(&conn, &id).unwrap());
    }

    #[test]
    fn metadata_cascades_with_item() {
        let (conn, id) = setup();
        put_metadata(&conn, &id, &NfoMetadata::Unknown { root: "x".into() }).unwrap();
        media_items::delete_items(&conn, &[id.clone()]).unwrap();
        assert!(get_metadata(&conn, &id).unwrap().is_none());
    }
}
