//! User collections.

use chrono::Utc;
use rh_core::{CollectionId, Error, MediaId, Result};
use rusqlite::{params, Connection};

use crate::models::{fmt_ts, Collection};

pub fn create_collection(conn: &Connection, name: &str) -> Result<Collection> {
    let collection = Collection {
        id: CollectionId::new(),
        name: name.to_string(),
        created_at: Utc::now(),
    };
    conn.execute(
        "INSERT INTO collections (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![
            collection.id.to_string(),
            collection.name,
            fmt_ts(&collection.created_at)
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::Conflict(format!("collection '{name}' already exists"))
        }
        other => Error::database(other.to_string()),
    })?;
    Ok(collection)
}

pub fn list_collections(conn: &Connection) -> Result<Vec<Collection>> {
    let mut stmt = conn
        .prepare("SELECT id, name, created_at FROM collections ORDER BY name COLLATE NOCASE")
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], Collection::from_row)
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}

pub fn delete_collection(conn: &Connection, id: CollectionId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM collections WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Add an item; adding an item twice is a no-op.
pub fn add_to_collection(conn: &Connection, id: CollectionId, media_id: &MediaId) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO collection_items (collection_id, media_id, added_at)
         VALUES (?1, ?2, ?3)",
        params![id.to_string(), media_id.as_str(), fmt_ts(&Utc::now())],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

pub fn remove_from_collection(conn: &Connection, id: CollectionId, media_id: &MediaId) -> Result<bool> {
    let n = conn
        .execute(
            "DELETE FROM collection_items WHERE collection_id = ?1 AND media_id = ?2",
            params![id.to_string(), media_id.as_str()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Item IDs in insertion order.
pub fn collection_items(conn: &Connection, id: CollectionId) -> Result<Vec<MediaId>> {
    let mut stmt = conn
        .prepare(
            "SELECT media_id FROM collection_items WHERE collection_id = ?1
             ORDER BY added_at, media_id",
        )
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([id.to_string()], |row| row.get::<_, String>(0).map(MediaId::new))
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}
