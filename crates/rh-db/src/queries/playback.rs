//! Playback state and per-client favorite/watched flags.

use chrono::Utc;
use rh_core::{Error, MediaId, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{fmt_ts, PlaybackState, UserFlags};

const COLS: &str = "media_id, client_id, position_secs, duration_secs, completed, updated_at";

/// Insert or update the resume position for a (media, client) pair.
pub fn save_playback(conn: &Connection, state: &PlaybackState) -> Result<()> {
    conn.execute(
        "INSERT INTO playback_state
            (media_id, client_id, position_secs, duration_secs, completed, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(media_id, client_id) DO UPDATE SET
            position_secs = excluded.position_secs,
            duration_secs = excluded.duration_secs,
            completed = excluded.completed,
            updated_at = excluded.updated_at",
        params![
            state.media_id.as_str(),
            state.client_id,
            state.position_secs,
            state.duration_secs,
            state.completed,
            fmt_ts(&state.updated_at),
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

pub fn get_playback(
    conn: &Connection,
    media_id: &MediaId,
    client_id: &str,
) -> Result<Option<PlaybackState>> {
    let q = format!("SELECT {COLS} FROM playback_state WHERE media_id = ?1 AND client_id = ?2");
    conn.query_row(&q, params![media_id.as_str(), client_id], PlaybackState::from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

/// Started but unfinished items for a client, most recent first.
pub fn list_in_progress(conn: &Connection, client_id: &str, limit: usize) -> Result<Vec<PlaybackState>> {
    let q = format!(
        "SELECT {COLS} FROM playback_state
         WHERE client_id = ?1 AND completed = 0 AND position_secs > 0
         ORDER BY updated_at DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(params![client_id, limit as i64], PlaybackState::from_row)
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}

fn set_flag(conn: &Connection, column: &str, media_id: &MediaId, client_id: &str, value: bool) -> Result<()> {
    let sql = format!(
        "INSERT INTO user_flags (media_id, client_id, {column}, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(media_id, client_id) DO UPDATE SET
            {column} = excluded.{column},
            updated_at = excluded.updated_at"
    );
    conn.execute(
        &sql,
        params![media_id.as_str(), client_id, value, fmt_ts(&Utc::now())],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

pub fn set_favorite(conn: &Connection, media_id: &MediaId, client_id: &str, favorite: bool) -> Result<()> {
    set_flag(conn, "favorite", media_id, client_id, favorite)
}

pub fn set_watched(conn: &Connection, media_id: &MediaId, client_id: &str, watched: bool) -> Result<()> {
    set_flag(conn, "watched", media_id, client_id, watched)
}

/// Flags for a (media, client) pair; all false when never set.
pub fn get_user_flags(conn: &Connection, media_id: &MediaId, client_id: &str) -> Result<UserFlags> {
    let flags = conn
        .query_row(
            "SELECT favorite, watched FROM user_flags WHERE media_id = ?1 AND client_id = ?2",
            params![media_id.as_str(), client_id],
            |row| {
                Ok(UserFlags {
                    favorite: row.get(0)?,
                    watched: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(flags.unwrap_or_default())
}

pub fn list_favorites(conn: &Connection, client_id: &str) -> Result<Vec<MediaId>> {
    let mut stmt = conn
        .prepare(
            "SELECT media_id FROM user_flags WHERE client_id = ?1 AND favorite = 1
             ORDER BY updated_at DESC",
        )
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([client_id], |row| row.get::<_, String>(0).map(MediaId::new))
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
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
            id: MediaId::new("film"),
            title: "Film".into(),
            path: PathBuf::from("/films/film.mp4"),
            nfo_path: None,
            size: 1,
            modified: Utc.timestamp_opt(0, 0).unwrap(),
            stable_key: "k".into(),
            poster_path: None,
            season: None,
            episode: None,
        };
        media_items::upsert_items(&conn, &[item]).unwrap();
        (conn, MediaId::new("film"))
    }

    fn state(id: &MediaId, pos: f64, completed: bool) -> PlaybackState {
        PlaybackState {
            media_id: id.clone(),
            client_id: "tv".into(),
            position_secs: pos,
            duration_secs: Some(5400.0),
            completed,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn save_and_get_playback() {
        let (conn, id) = setup();
        save_playback(&conn, &state(&id, 120.5, false)).unwrap();
        let got = get_playback(&conn, &id, "tv").unwrap().unwrap();
        assert_eq!(got.position_secs, 120.5);
        assert!(get_playback(&conn, &id, "phone").unwrap().is_none());

        save_playback(&conn, &state(&id, 300.0, false)).unwrap();
        let got = get_playback(&conn, &id, "tv").unwrap().unwrap();
        assert_eq!(got.position_secs, 300.0);
    }

    #[test]
    fn in_progress_excludes_completed() {
        let (conn, id) = setup();
        save_playback(&conn, &state(&id, 60.0, false)).unwrap();
        assert_eq!(list_in_progress(&conn, "tv", 10).unwrap().len(), 1);
        save_playback(&conn, &state(&id, 5400.0, true)).unwrap();
        assert!(list_in_progress(&conn, "tv", 10).unwrap().is_empty());
    }

    #[test]
    fn favorite_and_watched_are_independent() {
        let (conn, id) = setup();
        assert_eq!(get_user_flags(&conn, &id, "tv").unwrap(), UserFlags::default());

        set_favorite(&conn, &id, "tv", true).unwrap();
        set_watched(&conn, &id, "tv", true).unwrap();
        set_favorite(&conn, &id, "tv", false).unwrap();
        let flags = get_user_flags(&conn, &id, "tv").unwrap();
        assert!(!flags.favorite);
        assert!(flags.watched);
    }

    #[test]
    fn list_favorites_per_client() {
        let (conn, id) = setup();
        set_favorite(&conn, &id, "tv", true).unwrap();
        assert_eq!(list_favorites(&conn, "tv").unwrap(), vec![id]);
        assert!(list_favorites(&conn, "phone").unwrap().is_empty());
    }
}
