//! TV show / season / episode grouping.
//!
//! Shows are matched by title case-insensitively. Each media item links to
//! at most one episode slot.

use rh_core::{Error, MediaId, Result, SeasonId, ShowId};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{fmt_ts, TvEpisode, TvSeason, TvShow};

pub fn upsert_show(conn: &Connection, title: &str) -> Result<TvShow> {
    let existing = conn
        .query_row(
            "SELECT id, title FROM tv_shows WHERE title = ?1 COLLATE NOCASE",
            [title],
            TvShow::from_row,
        )
        .optional()
        .map_err(|e| Error::database(e.to_string()))?;
    if let Some(show) = existing {
        return Ok(show);
    }

    let show = TvShow {
        id: ShowId::new(),
        title: title.to_string(),
    };
    conn.execute(
        "INSERT INTO tv_shows (id, title, created_at) VALUES (?1, ?2, ?3)",
        params![show.id.to_string(), show.title, fmt_ts(&chrono::Utc::now())],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(show)
}

pub fn upsert_season(conn: &Connection, show_id: ShowId, season_number: u32) -> Result<TvSeason> {
    let existing = conn
        .query_row(
            "SELECT id, show_id, season_number FROM tv_seasons
             WHERE show_id = ?1 AND season_number = ?2",
            params![show_id.to_string(), season_number],
            TvSeason::from_row,
        )
        .optional()
        .map_err(|e| Error::database(e.to_string()))?;
    if let Some(season) = existing {
        return Ok(season);
    }

    let season = TvSeason {
        id: SeasonId::new(),
        show_id,
        season_number,
    };
    conn.execute(
        "INSERT INTO tv_seasons (id, show_id, season_number) VALUES (?1, ?2, ?3)",
        params![season.id.to_string(), show_id.to_string(), season_number],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(season)
}

/// Attach a media item to `show`/`season`/`episode`, creating the show and
/// season rows as needed. Relinking an item moves it.
pub fn link_episode(
    conn: &Connection,
    media_id: &MediaId,
    show_title: &str,
    season: u32,
    episode: u32,
) -> Result<TvEpisode> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;
    let show = upsert_show(&tx, show_title)?;
    let season = upsert_season(&tx, show.id, season)?;
    tx.execute(
        "INSERT INTO tv_episodes (media_id, season_id, episode_number) VALUES (?1, ?2, ?3)
         ON CONFLICT(media_id) DO UPDATE SET
            season_id = excluded.season_id,
            episode_number = excluded.episode_number",
        params![media_id.as_str(), season.id.to_string(), episode],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    tx.commit().map_err(|e| Error::database(e.to_string()))?;

    Ok(TvEpisode {
        media_id: media_id.clone(),
        season_id: season.id,
        episode_number: episode,
    })
}

pub fn unlink_episode(conn: &Connection, media_id: &MediaId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM tv_episodes WHERE media_id = ?1", [media_id.as_str()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

pub fn list_shows(conn: &Connection) -> Result<Vec<TvShow>> {
    let mut stmt = conn
        .prepare("SELECT id, title FROM tv_shows ORDER BY title COLLATE NOCASE")
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], TvShow::from_row)
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}

pub fn list_seasons(conn: &Connection, show_id: ShowId) -> Result<Vec<TvSeason>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, show_id, season_number FROM tv_seasons
             WHERE show_id = ?1 ORDER BY season_number",
        )
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([show_id.to_string()], TvSeason::from_row)
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}

/// Every episode of a show, ordered by season then episode number.
pub fn list_episodes(conn: &Connection, show_id: ShowId) -> Result<Vec<TvEpisode>> {
    let mut stmt = conn
        .prepare(
            "SELECT e.media_id, e.season_id, e.episode_number
             FROM tv_episodes e JOIN tv_seasons s ON s.id = e.season_id
             WHERE s.show_id = ?1
             ORDER BY s.season_number, e.episode_number, e.media_id",
        )
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([show_id.to_string()], TvEpisode::from_row)
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}
