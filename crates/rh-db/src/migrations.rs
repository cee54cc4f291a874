//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order. A
//! `schema_migrations` table tracks which versions have been applied.

use rusqlite::Connection;
use rh_core::{Error, Result};

/// V1: library items, sidecar metadata, user state, and scan bookkeeping.
const V1_INITIAL: &str = r#"
CREATE TABLE media_items (
    id          TEXT PRIMARY KEY,
    title       TEXT NOT NULL,
    path        TEXT NOT NULL UNIQUE,
    nfo_path    TEXT,
    size        INTEGER NOT NULL,
    modified    TEXT NOT NULL,
    stable_key  TEXT NOT NULL,
    poster_path TEXT,
    season      INTEGER,
    episode     INTEGER,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX idx_media_items_title ON media_items(title COLLATE NOCASE);
CREATE INDEX idx_media_items_stable_key ON media_items(stable_key);

CREATE TABLE media_metadata (
    media_id   TEXT PRIMARY KEY REFERENCES media_items(id) ON DELETE CASCADE,
    kind       TEXT NOT NULL,
    title      TEXT,
    data       TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE media_metadata_ext (
    media_id   TEXT PRIMARY KEY REFERENCES media_items(id) ON DELETE CASCADE,
    data       TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE playback_state (
    media_id      TEXT NOT NULL REFERENCES media_items(id) ON DELETE CASCADE,
    client_id     TEXT NOT NULL,
    position_secs REAL NOT NULL DEFAULT 0,
    duration_secs REAL,
    completed     INTEGER NOT NULL DEFAULT 0,
    updated_at    TEXT NOT NULL,
    PRIMARY KEY (media_id, client_id)
);

CREATE TABLE user_flags (
    media_id   TEXT NOT NULL REFERENCES media_items(id) ON DELETE CASCADE,
    client_id  TEXT NOT NULL,
    favorite   INTEGER NOT NULL DEFAULT 0,
    watched    INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (media_id, client_id)
);

CREATE TABLE collections (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE collection_items (
    collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    media_id      TEXT NOT NULL REFERENCES media_items(id) ON DELETE CASCADE,
    added_at      TEXT NOT NULL,
    PRIMARY KEY (collection_id, media_id)
);

CREATE TABLE library_roots (
    id         TEXT PRIMARY KEY,
    path       TEXT NOT NULL,
    kind       TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (path, kind)
);

CREATE TABLE scan_runs (
    id          TEXT PRIMARY KEY,
    root_id     TEXT NOT NULL REFERENCES library_roots(id) ON DELETE CASCADE,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    status      TEXT NOT NULL,
    error       TEXT
);
CREATE INDEX idx_scan_runs_root ON scan_runs(root_id, started_at);
"#;

/// V2: transcoding profiles and the completed-encode cache.
const V2_TRANSCODING: &str = r#"
CREATE TABLE transcoding_profiles (
    id         TEXT PRIMARY KEY,
    data       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE transcoding_cache (
    id            TEXT PRIMARY KEY,
    media_id      TEXT NOT NULL,
    profile_id    TEXT NOT NULL,
    path          TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    last_accessed TEXT NOT NULL,
    size_bytes    INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX idx_transcoding_cache_accessed ON transcoding_cache(last_accessed);
"#;

/// V3: TV show / season / episode grouping.
const V3_TV_GROUPING: &str = r#"
CREATE TABLE tv_shows (
    id         TEXT PRIMARY KEY,
    title      TEXT NOT NULL UNIQUE COLLATE NOCASE,
    created_at TEXT NOT NULL
);

CREATE TABLE tv_seasons (
    id            TEXT PRIMARY KEY,
    show_id       TEXT NOT NULL REFERENCES tv_shows(id) ON DELETE CASCADE,
    season_number INTEGER NOT NULL,
    UNIQUE (show_id, season_number)
);

CREATE TABLE tv_episodes (
    media_id       TEXT PRIMARY KEY REFERENCES media_items(id) ON DELETE CASCADE,
    season_id      TEXT NOT NULL REFERENCES tv_seasons(id) ON DELETE CASCADE,
    episode_number INTEGER NOT NULL
);
CREATE INDEX idx_tv_episodes_season ON tv_episodes(season_id, episode_number);
"#;

/// Ordered list of (version, sql) pairs.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, V1_INITIAL),
    (2, V2_TRANSCODING),
    (3, V3_TV_GROUPING),
];

/// Run all pending migrations on `conn`.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;
        tracing::debug!(version, "Applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }

    #[test]
    fn all_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();

        let tables = [
            "media_items",
            "media_metadata",
            "media_metadata_ext",
            "playback_state",
            "user_flags",
            "collections",
            "collection_items",
            "library_roots",
            "scan_runs",
            "transcoding_profiles",
            "transcoding_cache",
            "tv_shows",
            "tv_seasons",
            "tv_episodes",
            "schema_migrations",
        ];
        for t in &tables {
            let exists: bool = conn
                .query_row(
                    "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                    [t],
                    |row| row.get(0),
                )
                .unwrap();
            assert!(exists, "table {t} should exist");
        }
    }
}
