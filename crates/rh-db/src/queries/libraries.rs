//! Library roots and scan-run bookkeeping.

use std::path::Path;

use chrono::Utc;
use rh_core::{Error, LibraryRoot, LibraryRootId, Result, ScanRun, ScanRunId, ScanStatus};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    fmt_ts, library_root_from_row, scan_run_from_row, LIBRARY_ROOT_COLS, SCAN_RUN_COLS,
};

/// Return the root for `(path, kind)`, creating it on first use.
pub fn ensure_library_root(conn: &Connection, path: &Path, kind: &str) -> Result<LibraryRoot> {
    let path_str = path.to_string_lossy();
    let q = format!("SELECT {LIBRARY_ROOT_COLS} FROM library_roots WHERE path = ?1 AND kind = ?2");
    let existing = conn
        .query_row(&q, params![path_str, kind], library_root_from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))?;
    if let Some(root) = existing {
        return Ok(root);
    }

    let root = LibraryRoot {
        id: LibraryRootId::new(),
        path: path.to_path_buf(),
        kind: kind.to_string(),
        created_at: Utc::now(),
    };
    conn.execute(
        "INSERT INTO library_roots (id, path, kind, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            root.id.to_string(),
            path_str,
            root.kind,
            fmt_ts(&root.created_at)
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    tracing::debug!(root = %path.display(), kind, "Registered library root");
    Ok(root)
}

pub fn list_library_roots(conn: &Connection) -> Result<Vec<LibraryRoot>> {
    let q = format!("SELECT {LIBRARY_ROOT_COLS} FROM library_roots ORDER BY path, kind");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], library_root_from_row)
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}

/// Open a scan run in `running` state.
pub fn start_scan_run(conn: &Connection, root_id: LibraryRootId) -> Result<ScanRun> {
    let run = ScanRun {
        id: ScanRunId::new(),
        root_id,
        started_at: Utc::now(),
        finished_at: None,
        status: ScanStatus::Running,
        error: None,
    };
    conn.execute(
        "INSERT INTO scan_runs (id, root_id, started_at, status) VALUES (?1, ?2, ?3, ?4)",
        params![
            run.id.to_string(),
            root_id.to_string(),
            fmt_ts(&run.started_at),
            run.status.as_str()
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(run)
}

/// Finalize a running scan. Runs that are already finalized are left alone.
pub fn finish_scan_run(
    conn: &Connection,
    id: ScanRunId,
    status: ScanStatus,
    error: Option<&str>,
) -> Result<()> {
    let n = conn
        .execute(
            "UPDATE scan_runs SET finished_at = ?2, status = ?3, error = ?4
             WHERE id = ?1 AND status = 'running'",
            params![id.to_string(), fmt_ts(&Utc::now()), status.as_str(), error],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    if n == 0 {
        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM scan_runs WHERE id = ?1",
                [id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;
        if !exists {
            return Err(Error::not_found("scan_run", id));
        }
    }
    Ok(())
}

/// Most recent runs first, optionally restricted to one root.
pub fn list_scan_runs(
    conn: &Connection,
    root_id: Option<LibraryRootId>,
    limit: usize,
) -> Result<Vec<ScanRun>> {
    let q = format!(
        "SELECT {SCAN_RUN_COLS} FROM scan_runs
         WHERE ?1 IS NULL OR root_id = ?1
         ORDER BY started_at DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(
            params![root_id.map(|r| r.to_string()), limit as i64],
            scan_run_from_row,
        )
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}
