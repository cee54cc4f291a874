//! r2d2 pools over SQLite.
//!
//! Every pool enables foreign keys on each new connection. Writable pools
//! run pending migrations before they are handed out; read-only pools open
//! the file with `SQLITE_OPEN_READ_ONLY` and trust the existing schema.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rh_core::{Error, Result};
use rusqlite::OpenFlags;

use crate::migrations;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const FILE_POOL_SIZE: u32 = 8;
const MEMORY_POOL_SIZE: u32 = 4;

fn build(manager: SqliteConnectionManager, max_size: u32, migrate: bool) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(max_size)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to create connection pool: {e}")))?;
    if migrate {
        migrations::run_migrations(&*get_conn(&pool)?)?;
    }
    Ok(pool)
}

/// Writable pool over the database file at `db_path`, created and migrated
/// as needed. Connections use WAL and wait up to five seconds on locks.
pub fn init_pool(db_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
    });
    build(manager, FILE_POOL_SIZE, true)
}

/// Pool that can only read the existing database at `db_path`.
pub fn init_read_only_pool(db_path: &Path) -> Result<DbPool> {
    if !db_path.is_file() {
        return Err(Error::not_found("database", db_path.display()));
    }
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    build(manager, FILE_POOL_SIZE, false)
}

/// Fresh in-memory database. Each call gets its own shared-cache name, so
/// connections within one pool see the same data and separate pools
/// (parallel tests) never do.
pub fn init_memory_pool() -> Result<DbPool> {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let uri = format!(
        "file:rh_memdb_{}_{}?mode=memory&cache=shared",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    );
    let manager = SqliteConnectionManager::file(uri)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    build(manager, MEMORY_POOL_SIZE, true)
}

pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("Failed to get connection from pool: {e}")))
}
