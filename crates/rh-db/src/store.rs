//! The persistence interface consumed by the scanner and the transcoding
//! manager, and its SQLite implementation.
//!
//! [`MediaStore`] is synchronous. Async callers run it on the blocking pool
//! (`tokio::task::spawn_blocking`) or accept the short pool checkout on the
//! request path, the same way the query modules are used elsewhere.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use rh_core::{
    CollectionId, Error, JobId, LibraryRoot, LibraryRootId, ListQuery, MediaId, MediaItem,
    NfoMetadata, Page, ProfileId, Result, ScanRun, ScanRunId, ScanStatus, ShowId,
    TranscodingCache, TranscodingProfile,
};

use crate::models::{Collection, PlaybackState, TvEpisode, TvSeason, TvShow, UserFlags};
use crate::pool::{
    get_conn, init_memory_pool, init_pool, init_read_only_pool, DbPool, PooledConnection,
};
use crate::queries::{
    collections, libraries, media_items, metadata, playback, profiles, transcode_cache, tv,
};

/// Persistent storage for library items and everything hanging off them.
///
/// Implementations report [`MediaStore::read_only`]; callers must not
/// attempt writes against a read-only store, and implementations reject
/// them with [`Error::Forbidden`] when they do.
pub trait MediaStore: Send + Sync {
    fn read_only(&self) -> bool;

    // -- media items --
    fn upsert_items(&self, items: &[MediaItem]) -> Result<()>;
    fn delete_items(&self, ids: &[MediaId]) -> Result<usize>;
    fn get_item(&self, id: &MediaId) -> Result<Option<MediaItem>>;
    fn get_item_by_path(&self, path: &Path) -> Result<Option<MediaItem>>;
    fn all_items(&self) -> Result<Vec<MediaItem>>;
    fn list_items(&self, query: &ListQuery) -> Result<Page<MediaItem>>;

    // -- sidecar metadata --
    fn put_metadata(&self, id: &MediaId, meta: &NfoMetadata) -> Result<()>;
    fn get_metadata(&self, id: &MediaId) -> Result<Option<NfoMetadata>>;
    fn clear_metadata(&self, id: &MediaId) -> Result<bool>;
    fn put_extended_metadata(&self, id: &MediaId, data: &serde_json::Value) -> Result<()>;
    fn get_extended_metadata(&self, id: &MediaId) -> Result<Option<serde_json::Value>>;

    // -- playback and user flags --
    fn save_playback(&self, state: &PlaybackState) -> Result<()>;
    fn get_playback(&self, id: &MediaId, client_id: &str) -> Result<Option<PlaybackState>>;
    fn list_in_progress(&self, client_id: &str, limit: usize) -> Result<Vec<PlaybackState>>;
    fn set_favorite(&self, id: &MediaId, client_id: &str, favorite: bool) -> Result<()>;
    fn set_watched(&self, id: &MediaId, client_id: &str, watched: bool) -> Result<()>;
    fn get_user_flags(&self, id: &MediaId, client_id: &str) -> Result<UserFlags>;
    fn list_favorites(&self, client_id: &str) -> Result<Vec<MediaId>>;

    // -- collections --
    fn create_collection(&self, name: &str) -> Result<Collection>;
    fn list_collections(&self) -> Result<Vec<Collection>>;
    fn delete_collection(&self, id: CollectionId) -> Result<bool>;
    fn add_to_collection(&self, id: CollectionId, media_id: &MediaId) -> Result<()>;
    fn remove_from_collection(&self, id: CollectionId, media_id: &MediaId) -> Result<bool>;
    fn collection_items(&self, id: CollectionId) -> Result<Vec<MediaId>>;

    // -- transcoding profiles --
    fn put_profile(&self, profile: &TranscodingProfile) -> Result<()>;
    fn get_profile(&self, id: &ProfileId) -> Result<Option<TranscodingProfile>>;
    fn list_profiles(&self) -> Result<Vec<TranscodingProfile>>;
    fn delete_profile(&self, id: &ProfileId) -> Result<bool>;

    // -- transcoding cache --
    fn get_cache(&self, id: &JobId) -> Result<Option<TranscodingCache>>;
    fn put_cache(&self, entry: &TranscodingCache) -> Result<()>;
    fn touch_cache(&self, id: &JobId) -> Result<()>;
    fn delete_cache(&self, id: &JobId) -> Result<bool>;
    /// Rows whose last access is older than `max_age`.
    fn expired_cache(&self, max_age: Duration) -> Result<Vec<TranscodingCache>>;
    /// Delete rows whose last access is older than `max_age`, returning them.
    fn delete_cache_older_than(&self, max_age: Duration) -> Result<Vec<TranscodingCache>>;

    // -- library roots and scan runs --
    fn ensure_library_root(&self, path: &Path, kind: &str) -> Result<LibraryRoot>;
    fn list_library_roots(&self) -> Result<Vec<LibraryRoot>>;
    fn start_scan_run(&self, root_id: LibraryRootId) -> Result<ScanRun>;
    fn finish_scan_run(&self, id: ScanRunId, status: ScanStatus, error: Option<&str>) -> Result<()>;
    fn list_scan_runs(&self, root_id: Option<LibraryRootId>, limit: usize) -> Result<Vec<ScanRun>>;

    // -- TV grouping --
    fn link_episode(&self, id: &MediaId, show: &str, season: u32, episode: u32) -> Result<TvEpisode>;
    fn unlink_episode(&self, id: &MediaId) -> Result<bool>;
    fn list_shows(&self) -> Result<Vec<TvShow>>;
    fn list_seasons(&self, show_id: ShowId) -> Result<Vec<TvSeason>>;
    fn list_episodes(&self, show_id: ShowId) -> Result<Vec<TvEpisode>>;
}

/// [`MediaStore`] over an r2d2 SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
    read_only: bool,
}

impl SqliteStore {
    pub fn new(pool: DbPool, read_only: bool) -> Self {
        Self { pool, read_only }
    }

    /// Open the database at `path`. A writable store creates and migrates
    /// it as needed. A read-only store opens an existing file with SQLite's
    /// read-only flag, and falls back to a fresh migrated file otherwise.
    pub fn open(path: &str, read_only: bool) -> Result<Self> {
        let pool = if read_only && std::path::Path::new(path).is_file() {
            init_read_only_pool(std::path::Path::new(path))?
        } else {
            init_pool(path)?
        };
        Ok(Self::new(pool, read_only))
    }

    /// A fresh isolated in-memory store.
    pub fn memory() -> Result<Self> {
        Ok(Self::new(init_memory_pool()?, false))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn conn(&self) -> Result<PooledConnection> {
        get_conn(&self.pool)
    }

    /// Connection for a write, refused when the store is read-only.
    fn write_conn(&self) -> Result<PooledConnection> {
        if self.read_only {
            return Err(Error::Forbidden("metadata store is read-only".into()));
        }
        self.conn()
    }
}

fn cutoff(max_age: Duration) -> Result<chrono::DateTime<Utc>> {
    let age = chrono::Duration::from_std(max_age)
        .map_err(|e| Error::Validation(format!("cache age out of range: {e}")))?;
    Ok(Utc::now() - age)
}

impl MediaStore for SqliteStore {
    fn read_only(&self) -> bool {
        self.read_only
    }

    fn upsert_items(&self, items: &[MediaItem]) -> Result<()> {
        media_items::upsert_items(&*self.write_conn()?, items)
    }

    fn delete_items(&self, ids: &[MediaId]) -> Result<usize> {
        media_items::delete_items(&*self.write_conn()?, ids)
    }

    fn get_item(&self, id: &MediaId) -> Result<Option<MediaItem>> {
        media_items::get_item(&*self.conn()?, id)
    }

    fn get_item_by_path(&self, path: &Path) -> Result<Option<MediaItem>> {
        media_items::get_item_by_path(&*self.conn()?, path)
    }

    fn all_items(&self) -> Result<Vec<MediaItem>> {
        media_items::all_items(&*self.conn()?)
    }

    fn list_items(&self, query: &ListQuery) -> Result<Page<MediaItem>> {
        media_items::list_items(&*self.conn()?, query)
    }

    fn put_metadata(&self, id: &MediaId, meta: &NfoMetadata) -> Result<()> {
        metadata::put_metadata(&*self.write_conn()?, id, meta)
    }

    fn get_metadata(&self, id: &MediaId) -> Result<Option<NfoMetadata>> {
        metadata::get_metadata(&*self.conn()?, id)
    }

    fn clear_metadata(&self, id: &MediaId) -> Result<bool> {
        metadata::clear_metadata(&*self.write_conn()?, id)
    }

    fn put_extended_metadata(&self, id: &MediaId, data: &serde_json::Value) -> Result<()> {
        metadata::put_extended_metadata(&*self.write_conn()?, id, data)
    }

    fn get_extended_metadata(&self, id: &MediaId) -> Result<Option<serde_json::Value>> {
        metadata::get_extended_metadata(&*self.conn()?, id)
    }

    fn save_playback(&self, state: &PlaybackState) -> Result<()> {
        playback::save_playback(&*self.write_conn()?, state)
    }

    fn get_playback(&self, id: &MediaId, client_id: &str) -> Result<Option<PlaybackState>> {
        playback::get_playback(&*self.conn()?, id, client_id)
    }

    fn list_in_progress(&self, client_id: &str, limit: usize) -> Result<Vec<PlaybackState>> {
        playback::list_in_progress(&*self.conn()?, client_id, limit)
    }

    fn set_favorite(&self, id: &MediaId, client_id: &str, favorite: bool) -> Result<()> {
        playback::set_favorite(&*self.write_conn()?, id, client_id, favorite)
    }

    fn set_watched(&self, id: &MediaId, client_id: &str, watched: bool) -> Result<()> {
        playback::set_watched(&*self.write_conn()?, id, client_id, watched)
    }

    fn get_user_flags(&self, id: &MediaId, client_id: &str) -> Result<UserFlags> {
        playback::get_user_flags(&*self.conn()?, id, client_id)
    }

    fn list_favorites(&self, client_id: &str) -> Result<Vec<MediaId>> {
        playback::list_favorites(&*self.conn()?, client_id)
    }

    fn create_collection(&self, name: &str) -> Result<Collection> {
        collections::create_collection(&*self.write_conn()?, name)
    }

    fn list_collections(&self) -> Result<Vec<Collection>> {
        collections::list_collections(&*self.conn()?)
    }

    fn delete_collection(&self, id: CollectionId) -> Result<bool> {
        collections::delete_collection(&*self.write_conn()?, id)
    }

    fn add_to_collection(&self, id: CollectionId, media_id: &MediaId) -> Result<()> {
        collections::add_to_collection(&*self.write_conn()?, id, media_id)
    }

    fn remove_from_collection(&self, id: CollectionId, media_id: &MediaId) -> Result<bool> {
        collections::remove_from_collection(&*self.write_conn()?, id, media_id)
    }

    fn collection_items(&self, id: CollectionId) -> Result<Vec<MediaId>> {
        collections::collection_items(&*self.conn()?, id)
    }

    fn put_profile(&self, profile: &TranscodingProfile) -> Result<()> {
        profiles::put_profile(&*self.write_conn()?, profile)
    }

    fn get_profile(&self, id: &ProfileId) -> Result<Option<TranscodingProfile>> {
        profiles::get_profile(&*self.conn()?, id)
    }

    fn list_profiles(&self) -> Result<Vec<TranscodingProfile>> {
        profiles::list_profiles(&*self.conn()?)
    }

    fn delete_profile(&self, id: &ProfileId) -> Result<bool> {
        profiles::delete_profile(&*self.write_conn()?, id)
    }

    fn get_cache(&self, id: &JobId) -> Result<Option<TranscodingCache>> {
        transcode_cache::get_cache(&*self.conn()?, id)
    }

    fn put_cache(&self, entry: &TranscodingCache) -> Result<()> {
        transcode_cache::put_cache(&*self.write_conn()?, entry)
    }

    fn touch_cache(&self, id: &JobId) -> Result<()> {
        transcode_cache::touch_cache(&*self.write_conn()?, id, Utc::now())
    }

    fn delete_cache(&self, id: &JobId) -> Result<bool> {
        transcode_cache::delete_cache(&*self.write_conn()?, id)
    }

    fn expired_cache(&self, max_age: Duration) -> Result<Vec<TranscodingCache>> {
        transcode_cache::expired_cache(&*self.conn()?, cutoff(max_age)?)
    }

    fn delete_cache_older_than(&self, max_age: Duration) -> Result<Vec<TranscodingCache>> {
        transcode_cache::delete_cache_older_than(&*self.write_conn()?, cutoff(max_age)?)
    }

    fn ensure_library_root(&self, path: &Path, kind: &str) -> Result<LibraryRoot> {
        libraries::ensure_library_root(&*self.write_conn()?, path, kind)
    }

    fn list_library_roots(&self) -> Result<Vec<LibraryRoot>> {
        libraries::list_library_roots(&*self.conn()?)
    }

    fn start_scan_run(&self, root_id: LibraryRootId) -> Result<ScanRun> {
        libraries::start_scan_run(&*self.write_conn()?, root_id)
    }

    fn finish_scan_run(&self, id: ScanRunId, status: ScanStatus, error: Option<&str>) -> Result<()> {
        libraries::finish_scan_run(&*self.write_conn()?, id, status, error)
    }

    fn list_scan_runs(&self, root_id: Option<LibraryRootId>, limit: usize) -> Result<Vec<ScanRun>> {
        libraries::list_scan_runs(&*self.conn()?, root_id, limit)
    }

    fn link_episode(&self, id: &MediaId, show: &str, season: u32, episode: u32) -> Result<TvEpisode> {
        tv::link_episode(&*self.write_conn()?, id, show, season, episode)
    }

    fn unlink_episode(&self, id: &MediaId) -> Result<bool> {
        tv::unlink_episode(&*self.write_conn()?, id)
    }

    fn list_shows(&self) -> Result<Vec<TvShow>> {
        tv::list_shows(&*self.conn()?)
    }

    fn list_seasons(&self, show_id: ShowId) -> Result<Vec<TvSeason>> {
        tv::list_seasons(&*self.conn()?, show_id)
    }

    fn list_episodes(&self, show_id: ShowId) -> Result<Vec<TvEpisode>> {
        tv::list_episodes(&*self.conn()?, show_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn item(id: &str) -> MediaItem {
        MediaItem {
            id: MediaId::new(id),
            title: id.to_uppercase(),
            path: PathBuf::from(format!("/lib/{id}.mp4")),
            nfo_path: None,
            size: 7,
            modified: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            stable_key: format!("key-{id}"),
            poster_path: None,
            season: None,
            episode: None,
        }
    }

    #[test]
    fn usable_as_trait_object() {
        let store: Arc<dyn MediaStore> = Arc::new(SqliteStore::memory().unwrap());
        store.upsert_items(&[item("a"), item("b")]).unwrap();
        assert_eq!(store.all_items().unwrap().len(), 2);
        let found = store.get_item_by_path(Path::new("/lib/a.mp4")).unwrap().unwrap();
        assert_eq!(found.id, MediaId::new("a"));
        assert_eq!(store.delete_items(&[MediaId::new("a")]).unwrap(), 1);
        assert!(store.get_item(&MediaId::new("a")).unwrap().is_none());
    }

    #[test]
    fn read_only_store_rejects_writes_but_reads() {
        let writable = SqliteStore::memory().unwrap();
        writable.upsert_items(&[item("a")]).unwrap();

        let ro = SqliteStore::new(writable.pool().clone(), true);
        assert!(ro.read_only());
        assert_eq!(ro.all_items().unwrap().len(), 1);

        let err = ro.upsert_items(&[item("b")]).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(matches!(
            ro.put_cache(&TranscodingCache {
                id: JobId::new("j"),
                media_id: MediaId::new("a"),
                profile_id: ProfileId::new("p"),
                path: PathBuf::from("/c/j.mp4"),
                created_at: Utc::now(),
                last_accessed: Utc::now(),
                size_bytes: 0,
            }),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(ro.touch_cache(&JobId::new("j")), Err(Error::Forbidden(_))));
    }

    #[test]
    fn cache_age_sweep() {
        let store = SqliteStore::memory().unwrap();
        let old = Utc::now() - chrono::Duration::hours(48);
        store
            .put_cache(&TranscodingCache {
                id: JobId::new("old"),
                media_id: MediaId::new("a"),
                profile_id: ProfileId::new("p"),
                path: PathBuf::from("/c/old.mp4"),
                created_at: old,
                last_accessed: old,
                size_bytes: 1,
            })
            .unwrap();
        let day = Duration::from_secs(86_400);
        assert_eq!(store.expired_cache(day).unwrap().len(), 1);
        assert_eq!(store.delete_cache_older_than(day).unwrap().len(), 1);
        assert!(store.expired_cache(day).unwrap().is_empty());
    }

    #[test]
    fn scan_bookkeeping_through_store() {
        let store = SqliteStore::memory().unwrap();
        let root = store.ensure_library_root(Path::new("/lib"), "video").unwrap();
        let run = store.start_scan_run(root.id).unwrap();
        store.finish_scan_run(run.id, ScanStatus::Success, None).unwrap();
        let runs = store.list_scan_runs(None, 5).unwrap();
        assert_eq!(runs[0].status, ScanStatus::Success);
    }
}
