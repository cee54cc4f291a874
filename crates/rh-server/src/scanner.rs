//! Incremental library scanner.
//!
//! Walks a configured root (or a subtree of it), assigns each matching file
//! a media ID that survives rescans, diffs the result against the previous
//! snapshot of that subtree, and applies deletions and upserts to the
//! metadata store. Every scan against a writable store is bracketed by a
//! scan run row.
//!
//! The walk and the diff run against local maps. The in-memory snapshot is
//! write-locked only for the final swap, so reads keep seeing the previous
//! snapshot while a scan is in flight. Concurrent scans of overlapping
//! subtrees may race.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rh_core::config::{LibraryConfig, LibraryRootConfig};
use rh_core::{
    apply_query, Error, ListQuery, MediaId, MediaItem, NfoMetadata, Page, Result, ScanRunId,
    ScanStatus,
};
use rh_db::MediaStore;
use rh_parser::EpisodeInfo;
use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Outcome of scanning one root or subtree.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanReport {
    pub root: PathBuf,
    /// Directory or file actually walked.
    pub target: PathBuf,
    pub scanned: usize,
    pub upserted: usize,
    pub deleted: usize,
    /// Entries that could not be read and store calls that failed.
    pub errors: Vec<String>,
}

/// A matched file before identity assignment.
struct Discovered {
    path: PathBuf,
    title: String,
    episode: Option<EpisodeInfo>,
    nfo_path: Option<PathBuf>,
    poster_path: Option<PathBuf>,
    size: u64,
    modified: DateTime<Utc>,
    stable_key: String,
}

pub struct LibraryScanner {
    roots: Vec<LibraryRootConfig>,
    extensions: Vec<String>,
    allow_read_only_scan: bool,
    store: Option<Arc<dyn MediaStore>>,
    items: RwLock<HashMap<MediaId, MediaItem>>,
}

impl LibraryScanner {
    pub fn new(config: &LibraryConfig, store: Option<Arc<dyn MediaStore>>) -> Self {
        Self {
            roots: config.roots.clone(),
            extensions: config.normalized_extensions(),
            allow_read_only_scan: config.allow_read_only_scan,
            store,
            items: RwLock::new(HashMap::new()),
        }
    }

    pub fn roots(&self) -> &[LibraryRootConfig] {
        &self.roots
    }

    fn writable_store(&self) -> Option<&Arc<dyn MediaStore>> {
        self.store.as_ref().filter(|s| !s.read_only())
    }

    /// Scans are refused against a read-only store unless explicitly allowed,
    /// in which case only the in-memory snapshot is updated.
    pub fn check_scan_allowed(&self) -> Result<()> {
        match &self.store {
            Some(store) if store.read_only() && !self.allow_read_only_scan => Err(Error::Forbidden(
                "metadata store is read-only and read-only scans are disabled".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Scan every configured root. A root that cannot be scanned is reported
    /// with its error rather than aborting the others.
    pub async fn scan_all(self: Arc<Self>) -> Result<Vec<ScanReport>> {
        self.check_scan_allowed()?;
        let mut reports = Vec::with_capacity(self.roots.len());
        for (index, root) in self.roots.iter().enumerate() {
            match self.clone().scan_path(index, None).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::warn!(root = %root.path.display(), error = %e, "Library root scan failed");
                    reports.push(ScanReport {
                        root: root.path.clone(),
                        target: root.path.clone(),
                        errors: vec![e.to_string()],
                        ..Default::default()
                    });
                }
            }
        }
        Ok(reports)
    }

    /// Scan `path` inside root `root_index`, or the whole root when `path`
    /// is `None`. Relative paths resolve against the root.
    pub async fn scan_path(
        self: Arc<Self>,
        root_index: usize,
        path: Option<PathBuf>,
    ) -> Result<ScanReport> {
        tokio::task::spawn_blocking(move || self.scan_blocking(root_index, path.as_deref()))
            .await
            .map_err(|e| Error::Internal(format!("scan task failed: {e}")))?
    }

    /// Check that a scan of `path` in root `root_index` may run, without
    /// touching the store or walking anything. Returns the canonical root
    /// and the resolved target.
    pub fn validate_target(&self, root_index: usize, path: Option<&Path>) -> Result<(PathBuf, PathBuf)> {
        self.check_scan_allowed()?;
        let root_cfg = self
            .roots
            .get(root_index)
            .ok_or_else(|| Error::not_found("library root", root_index))?;
        let root = std::fs::canonicalize(&root_cfg.path).map_err(|e| {
            Error::Validation(format!(
                "library root {} is not accessible: {e}",
                root_cfg.path.display()
            ))
        })?;
        let target = resolve_target(&root, path)?;
        Ok((root, target))
    }

    /// Synchronous body of [`LibraryScanner::scan_path`].
    pub fn scan_blocking(&self, root_index: usize, path: Option<&Path>) -> Result<ScanReport> {
        let (root, target) = self.validate_target(root_index, path)?;
        let root_cfg = &self.roots[root_index];

        tracing::info!(root = %root.display(), target = %target.display(), "Starting library scan");

        let mut errors = Vec::new();
        let run = self.begin_run(&root, &root_cfg.kind, &mut errors);

        let discovered = self.discover(&target, &mut errors);
        let scanned = discovered.len();
        let previous = self.previous_snapshot(&mut errors);
        let found = self.assign_ids(discovered, &previous);

        let deleted: Vec<MediaId> = previous
            .values()
            .filter(|item| item.path.starts_with(&target) && !found.contains_key(&item.id))
            .map(|item| item.id.clone())
            .collect();
        let upserts: Vec<&(MediaItem, Option<EpisodeInfo>)> = found
            .values()
            .filter(|(item, _)| previous.get(&item.id).map_or(true, |prev| item.differs_from(prev)))
            .collect();
        let upserted = upserts.len();

        if let Some(store) = self.writable_store() {
            apply_changes(store.as_ref(), &deleted, &upserts, &mut errors);
        }

        {
            let mut items = self.items.write();
            items.retain(|id, item| !item.path.starts_with(&target) || found.contains_key(id));
            for id in &deleted {
                items.remove(id);
            }
            items.extend(found.into_iter().map(|(id, (item, _))| (id, item)));
        }

        self.finish_run(run, &errors);

        tracing::info!(
            root = %root.display(),
            scanned,
            upserted,
            deleted = deleted.len(),
            errors = errors.len(),
            "Library scan complete"
        );

        Ok(ScanReport {
            root,
            target,
            scanned,
            upserted,
            deleted: deleted.len(),
            errors,
        })
    }

    fn begin_run(&self, root: &Path, kind: &str, errors: &mut Vec<String>) -> Option<ScanRunId> {
        let store = self.writable_store()?;
        let started = store
            .ensure_library_root(root, kind)
            .and_then(|lib_root| store.start_scan_run(lib_root.id));
        match started {
            Ok(run) => Some(run.id),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to record scan run start");
                errors.push(format!("recording scan run: {e}"));
                None
            }
        }
    }

    fn finish_run(&self, run: Option<ScanRunId>, errors: &[String]) {
        let (Some(run), Some(store)) = (run, self.writable_store()) else {
            return;
        };
        let (status, error) = if errors.is_empty() {
            (ScanStatus::Success, None)
        } else {
            (ScanStatus::Failed, Some(errors.join("; ")))
        };
        if let Err(e) = store.finish_scan_run(run, status, error.as_deref()) {
            tracing::warn!(run_id = %run, error = %e, "Failed to finalize scan run");
        }
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| self.extensions.iter().any(|allowed| *allowed == e))
    }

    fn discover(&self, target: &Path, errors: &mut Vec<String>) -> Vec<Discovered> {
        if !target.exists() {
            tracing::debug!(target = %target.display(), "Scan target does not exist");
            return Vec::new();
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(target).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable entry");
                    errors.push(format!("walking {}: {e}", target.display()));
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.matches_extension(entry.path()) {
                continue;
            }
            match describe(entry.path()) {
                Ok(d) => found.push(d),
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "Skipping unreadable file");
                    errors.push(format!("{}: {e}", entry.path().display()));
                }
            }
        }
        found
    }

    /// In-memory snapshot overlaid with the store's items. Stored items win
    /// on both ID and path.
    fn previous_snapshot(&self, errors: &mut Vec<String>) -> HashMap<MediaId, MediaItem> {
        let memory = self.items.read().clone();
        let Some(store) = &self.store else {
            return memory;
        };
        match store.all_items() {
            Ok(stored) => merge_snapshot(memory, stored),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load stored items; diffing against memory");
                errors.push(format!("loading stored items: {e}"));
                memory
            }
        }
    }

    /// Store ID for the path, else the previous ID for the stable key, else
    /// a random ID (writable store) or the stable key itself.
    fn assign_ids(
        &self,
        discovered: Vec<Discovered>,
        previous: &HashMap<MediaId, MediaItem>,
    ) -> HashMap<MediaId, (MediaItem, Option<EpisodeInfo>)> {
        let by_path: HashMap<&Path, &MediaId> = previous
            .values()
            .map(|item| (item.path.as_path(), &item.id))
            .collect();
        let by_key: HashMap<&str, &MediaId> = previous
            .values()
            .map(|item| (item.stable_key.as_str(), &item.id))
            .collect();
        let writable = self.writable_store().is_some();

        let mut found = HashMap::with_capacity(discovered.len());
        for d in discovered {
            let id = by_path
                .get(d.path.as_path())
                .or_else(|| by_key.get(d.stable_key.as_str()))
                .map(|id| (*id).clone())
                .unwrap_or_else(|| {
                    if writable {
                        MediaId::random()
                    } else {
                        MediaId::new(d.stable_key.clone())
                    }
                });
            let item = MediaItem {
                id: id.clone(),
                title: d.title,
                path: d.path,
                nfo_path: d.nfo_path,
                size: d.size,
                modified: d.modified,
                stable_key: d.stable_key,
                poster_path: d.poster_path,
                season: d.episode.as_ref().map(|e| e.season),
                episode: d.episode.as_ref().map(|e| e.episode),
            };
            found.insert(id, (item, d.episode));
        }
        found
    }

    /// All known items: the store's, plus any held only in memory.
    pub fn all(&self) -> Result<Vec<MediaItem>> {
        let memory = self.items.read().clone();
        let merged = match &self.store {
            Some(store) => merge_snapshot(memory, store.all_items()?),
            None => memory,
        };
        Ok(merged.into_values().collect())
    }

    pub fn get(&self, id: &MediaId) -> Result<Option<MediaItem>> {
        if let Some(store) = &self.store {
            if let Some(item) = store.get_item(id)? {
                return Ok(Some(item));
            }
        }
        Ok(self.items.read().get(id).cloned())
    }

    pub fn list(&self, query: &ListQuery) -> Result<Page<MediaItem>> {
        Ok(apply_query(self.all()?, query))
    }

    /// Parsed metadata for `item`: the stored record, or the sidecar parsed
    /// on demand when nothing is stored.
    pub fn metadata(&self, item: &MediaItem) -> Result<Option<NfoMetadata>> {
        if let Some(store) = &self.store {
            if let Some(meta) = store.get_metadata(&item.id)? {
                return Ok(Some(meta));
            }
        }
        let Some(nfo) = &item.nfo_path else {
            return Ok(None);
        };
        match rh_parser::parse_nfo_file(nfo) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) => {
                tracing::debug!(path = %nfo.display(), error = %e, "Sidecar metadata unreadable");
                Ok(None)
            }
        }
    }
}

fn merge_snapshot(
    mut memory: HashMap<MediaId, MediaItem>,
    stored: Vec<MediaItem>,
) -> HashMap<MediaId, MediaItem> {
    let stored_paths: HashSet<PathBuf> = stored.iter().map(|i| i.path.clone()).collect();
    memory.retain(|_, item| !stored_paths.contains(&item.path));
    memory.extend(stored.into_iter().map(|item| (item.id.clone(), item)));
    memory
}

/// Write deletions and upserts, then refresh each upserted item's metadata
/// and TV grouping. Failures are collected; nothing is rolled back.
fn apply_changes(
    store: &dyn MediaStore,
    deleted: &[MediaId],
    upserts: &[&(MediaItem, Option<EpisodeInfo>)],
    errors: &mut Vec<String>,
) {
    if !deleted.is_empty() {
        if let Err(e) = store.delete_items(deleted) {
            tracing::warn!(count = deleted.len(), error = %e, "Failed to delete items");
            errors.push(format!("deleting {} items: {e}", deleted.len()));
        }
    }

    if upserts.is_empty() {
        return;
    }
    let items: Vec<MediaItem> = upserts.iter().map(|(item, _)| item.clone()).collect();
    if let Err(e) = store.upsert_items(&items) {
        tracing::warn!(count = items.len(), error = %e, "Failed to upsert items");
        errors.push(format!("upserting {} items: {e}", items.len()));
        return;
    }
    for (item, episode) in upserts {
        sync_metadata(store, item, episode.as_ref(), errors);
    }
}

fn sync_metadata(
    store: &dyn MediaStore,
    item: &MediaItem,
    episode: Option<&EpisodeInfo>,
    errors: &mut Vec<String>,
) {
    let parsed = item.nfo_path.as_ref().and_then(|nfo| match rh_parser::parse_nfo_file(nfo) {
        Ok(meta) => Some(meta),
        Err(e) => {
            tracing::warn!(path = %nfo.display(), error = %e, "Failed to parse sidecar metadata");
            errors.push(format!("{}: {e}", nfo.display()));
            None
        }
    });
    let meta = parsed.or_else(|| {
        episode.map(|ep| {
            NfoMetadata::episode_fallback(ep.show.clone(), ep.season, ep.episode, ep.episode_title.clone())
        })
    });

    let stored = match &meta {
        Some(meta) => store.put_metadata(&item.id, meta),
        None => store.clear_metadata(&item.id).map(|_| ()),
    };
    if let Err(e) = stored {
        errors.push(format!("metadata for {}: {e}", item.path.display()));
    }

    let numbering = meta
        .as_ref()
        .and_then(NfoMetadata::episode_numbering)
        .map(|(show, season, ep)| {
            let show = show
                .map(str::to_string)
                .or_else(|| episode.and_then(|e| e.show.clone()));
            (show, season, ep)
        })
        .or_else(|| episode.map(|e| (e.show.clone(), e.season, e.episode)));

    let linked = match numbering {
        Some((Some(show), season, ep)) => store.link_episode(&item.id, &show, season, ep).map(|_| ()),
        _ => store.unlink_episode(&item.id).map(|_| ()),
    };
    if let Err(e) = linked {
        errors.push(format!("tv grouping for {}: {e}", item.path.display()));
    }
}

/// Resolve a requested scan path against `root`. Relative paths join the
/// root; the result, after `..` and symlink resolution, must stay inside it.
pub fn resolve_target(root: &Path, requested: Option<&Path>) -> Result<PathBuf> {
    let Some(requested) = requested else {
        return Ok(root.to_path_buf());
    };
    let escapes = || {
        Error::Validation(format!(
            "scan path {} escapes library root {}",
            requested.display(),
            root.display()
        ))
    };

    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(escapes());
                }
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    if !normalized.starts_with(root) {
        return Err(escapes());
    }

    match std::fs::canonicalize(&normalized) {
        Ok(real) if real.starts_with(root) => Ok(real),
        Ok(_) => Err(escapes()),
        Err(_) => Ok(normalized),
    }
}

fn describe(path: &Path) -> std::io::Result<Discovered> {
    let meta = std::fs::metadata(path)?;
    let modified: DateTime<Utc> = meta.modified()?.into();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (title, episode) = rh_parser::derive_title(&stem);
    let nfo = path.with_extension("nfo");

    Ok(Discovered {
        path: path.to_path_buf(),
        title,
        episode,
        nfo_path: nfo.is_file().then_some(nfo),
        poster_path: find_poster(path, &stem),
        size: meta.len(),
        modified,
        stable_key: stable_key(path, &meta),
    })
}

fn find_poster(path: &Path, stem: &str) -> Option<PathBuf> {
    let dir = path.parent()?;
    [
        format!("{stem}-poster.jpg"),
        format!("{stem}-poster.png"),
        "poster.jpg".to_string(),
        "poster.png".to_string(),
        "folder.jpg".to_string(),
    ]
    .into_iter()
    .map(|name| dir.join(name))
    .find(|p| p.is_file())
}

/// Hash of the path and the file's OS identity, hex, 32 chars.
pub fn stable_key(path: &Path, meta: &std::fs::Metadata) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update([0u8]);
    hasher.update(file_identity(meta).as_bytes());
    let mut key = hex::encode(hasher.finalize());
    key.truncate(32);
    key
}

#[cfg(unix)]
fn file_identity(meta: &std::fs::Metadata) -> String {
    use std::os::unix::fs::MetadataExt;
    if meta.ino() != 0 {
        format!("{}:{}", meta.dev(), meta.ino())
    } else {
        size_mtime_identity(meta)
    }
}

#[cfg(not(unix))]
fn file_identity(meta: &std::fs::Metadata) -> String {
    size_mtime_identity(meta)
}

fn size_mtime_identity(meta: &std::fs::Metadata) -> String {
    let nanos = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{}:{nanos}", meta.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rh_db::SqliteStore;
    use std::time::{Duration, SystemTime};

    fn config(root: &Path) -> LibraryConfig {
        LibraryConfig {
            roots: vec![LibraryRootConfig {
                path: root.to_path_buf(),
                kind: "video".into(),
            }],
            ..Default::default()
        }
    }

    fn touch(path: &Path, contents: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn store() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::memory().unwrap())
    }

    #[test]
    fn memory_mode_uses_stable_keys_and_rescans_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Alien.mkv"), b"a");
        touch(&dir.path().join("notes.txt"), b"x");
        touch(&dir.path().join("sub/Brazil.MP4"), b"bb");

        let scanner = LibraryScanner::new(&config(dir.path()), None);
        let first = scanner.scan_blocking(0, None).unwrap();
        assert_eq!(first.scanned, 2);
        assert_eq!(first.upserted, 2);
        assert!(first.errors.is_empty());

        let items = scanner.all().unwrap();
        assert!(items.iter().all(|i| i.id.as_str() == i.stable_key));
        assert!(items.iter().all(|i| i.stable_key.len() == 32));

        let second = scanner.scan_blocking(0, None).unwrap();
        assert_eq!((second.upserted, second.deleted), (0, 0));
    }

    #[test]
    fn store_mode_rescan_is_idempotent_and_records_runs() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Alien.mkv"), b"a");
        let store = store();
        let scanner = LibraryScanner::new(&config(dir.path()), Some(store.clone()));

        assert_eq!(scanner.scan_blocking(0, None).unwrap().upserted, 1);
        let second = scanner.scan_blocking(0, None).unwrap();
        assert_eq!((second.upserted, second.deleted), (0, 0));

        let runs = store.list_scan_runs(None, 10).unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.status == ScanStatus::Success));
        assert_eq!(store.all_items().unwrap().len(), 1);
    }

    #[test]
    fn touching_a_file_keeps_its_id() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Alien.mkv");
        touch(&file, b"a");
        let store = store();
        let scanner = LibraryScanner::new(&config(dir.path()), Some(store.clone()));
        scanner.scan_blocking(0, None).unwrap();
        let before = store.all_items().unwrap().remove(0);

        let later = SystemTime::now() + Duration::from_secs(120);
        std::fs::File::options()
            .write(true)
            .open(&file)
            .unwrap()
            .set_modified(later)
            .unwrap();

        let report = scanner.scan_blocking(0, None).unwrap();
        assert_eq!(report.upserted, 1);
        let after = store.all_items().unwrap().remove(0);
        assert_eq!(before.id, after.id);
        assert_ne!(before.modified, after.modified);
    }

    #[test]
    fn subtree_scan_leaves_other_items_alone() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a/One.mkv"), b"1");
        touch(&dir.path().join("b/Two.mkv"), b"2");
        let store = store();
        let scanner = LibraryScanner::new(&config(dir.path()), Some(store.clone()));
        scanner.scan_blocking(0, None).unwrap();

        std::fs::remove_file(dir.path().join("b/Two.mkv")).unwrap();
        touch(&dir.path().join("a/Three.mkv"), b"3");

        let partial = scanner.scan_blocking(0, Some(Path::new("a"))).unwrap();
        assert_eq!((partial.upserted, partial.deleted), (1, 0));
        assert_eq!(store.all_items().unwrap().len(), 3);

        let full = scanner.scan_blocking(0, None).unwrap();
        assert_eq!(full.deleted, 1);
        let titles: Vec<String> = scanner.all().unwrap().into_iter().map(|i| i.title).collect();
        assert!(!titles.contains(&"Two".to_string()));
        assert_eq!(titles.len(), 2);
    }

    #[test]
    fn rejects_escaping_path_before_any_side_effect() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("lib");
        touch(&root.join("One.mkv"), b"1");
        let store = store();
        let scanner = LibraryScanner::new(&config(&root), Some(store.clone()));

        let err = scanner
            .scan_blocking(0, Some(Path::new("../../etc")))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{err}");
        assert!(store.list_scan_runs(None, 10).unwrap().is_empty());
        assert!(scanner.all().unwrap().is_empty());

        let err = scanner.scan_blocking(0, Some(Path::new("/etc"))).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn resolve_target_normalizes_inside_root() {
        let root = Path::new("/srv/media");
        assert_eq!(resolve_target(root, None).unwrap(), root);
        assert_eq!(
            resolve_target(root, Some(Path::new("tv/./show/../other"))).unwrap(),
            PathBuf::from("/srv/media/tv/other")
        );
        assert!(resolve_target(root, Some(Path::new("tv/../../x"))).is_err());
        assert!(resolve_target(root, Some(Path::new("/srv/media-other"))).is_err());
    }

    #[test]
    fn episode_files_get_titles_metadata_and_tv_links() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("The.Wire.S01E02.The.Detail.mkv"), b"ep");
        let store = store();
        let scanner = LibraryScanner::new(&config(dir.path()), Some(store.clone()));
        scanner.scan_blocking(0, None).unwrap();

        let item = store.all_items().unwrap().remove(0);
        assert_eq!(item.title, "The Wire S01E02 - The Detail");
        assert_eq!((item.season, item.episode), (Some(1), Some(2)));

        let meta = store.get_metadata(&item.id).unwrap().unwrap();
        assert_eq!(meta.episode_numbering(), Some((Some("The Wire"), 1, 2)));

        let shows = store.list_shows().unwrap();
        assert_eq!(shows.len(), 1);
        assert_eq!(shows[0].title, "The Wire");
        assert_eq!(store.list_episodes(shows[0].id).unwrap().len(), 1);
    }

    #[test]
    fn sidecar_metadata_is_stored_and_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("Alien.mkv");
        let nfo = dir.path().join("Alien.nfo");
        touch(&video, b"a");
        touch(&nfo, b"<movie><title>Alien</title><year>1979</year></movie>");
        let store = store();
        let scanner = LibraryScanner::new(&config(dir.path()), Some(store.clone()));
        scanner.scan_blocking(0, None).unwrap();

        let item = store.all_items().unwrap().remove(0);
        assert_eq!(item.nfo_path.as_deref(), Some(nfo.as_path()));
        let meta = store.get_metadata(&item.id).unwrap().unwrap();
        assert_eq!(meta.kind(), "movie");

        std::fs::remove_file(&nfo).unwrap();
        let report = scanner.scan_blocking(0, None).unwrap();
        assert_eq!(report.upserted, 1);
        assert!(store.get_metadata(&item.id).unwrap().is_none());
    }

    #[test]
    fn read_only_store_refuses_scans_unless_allowed() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Alien.mkv"), b"a");
        let pool = rh_db::pool::init_memory_pool().unwrap();
        let read_only: Arc<dyn MediaStore> = Arc::new(SqliteStore::new(pool, true));

        let scanner = LibraryScanner::new(&config(dir.path()), Some(read_only.clone()));
        let err = scanner.scan_blocking(0, None).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let mut cfg = config(dir.path());
        cfg.read_only = true;
        cfg.allow_read_only_scan = true;
        let scanner = LibraryScanner::new(&cfg, Some(read_only.clone()));
        let report = scanner.scan_blocking(0, None).unwrap();
        assert_eq!(report.upserted, 1);
        assert!(report.errors.is_empty());
        assert!(read_only.all_items().unwrap().is_empty());
        let items = scanner.all().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id.as_str(), items[0].stable_key);
    }

    #[test]
    fn store_failures_mark_the_run_failed() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Alien.mkv"), b"a");
        let store = store();
        rh_db::pool::get_conn(store.pool())
            .unwrap()
            .execute_batch("DROP TABLE media_metadata")
            .unwrap();

        let scanner = LibraryScanner::new(&config(dir.path()), Some(store.clone()));
        let report = scanner.scan_blocking(0, None).unwrap();
        assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
        assert_eq!(store.all_items().unwrap().len(), 1);

        let run = store.list_scan_runs(None, 1).unwrap().remove(0);
        assert_eq!(run.status, ScanStatus::Failed);
        assert!(run.error.unwrap().contains("metadata for"));
    }

    #[test]
    fn listing_sorts_and_pages() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("zodiac.mkv"), b"1");
        touch(&dir.path().join("Alien.mkv"), b"22");
        touch(&dir.path().join("Brazil.mkv"), b"333");
        let scanner = LibraryScanner::new(&config(dir.path()), None);
        scanner.scan_blocking(0, None).unwrap();

        let page = scanner.list(&ListQuery::default()).unwrap();
        let titles: Vec<&str> = page.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Alien", "Brazil", "zodiac"]);

        let page = scanner
            .list(&ListQuery {
                offset: 10,
                ..Default::default()
            })
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn scan_all_reports_each_root() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("films/Alien.mkv"), b"a");
        let mut cfg = config(&dir.path().join("films"));
        cfg.roots.push(LibraryRootConfig {
            path: dir.path().join("missing"),
            kind: "video".into(),
        });
        let scanner = Arc::new(LibraryScanner::new(&cfg, None));
        let reports = scanner.scan_all().await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].upserted, 1);
        assert_eq!(reports[1].errors.len(), 1);
    }
}
