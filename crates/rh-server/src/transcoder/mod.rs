//! Transcoding manager.
//!
//! Owns the job table, reuses cached output, and runs encodes on spawned
//! tasks. Jobs are keyed by a hash of `(media, profile)`, so concurrent
//! requests for the same output share one encode.

pub mod hls;
pub mod jobs;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rh_av::{decide_audio, AudioDecision, EncodeOptions, Encoder, StreamSelection};
use rh_core::config::TranscodingConfig;
use rh_core::{
    AudioSelection, AudioStream, Error, JobId, JobKind, JobStatus, MediaId, MediaItem, ProfileId,
    Result, TranscodingCache, TranscodingJob, TranscodingProfile,
};
use rh_db::MediaStore;
use rh_media::generate_master_playlist;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use self::hls::{PlannedRendition, MASTER_PLAYLIST, VARIANT_PLAYLIST, VIDEO_DIR};
use self::jobs::{Claim, JobTable};

/// Deterministic job ID: the first 16 hex chars of `sha256("media:profile")`,
/// with `_hls` appended for HLS jobs.
pub fn job_id(media_id: &MediaId, profile_id: &ProfileId, kind: JobKind) -> JobId {
    let digest = Sha256::digest(format!("{media_id}:{profile_id}").as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(16);
    if kind == JobKind::Hls {
        id.push_str("_hls");
    }
    JobId::new(id)
}

/// Work to run once a job has been claimed.
enum Work {
    File {
        output: PathBuf,
        selection: AudioSelection,
    },
    Hls {
        dir: PathBuf,
        renditions: Vec<PlannedRendition>,
    },
}

pub struct TranscodingManager {
    encoder: Arc<dyn Encoder>,
    store: Option<Arc<dyn MediaStore>>,
    cache_dir: PathBuf,
    segment_secs: u32,
    delete_files_on_evict: bool,
    jobs: JobTable,
}

impl TranscodingManager {
    pub fn new(
        config: &TranscodingConfig,
        encoder: Arc<dyn Encoder>,
        store: Option<Arc<dyn MediaStore>>,
    ) -> Self {
        Self {
            encoder,
            store,
            cache_dir: config.cache_dir.clone(),
            segment_secs: config.hls_segment_secs.max(1),
            delete_files_on_evict: config.delete_files_on_evict,
            jobs: JobTable::new(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory holding an HLS job's playlists and segments.
    pub fn output_dir_for(&self, job_id: &JobId) -> PathBuf {
        self.cache_dir.join("hls").join(job_id.as_str())
    }

    fn file_output(&self, job_id: &JobId, container: &str) -> PathBuf {
        let ext = if container.is_empty() { "mp4" } else { container };
        self.cache_dir.join(format!("{job_id}.{ext}"))
    }

    fn writable_store(&self) -> Option<&Arc<dyn MediaStore>> {
        self.store.as_ref().filter(|s| !s.read_only())
    }

    pub fn job(&self, id: &JobId) -> Option<TranscodingJob> {
        self.jobs.get(id)
    }

    pub fn jobs(&self) -> Vec<TranscodingJob> {
        self.jobs.snapshot()
    }

    /// Cancel a job and stop its encoder. Returns `None` for unknown IDs.
    pub fn cancel(&self, id: &JobId) -> Option<TranscodingJob> {
        let job = self.jobs.cancel(id)?;
        tracing::info!(job_id = %id, status = %job.status, "Cancel requested");
        Some(job)
    }

    /// Start (or reuse) a single-file transcode of `item` for `profile`.
    pub fn start_transcoding(
        self: &Arc<Self>,
        item: &MediaItem,
        profile: &TranscodingProfile,
        selection: &AudioSelection,
    ) -> Result<TranscodingJob> {
        let id = job_id(&item.id, &profile.id, JobKind::File);
        let output = self.file_output(&id, &profile.container);
        self.start(
            id,
            JobKind::File,
            item,
            profile,
            Work::File {
                output,
                selection: selection.clone(),
            },
        )
    }

    /// Start (or reuse) an HLS package of `item` with one audio rendition
    /// per eligible stream in `streams`.
    pub fn start_hls_transcoding(
        self: &Arc<Self>,
        item: &MediaItem,
        profile: &TranscodingProfile,
        streams: &[AudioStream],
        selection: &AudioSelection,
    ) -> Result<TranscodingJob> {
        let id = job_id(&item.id, &profile.id, JobKind::Hls);
        let dir = self.output_dir_for(&id);
        let renditions = hls::plan_renditions(profile, streams, selection);
        self.start(id, JobKind::Hls, item, profile, Work::Hls { dir, renditions })
    }

    fn start(
        self: &Arc<Self>,
        id: JobId,
        kind: JobKind,
        item: &MediaItem,
        profile: &TranscodingProfile,
        work: Work,
    ) -> Result<TranscodingJob> {
        if let Some(job) = self.jobs.get(&id).filter(|j| j.status.is_active()) {
            return Ok(job);
        }
        if let Some(job) = self.cached_job(&id, kind)? {
            tracing::debug!(job_id = %id, "Serving cached transcode");
            return Ok(job);
        }

        let job = TranscodingJob {
            id: id.clone(),
            media_id: item.id.clone(),
            profile_id: profile.id.clone(),
            kind,
            status: JobStatus::Pending,
            progress: 0.0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            output_path: None,
        };
        let (job, cancel) = match self.jobs.get_or_create(job) {
            Claim::Existing(job) => return Ok(job),
            Claim::Created(job, cancel) => (job, cancel),
        };

        tracing::info!(
            job_id = %id,
            media_id = %item.id,
            profile_id = %profile.id,
            kind = ?kind,
            "Transcode queued"
        );

        let this = Arc::clone(self);
        let input = item.path.clone();
        let profile = profile.clone();
        tokio::spawn(async move {
            this.run(id, input, profile, work, cancel).await;
        });
        Ok(job)
    }

    /// A completed job for `id` whose output still exists, if any.
    ///
    /// Store rows are authoritative; a row whose file is gone is dropped.
    /// Without a usable cache row, a finished in-memory job still counts.
    fn cached_job(&self, id: &JobId, kind: JobKind) -> Result<Option<TranscodingJob>> {
        if let Some(store) = &self.store {
            if let Some(entry) = store.get_cache(id)? {
                if entry.path.exists() {
                    if !store.read_only() {
                        store.touch_cache(id)?;
                    }
                    return Ok(Some(TranscodingJob {
                        id: entry.id,
                        media_id: entry.media_id,
                        profile_id: entry.profile_id,
                        kind,
                        status: JobStatus::Completed,
                        progress: 100.0,
                        created_at: entry.created_at,
                        started_at: Some(entry.created_at),
                        finished_at: Some(entry.created_at),
                        error: None,
                        output_path: Some(entry.path),
                    }));
                }
                tracing::info!(job_id = %id, path = %entry.path.display(), "Cached output missing");
                if !store.read_only() {
                    store.delete_cache(id)?;
                }
            }
        }

        Ok(self.jobs.get(id).filter(|job| {
            job.status == JobStatus::Completed
                && job.output_path.as_deref().is_some_and(Path::exists)
        }))
    }

    async fn run(
        self: Arc<Self>,
        id: JobId,
        input: PathBuf,
        profile: TranscodingProfile,
        work: Work,
        cancel: CancellationToken,
    ) {
        let started = self.jobs.transition(&id, JobStatus::Running, |job| {
            job.started_at = Some(Utc::now());
        });
        let Some(job) = started else {
            tracing::debug!(job_id = %id, "Job cancelled before start");
            return;
        };

        let result = match &work {
            Work::File { output, selection } => self
                .encode_file(&input, output, &profile, selection, &cancel)
                .await
                .map(|()| output.clone()),
            Work::Hls { dir, renditions } => self
                .encode_hls(&id, &input, dir, &profile, renditions, &cancel)
                .await
                .map(|()| dir.join(MASTER_PLAYLIST)),
        };

        match result {
            Ok(output) => self.complete(job, output).await,
            Err(Error::Cancelled(_)) => {
                self.jobs.transition(&id, JobStatus::Cancelled, |job| {
                    job.finished_at = Some(Utc::now());
                });
                tracing::info!(job_id = %id, "Transcode cancelled");
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(job_id = %id, error = %message, "Transcode failed");
                if let Work::Hls { dir, .. } = &work {
                    if let Err(e) = clear_dir(dir).await {
                        tracing::warn!(job_id = %id, error = %e, "Failed to remove partial HLS output");
                    }
                }
                self.jobs.transition(&id, JobStatus::Failed, |job| {
                    job.error = Some(message);
                    job.finished_at = Some(Utc::now());
                });
            }
        }
    }

    async fn complete(&self, job: TranscodingJob, output: PathBuf) {
        let finished = self.jobs.transition(&job.id, JobStatus::Completed, |j| {
            j.progress = 100.0;
            j.finished_at = Some(Utc::now());
            j.output_path = Some(output.clone());
        });
        if finished.is_none() {
            return;
        }
        tracing::info!(job_id = %job.id, output = %output.display(), "Transcode completed");

        let Some(store) = self.writable_store() else {
            return;
        };
        let size_bytes = match job.kind {
            JobKind::File => tokio::fs::metadata(&output).await.map(|m| m.len()).unwrap_or(0),
            JobKind::Hls => output.parent().map(dir_size).unwrap_or(0),
        };
        let now = Utc::now();
        let entry = TranscodingCache {
            id: job.id.clone(),
            media_id: job.media_id,
            profile_id: job.profile_id,
            path: output,
            created_at: now,
            last_accessed: now,
            size_bytes,
        };
        if let Err(e) = store.put_cache(&entry) {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to record cache entry");
        }
    }

    fn base_options(
        input: &Path,
        output: PathBuf,
        profile: &TranscodingProfile,
        audio: AudioDecision,
    ) -> EncodeOptions {
        let reencode = !audio.is_copy();
        let mut opts = EncodeOptions::new(input, output);
        opts.video_codec = profile.video_codec.clone();
        opts.resolution = profile.resolution_dims();
        opts.video_bitrate = profile.max_bitrate;
        opts.container = profile.container.clone();
        opts.audio = audio;
        if reencode {
            opts.audio_channels = profile.max_audio_channels;
            opts.pan_layout = profile.downmix_layout.clone();
            opts.loudness_filter = profile.loudness_filter.clone();
        }
        opts
    }

    async fn encode_file(
        &self,
        input: &Path,
        output: &Path,
        profile: &TranscodingProfile,
        selection: &AudioSelection,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let audio = decide_audio(profile, selection.codec.as_deref());
        let mut opts = Self::base_options(input, output.to_path_buf(), profile, audio);
        opts.audio_track = selection.index;
        if selection.index.is_none() {
            opts.audio_language = selection.language.clone();
        }
        self.encoder.encode(&opts, cancel).await
    }

    async fn encode_hls(
        &self,
        id: &JobId,
        input: &Path,
        dir: &Path,
        profile: &TranscodingProfile,
        renditions: &[PlannedRendition],
        cancel: &CancellationToken,
    ) -> Result<()> {
        clear_dir(dir).await?;
        tokio::fs::create_dir_all(dir).await?;
        let total = renditions.len() + 1;

        let mut video = Self::base_options(
            input,
            dir.join(VIDEO_DIR).join(VARIANT_PLAYLIST),
            profile,
            AudioDecision::Copy,
        );
        video.streams = StreamSelection::VideoOnly;
        self.encoder.encode_hls(&video, self.segment_secs, cancel).await?;
        self.report_progress(id, 1, total);

        for (n, rendition) in renditions.iter().enumerate() {
            let audio = decide_audio(profile, rendition.codec.as_deref());
            let mut opts = Self::base_options(
                input,
                dir.join(&rendition.dir).join(VARIANT_PLAYLIST),
                profile,
                audio,
            );
            opts.streams = StreamSelection::AudioOnly;
            opts.audio_track = rendition.stream_index;
            if rendition.stream_index.is_none() {
                opts.audio_language = rendition.language.clone();
            }
            self.encoder
                .encode_hls(&opts, self.segment_secs, cancel)
                .await
                .map_err(|e| match e {
                    Error::Cancelled(_) => e,
                    other => Error::Internal(format!(
                        "audio rendition {} failed: {other}",
                        rendition.name
                    )),
                })?;
            self.report_progress(id, n + 2, total);
        }

        let master = generate_master_playlist(&hls::master_for(profile, renditions));
        tokio::fs::write(dir.join(MASTER_PLAYLIST), master).await?;
        Ok(())
    }

    fn report_progress(&self, id: &JobId, done: usize, total: usize) {
        // Completion is reported by the terminal transition.
        if done >= total {
            return;
        }
        let progress = (done as f32 / total as f32) * 100.0;
        self.jobs.transition(id, JobStatus::Running, |job| job.progress = progress);
    }

    /// Package directory of HLS job `id`, only when that job has completed.
    ///
    /// A job that is queued, running, failed or cancelled in this process
    /// hides whatever is on disk. Without an in-memory job, a cache row
    /// whose master playlist still exists vouches for the package.
    pub fn completed_package(&self, id: &JobId) -> Result<Option<PathBuf>> {
        let dir = self.output_dir_for(id);
        let master = dir.join(MASTER_PLAYLIST);
        if let Some(job) = self.jobs.get(id) {
            let done = job.status == JobStatus::Completed && master.is_file();
            return Ok(done.then_some(dir));
        }
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let vouched = store
            .get_cache(id)?
            .is_some_and(|entry| entry.path == master && master.is_file());
        Ok(vouched.then_some(dir))
    }

    /// Evict cache rows not accessed within `max_age`. Returns the number of
    /// rows removed. Output files are only deleted when
    /// `delete_files_on_evict` is set.
    pub fn cleanup_old_cache(&self, max_age: Duration) -> Result<usize> {
        let Some(store) = self.writable_store() else {
            return Ok(0);
        };
        let evicted = store.delete_cache_older_than(max_age)?;
        if self.delete_files_on_evict {
            for entry in &evicted {
                self.remove_output(entry);
            }
        }
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "Evicted transcoding cache entries");
        }
        Ok(evicted.len())
    }

    fn remove_output(&self, entry: &TranscodingCache) {
        let hls_dir = self.output_dir_for(&entry.id);
        let result = if entry.path.starts_with(&hls_dir) {
            std::fs::remove_dir_all(&hls_dir)
        } else {
            std::fs::remove_file(&entry.path)
        };
        match result {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %entry.path.display(), error = %e, "Failed to remove cached output");
            }
        }
    }
}

/// Remove `dir` and everything under it; a missing directory is fine.
async fn clear_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn dir_size(dir: &Path) -> u64 {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rh_db::SqliteStore;

    /// Records every call and writes placeholder output.
    #[derive(Default)]
    struct FakeEncoder {
        calls: Mutex<Vec<EncodeOptions>>,
        gate: Option<Arc<tokio::sync::Notify>>,
        fail_audio: bool,
    }

    impl FakeEncoder {
        fn gated(gate: Arc<tokio::sync::Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<EncodeOptions> {
            self.calls.lock().clone()
        }

        async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
            if let Some(gate) = &self.gate {
                tokio::select! {
                    _ = gate.notified() => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled("encode".into())),
                }
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Encoder for FakeEncoder {
        async fn encode(&self, opts: &EncodeOptions, cancel: &CancellationToken) -> Result<()> {
            self.calls.lock().push(opts.clone());
            self.wait(cancel).await?;
            if let Some(parent) = opts.output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&opts.output, b"encoded")?;
            Ok(())
        }

        async fn encode_hls(
            &self,
            opts: &EncodeOptions,
            _segment_secs: u32,
            cancel: &CancellationToken,
        ) -> Result<()> {
            self.calls.lock().push(opts.clone());
            self.wait(cancel).await?;
            if self.fail_audio && opts.streams == StreamSelection::AudioOnly {
                return Err(Error::tool("ffmpeg", "audio exploded"));
            }
            let dir = opts.output.parent().unwrap();
            std::fs::create_dir_all(dir)?;
            std::fs::write(dir.join("seg_00000.ts"), b"ts")?;
            std::fs::write(&opts.output, "#EXTM3U\n#EXTINF:6.0,\nseg_00000.ts\n#EXT-X-ENDLIST\n")?;
            Ok(())
        }
    }

    fn item(dir: &Path) -> MediaItem {
        let path = dir.join("movie.mkv");
        std::fs::write(&path, b"source").unwrap();
        MediaItem {
            id: MediaId::new("m1"),
            title: "Movie".into(),
            path,
            nfo_path: None,
            size: 6,
            modified: Utc::now(),
            stable_key: "k".into(),
            poster_path: None,
            season: None,
            episode: None,
        }
    }

    fn manager(
        cache_dir: &Path,
        encoder: Arc<FakeEncoder>,
        store: Option<Arc<dyn MediaStore>>,
    ) -> Arc<TranscodingManager> {
        let config = TranscodingConfig {
            cache_dir: cache_dir.to_path_buf(),
            ..Default::default()
        };
        Arc::new(TranscodingManager::new(&config, encoder, store))
    }

    async fn wait_terminal(mgr: &TranscodingManager, id: &JobId) -> TranscodingJob {
        for _ in 0..200 {
            if let Some(job) = mgr.job(id).filter(|j| j.status.is_terminal()) {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not finish");
    }

    fn memory_store() -> Arc<dyn MediaStore> {
        Arc::new(SqliteStore::memory().unwrap())
    }

    #[test]
    fn job_ids_are_deterministic() {
        let a = job_id(&MediaId::new("m1"), &ProfileId::new("web"), JobKind::File);
        let b = job_id(&MediaId::new("m1"), &ProfileId::new("web"), JobKind::File);
        let hls = job_id(&MediaId::new("m1"), &ProfileId::new("web"), JobKind::Hls);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 16);
        assert_eq!(hls.as_str(), format!("{a}_hls"));
        assert_ne!(a, job_id(&MediaId::new("m2"), &ProfileId::new("web"), JobKind::File));
    }

    #[tokio::test]
    async fn concurrent_starts_share_one_job() {
        let tmp = tempfile::tempdir().unwrap();
        let gate = Arc::new(tokio::sync::Notify::new());
        let encoder = Arc::new(FakeEncoder::gated(gate.clone()));
        let mgr = manager(&tmp.path().join("cache"), encoder.clone(), None);
        let item = item(tmp.path());
        let profile = TranscodingProfile::web_default();

        let first = mgr.start_transcoding(&item, &profile, &AudioSelection::none()).unwrap();
        let second = mgr.start_transcoding(&item, &profile, &AudioSelection::none()).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.status, JobStatus::Pending);

        gate.notify_one();
        let done = wait_terminal(&mgr, &first.id).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100.0);
        assert_eq!(encoder.calls().len(), 1);
        assert_eq!(mgr.jobs().len(), 1);
    }

    #[tokio::test]
    async fn cache_hit_skips_encoder_and_stale_row_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder::default());
        let store = memory_store();
        let mgr = manager(&tmp.path().join("cache"), encoder.clone(), Some(store.clone()));
        let item = item(tmp.path());
        let profile = TranscodingProfile::web_default();
        let sel = AudioSelection::none();

        let job = mgr.start_transcoding(&item, &profile, &sel).unwrap();
        let done = wait_terminal(&mgr, &job.id).await;
        let output = done.output_path.unwrap();
        assert!(output.exists());
        let row = store.get_cache(&job.id).unwrap().unwrap();
        assert_eq!(row.path, output);
        assert_eq!(row.size_bytes, 7);

        let hit = mgr.start_transcoding(&item, &profile, &sel).unwrap();
        assert_eq!(hit.status, JobStatus::Completed);
        assert_eq!(hit.output_path.as_deref(), Some(output.as_path()));
        assert_eq!(encoder.calls().len(), 1);

        std::fs::remove_file(&output).unwrap();
        let miss = mgr.start_transcoding(&item, &profile, &sel).unwrap();
        assert_eq!(miss.status, JobStatus::Pending);
        wait_terminal(&mgr, &miss.id).await;
        assert_eq!(encoder.calls().len(), 2);
        assert!(output.exists());
    }

    #[tokio::test]
    async fn selection_drives_audio_arguments() {
        let tmp = tempfile::tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder::default());
        let mgr = manager(&tmp.path().join("cache"), encoder.clone(), None);
        let item = item(tmp.path());
        let mut profile = TranscodingProfile::web_default();
        profile.downmix_layout = Some("stereo|c0=FL|c1=FR".into());
        let sel = AudioSelection {
            index: Some(1),
            language: Some("en".into()),
            codec: Some("ac3".into()),
        };

        let job = mgr.start_transcoding(&item, &profile, &sel).unwrap();
        wait_terminal(&mgr, &job.id).await;
        let opts = &encoder.calls()[0];
        assert_eq!(opts.audio_track, Some(1));
        assert_eq!(opts.audio_language, None);
        assert_eq!(
            opts.audio,
            AudioDecision::Encode {
                codec: "aac".into(),
                bitrate_kbps: 128
            }
        );
        assert_eq!(opts.audio_channels, Some(2));
        assert_eq!(opts.pan_layout.as_deref(), Some("stereo|c0=FL|c1=FR"));
        assert_eq!(opts.resolution, Some((1280, 720)));
        assert!(opts.output.ends_with(format!("{}.mp4", job.id)));
    }

    #[tokio::test]
    async fn cancel_stops_running_job() {
        let tmp = tempfile::tempdir().unwrap();
        let gate = Arc::new(tokio::sync::Notify::new());
        let encoder = Arc::new(FakeEncoder::gated(gate));
        let store = memory_store();
        let mgr = manager(&tmp.path().join("cache"), encoder, Some(store.clone()));
        let item = item(tmp.path());
        let profile = TranscodingProfile::web_default();

        let job = mgr.start_transcoding(&item, &profile, &AudioSelection::none()).unwrap();
        let cancelled = mgr.cancel(&job.id).unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let after = mgr.job(&job.id).unwrap();
        assert_eq!(after.status, JobStatus::Cancelled);
        assert!(store.get_cache(&job.id).unwrap().is_none());
        assert_eq!(mgr.cancel(&job.id).unwrap().status, JobStatus::Cancelled);
        assert!(mgr.cancel(&JobId::new("nope")).is_none());
    }

    #[tokio::test]
    async fn hls_job_writes_master_with_every_rendition() {
        let tmp = tempfile::tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder::default());
        let store = memory_store();
        let mgr = manager(&tmp.path().join("cache"), encoder.clone(), Some(store.clone()));
        let item = item(tmp.path());
        let profile = TranscodingProfile::web_default();
        let streams = vec![
            AudioStream {
                index: 0,
                language: Some("en".into()),
                codec: Some("aac".into()),
                channels: Some(2),
                title: None,
            },
            AudioStream {
                index: 1,
                language: Some("de".into()),
                codec: Some("ac3".into()),
                channels: Some(2),
                title: None,
            },
        ];
        let sel = AudioSelection {
            index: Some(0),
            language: Some("en".into()),
            codec: Some("aac".into()),
        };

        let job = mgr.start_hls_transcoding(&item, &profile, &streams, &sel).unwrap();
        assert!(job.id.as_str().ends_with("_hls"));
        let done = wait_terminal(&mgr, &job.id).await;
        assert_eq!(done.status, JobStatus::Completed);
        let dir = mgr.output_dir_for(&job.id);
        assert_eq!(mgr.completed_package(&job.id).unwrap(), Some(dir.clone()));

        let master = std::fs::read_to_string(dir.join(MASTER_PLAYLIST)).unwrap();
        assert_eq!(master.matches("#EXT-X-MEDIA:TYPE=AUDIO").count(), 2);
        assert_eq!(master.matches("DEFAULT=YES").count(), 1);
        assert!(master.contains("NAME=\"EN\",LANGUAGE=\"en\",DEFAULT=YES"));
        assert!(master.contains("AUDIO=\"audio\""));

        let calls = encoder.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].streams, StreamSelection::VideoOnly);
        assert_eq!(calls[2].audio_track, Some(1));
        assert!(!calls[2].audio.is_copy());
        assert!(calls[1].audio.is_copy());

        let row = store.get_cache(&job.id).unwrap().unwrap();
        assert_eq!(row.path, dir.join(MASTER_PLAYLIST));
        assert!(row.size_bytes > 0);
    }

    #[tokio::test]
    async fn failed_rendition_fails_the_hls_job() {
        let tmp = tempfile::tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder {
            fail_audio: true,
            ..Default::default()
        });
        let mgr = manager(&tmp.path().join("cache"), encoder, None);
        let item = item(tmp.path());
        let profile = TranscodingProfile::web_default();

        let job = mgr
            .start_hls_transcoding(&item, &profile, &[], &AudioSelection::none())
            .unwrap();
        let done = wait_terminal(&mgr, &job.id).await;
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error.unwrap().contains("audio exploded"));
        assert!(mgr.completed_package(&job.id).unwrap().is_none());
        assert!(!mgr.output_dir_for(&job.id).exists());
    }

    #[tokio::test]
    async fn leftover_hls_files_are_not_a_package() {
        let tmp = tempfile::tempdir().unwrap();
        let store = memory_store();
        let mgr = manager(&tmp.path().join("cache"), Arc::new(FakeEncoder::default()), Some(store));
        let id = job_id(&MediaId::new("m1"), &ProfileId::new("web-720p"), JobKind::Hls);
        let dir = mgr.output_dir_for(&id);
        std::fs::create_dir_all(dir.join(VIDEO_DIR)).unwrap();
        std::fs::write(dir.join(VIDEO_DIR).join("seg_00000.ts"), b"half").unwrap();
        std::fs::write(dir.join(MASTER_PLAYLIST), "#EXTM3U\n").unwrap();

        assert!(mgr.completed_package(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn hls_encode_starts_from_an_empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let gate = Arc::new(tokio::sync::Notify::new());
        let encoder = Arc::new(FakeEncoder::gated(gate.clone()));
        let mgr = manager(&tmp.path().join("cache"), encoder.clone(), None);
        let item = item(tmp.path());
        let profile = TranscodingProfile::web_default();
        let id = job_id(&item.id, &profile.id, JobKind::Hls);
        let stale = mgr.output_dir_for(&id).join(VIDEO_DIR).join("seg_00042.ts");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, b"stale").unwrap();

        let job = mgr
            .start_hls_transcoding(&item, &profile, &[], &AudioSelection::none())
            .unwrap();
        for _ in 0..200 {
            if !encoder.calls().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!stale.exists());
        assert!(mgr.completed_package(&id).unwrap().is_none());

        for _ in 0..2 {
            gate.notify_one();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let done = wait_terminal(&mgr, &job.id).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert!(mgr.completed_package(&id).unwrap().is_some());
    }

    #[tokio::test]
    async fn in_memory_completion_counts_as_cache_without_store() {
        let tmp = tempfile::tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder::default());
        let mgr = manager(&tmp.path().join("cache"), encoder.clone(), None);
        let item = item(tmp.path());
        let profile = TranscodingProfile::web_default();

        let job = mgr.start_transcoding(&item, &profile, &AudioSelection::none()).unwrap();
        wait_terminal(&mgr, &job.id).await;
        let again = mgr.start_transcoding(&item, &profile, &AudioSelection::none()).unwrap();
        assert_eq!(again.status, JobStatus::Completed);
        assert_eq!(encoder.calls().len(), 1);
        assert_eq!(mgr.cleanup_old_cache(Duration::ZERO).unwrap(), 0);
    }

    #[tokio::test]
    async fn cleanup_evicts_rows_and_optionally_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = memory_store();
        let cache_dir = tmp.path().join("cache");
        let output = cache_dir.join("abc.mp4");
        std::fs::create_dir_all(&cache_dir).unwrap();
        std::fs::write(&output, b"x").unwrap();
        let old = Utc::now() - chrono::Duration::hours(48);
        store
            .put_cache(&TranscodingCache {
                id: JobId::new("abc"),
                media_id: MediaId::new("m1"),
                profile_id: ProfileId::new("web-720p"),
                path: output.clone(),
                created_at: old,
                last_accessed: old,
                size_bytes: 1,
            })
            .unwrap();

        let keep_files = manager(&cache_dir, Arc::new(FakeEncoder::default()), Some(store.clone()));
        assert_eq!(keep_files.cleanup_old_cache(Duration::from_secs(86_400)).unwrap(), 1);
        assert!(store.get_cache(&JobId::new("abc")).unwrap().is_none());
        assert!(output.exists());

        store
            .put_cache(&TranscodingCache {
                id: JobId::new("abc"),
                media_id: MediaId::new("m1"),
                profile_id: ProfileId::new("web-720p"),
                path: output.clone(),
                created_at: old,
                last_accessed: old,
                size_bytes: 1,
            })
            .unwrap();
        let config = TranscodingConfig {
            cache_dir: cache_dir.clone(),
            delete_files_on_evict: true,
            ..Default::default()
        };
        let deleting = TranscodingManager::new(&config, Arc::new(FakeEncoder::default()), Some(store));
        assert_eq!(deleting.cleanup_old_cache(Duration::from_secs(86_400)).unwrap(), 1);
        assert!(!output.exists());
    }
}
