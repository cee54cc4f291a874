//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which builds a full [`AppContext`] over a
//! temporary library directory, an in-memory SQLite store and a
//! [`FakeEncoder`] that writes placeholder outputs instead of running
//! ffmpeg. Requests go through the router in-process via
//! [`TestHarness::request`], or over a real socket after
//! [`TestHarness::serve`].

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use rh_av::{EncodeOptions, Encoder, StreamSelection, ToolRegistry};
use rh_core::config::{Config, LibraryRootConfig};
use rh_core::{Error, JobId, MediaItem, Result, TranscodingJob};
use rh_db::{MediaStore, SqliteStore};
use rh_server::context::AppContext;
use rh_server::router::build_router;

/// Body written for single-file encodes.
pub const ENCODED: &[u8] = b"encoded output bytes";

/// Encoder double. Records every call and writes a small output file, or a
/// one-segment playlist for HLS encodes. When built with [`FakeEncoder::gated`]
/// each call blocks until [`FakeEncoder::release`] or cancellation.
#[derive(Default)]
pub struct FakeEncoder {
    calls: Mutex<Vec<EncodeOptions>>,
    gate: Option<CancellationToken>,
}

impl FakeEncoder {
    pub fn gated() -> Self {
        Self {
            gate: Some(CancellationToken::new()),
            ..Default::default()
        }
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.cancel();
        }
    }

    pub fn calls(&self) -> Vec<EncodeOptions> {
        self.calls.lock().clone()
    }

    async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        if let Some(gate) = &self.gate {
            tokio::select! {
                _ = gate.cancelled() => {}
                _ = cancel.cancelled() => return Err(Error::Cancelled("fake encode".into())),
            }
        }
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn encode(&self, opts: &EncodeOptions, cancel: &CancellationToken) -> Result<()> {
        self.calls.lock().push(opts.clone());
        self.wait(cancel).await?;
        ensure_parent(&opts.output)?;
        std::fs::write(&opts.output, ENCODED)?;
        Ok(())
    }

    async fn encode_hls(
        &self,
        opts: &EncodeOptions,
        segment_secs: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.calls.lock().push(opts.clone());
        self.wait(cancel).await?;
        ensure_parent(&opts.output)?;
        let segment = match opts.streams {
            StreamSelection::AudioOnly => b"audio-ts".as_slice(),
            _ => b"video-ts".as_slice(),
        };
        let dir = opts.output.parent().unwrap_or(Path::new("."));
        std::fs::write(dir.join("seg_00000.ts"), segment)?;
        std::fs::write(
            &opts.output,
            format!(
                "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:{segment_secs}\n\
                 #EXTINF:{segment_secs}.0,\nseg_00000.ts\n#EXT-X-ENDLIST\n"
            ),
        )?;
        Ok(())
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub store: Arc<SqliteStore>,
    pub encoder: Arc<FakeEncoder>,
    pub library: PathBuf,
    dir: tempfile::TempDir,
}

impl TestHarness {
    /// Harness with default configuration and an ungated encoder.
    pub fn new() -> Self {
        Self::build(|_| {}, FakeEncoder::default())
    }

    /// Harness whose config is adjusted by `configure` before wiring.
    pub fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        Self::build(configure, FakeEncoder::default())
    }

    /// Harness whose encodes block until released.
    pub fn gated() -> Self {
        Self::build(|_| {}, FakeEncoder::gated())
    }

    fn build(configure: impl FnOnce(&mut Config), encoder: FakeEncoder) -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let library = dir.path().join("library");
        std::fs::create_dir_all(&library).expect("failed to create library dir");

        let mut config = Config::default();
        config.server.db_path = None;
        config.library.roots = vec![LibraryRootConfig {
            path: library.clone(),
            kind: "video".into(),
        }];
        config.transcoding.cache_dir = dir.path().join("cache");
        configure(&mut config);

        let store = Arc::new(SqliteStore::memory().expect("failed to open in-memory store"));
        let encoder = Arc::new(encoder);
        let ctx = AppContext::new(
            config,
            Some(store.clone() as Arc<dyn MediaStore>),
            encoder.clone(),
            ToolRegistry::default(),
        );

        Self {
            ctx,
            store,
            encoder,
            library,
            dir,
        }
    }

    /// Root of the harness tempdir.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Create a file under the library root.
    pub fn add_file(&self, rel: &str, contents: &[u8]) -> PathBuf {
        let path = self.library.join(rel);
        ensure_parent(&path).expect("failed to create parent dir");
        std::fs::write(&path, contents).expect("failed to write library file");
        path
    }

    /// Scan every root directly, bypassing the HTTP rate limit.
    pub async fn scan(&self) {
        self.ctx
            .scanner
            .clone()
            .scan_all()
            .await
            .expect("scan failed");
    }

    /// The indexed item titled `title`.
    pub fn item(&self, title: &str) -> MediaItem {
        self.ctx
            .scanner
            .all()
            .expect("failed to list items")
            .into_iter()
            .find(|i| i.title == title)
            .unwrap_or_else(|| panic!("no item titled {title}"))
    }

    pub fn router(&self) -> Router {
        build_router(self.ctx.clone())
    }

    /// Send one request through the router in-process.
    pub async fn request(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let resp = self.router().oneshot(req).await.expect("router failed");
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp
            .into_body()
            .collect()
            .await
            .expect("failed to read body")
            .to_bytes();
        (status, headers, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
        self.request(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn send_json(
        &self,
        method: Method,
        uri: &str,
        json: serde_json::Value,
    ) -> (StatusCode, HeaderMap, Bytes) {
        self.request(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Start Axum on a random local port.
    pub async fn serve(&self) -> SocketAddr {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        addr
    }

    /// Poll until job `id` reaches a terminal state.
    pub async fn wait_job(&self, id: &str) -> TranscodingJob {
        let id = JobId::new(id);
        for _ in 0..500 {
            if let Some(job) = self.ctx.transcoder.job(&id) {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not finish");
    }
}

/// Parse a response body as JSON.
pub fn json(body: &Bytes) -> serde_json::Value {
    serde_json::from_slice(body).expect("body is not JSON")
}

/// NFO sidecar declaring the given `(language, channels)` audio streams.
pub fn nfo_with_audio(title: &str, audio: &[(&str, u32)]) -> String {
    let streams: String = audio
        .iter()
        .map(|(lang, ch)| {
            format!("<audio><codec>aac</codec><language>{lang}</language><channels>{ch}</channels></audio>")
        })
        .collect();
    format!(
        "<movie><title>{title}</title><fileinfo><streamdetails>\
         <video><codec>h264</codec><width>1920</width><height>1080</height></video>\
         {streams}</streamdetails></fileinfo></movie>"
    )
}
