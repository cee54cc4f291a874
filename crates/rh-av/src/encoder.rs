//! Encoder abstraction and the ffmpeg implementation.
//!
//! [`EncodeOptions`] describes one encode: what to read, what to write and
//! how to treat the video and audio streams. [`FfmpegEncoder`] turns it into
//! an ffmpeg argv and runs it through [`ToolCommand`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rh_core::{Error, Result};
use tokio_util::sync::CancellationToken;

use crate::audio::AudioDecision;
use crate::command::ToolCommand;
use crate::tools::{Tool, ToolRegistry};

/// Which elementary streams an encode produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamSelection {
    #[default]
    All,
    VideoOnly,
    AudioOnly,
}

impl StreamSelection {
    fn video(self) -> bool {
        matches!(self, StreamSelection::All | StreamSelection::VideoOnly)
    }

    fn audio(self) -> bool {
        matches!(self, StreamSelection::All | StreamSelection::AudioOnly)
    }
}

/// Everything an encoder needs for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    pub input: PathBuf,
    /// Output file, or the variant playlist path for HLS encodes.
    pub output: PathBuf,
    /// Target video codec (`h264`, `hevc`, ...) or `copy`.
    pub video_codec: String,
    pub audio: AudioDecision,
    pub resolution: Option<(u32, u32)>,
    /// Video bitrate in bits per second.
    pub video_bitrate: Option<u64>,
    /// Seek offset in seconds.
    pub start_secs: Option<f64>,
    /// Output duration in seconds.
    pub duration_secs: Option<f64>,
    /// Audio stream position among the input's audio streams.
    pub audio_track: Option<usize>,
    /// Used only when `audio_track` is not set.
    pub audio_language: Option<String>,
    pub audio_channels: Option<u32>,
    /// `pan` filter layout applied when re-encoding audio.
    pub pan_layout: Option<String>,
    /// Loudness filter applied when re-encoding audio.
    pub loudness_filter: Option<String>,
    /// Container for single-file output (`mp4`, `mkv`, `webm`, `ts`).
    pub container: String,
    pub streams: StreamSelection,
}

impl EncodeOptions {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            video_codec: "h264".into(),
            audio: AudioDecision::Copy,
            resolution: None,
            video_bitrate: None,
            start_secs: None,
            duration_secs: None,
            audio_track: None,
            audio_language: None,
            audio_channels: None,
            pan_layout: None,
            loudness_filter: None,
            container: "mp4".into(),
            streams: StreamSelection::All,
        }
    }
}

/// Runs encodes. Implementations must stop promptly and return
/// [`Error::Cancelled`] once `cancel` fires.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Produce a single output file at `opts.output`.
    async fn encode(&self, opts: &EncodeOptions, cancel: &CancellationToken) -> Result<()>;

    /// Produce an HLS elementary playlist at `opts.output` with numbered
    /// segments next to it.
    async fn encode_hls(
        &self,
        opts: &EncodeOptions,
        segment_secs: u32,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Name of the HLS segment files written next to a variant playlist.
pub const HLS_SEGMENT_PATTERN: &str = "seg_%05d.ts";

/// [`Encoder`] backed by the ffmpeg CLI.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    timeout: Duration,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: PathBuf, timeout: Duration) -> Self {
        Self { ffmpeg, timeout }
    }

    pub fn from_registry(tools: &ToolRegistry, timeout: Duration) -> Result<Self> {
        Ok(Self::new(tools.require(Tool::Ffmpeg)?.to_path_buf(), timeout))
    }

    fn command(&self, args: Vec<String>) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.ffmpeg.clone());
        cmd.timeout(self.timeout).args(args);
        cmd
    }

    /// Full argv (without the program) for a single-file encode.
    pub fn build_args(opts: &EncodeOptions) -> Vec<String> {
        let mut args = common_args(opts);
        match container_muxer(&opts.container) {
            Some("mp4") => args.extend(["-movflags".into(), "+faststart".into(), "-f".into(), "mp4".into()]),
            Some(muxer) => args.extend(["-f".into(), muxer.into()]),
            None => {}
        }
        args.push(path_arg(&opts.output));
        args
    }

    /// Full argv for an HLS encode; segments land next to `opts.output`.
    pub fn build_hls_args(opts: &EncodeOptions, segment_secs: u32) -> Vec<String> {
        let dir = opts.output.parent().unwrap_or_else(|| Path::new("."));
        let mut args = common_args(opts);
        args.extend([
            "-f".into(),
            "hls".into(),
            "-hls_time".into(),
            segment_secs.max(1).to_string(),
            "-hls_playlist_type".into(),
            "vod".into(),
            "-hls_segment_filename".into(),
            path_arg(&dir.join(HLS_SEGMENT_PATTERN)),
        ]);
        args.push(path_arg(&opts.output));
        args
    }
}

fn path_arg(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

/// ffmpeg encoder name for a codec name.
fn video_encoder(codec: &str) -> &str {
    match codec.to_ascii_lowercase().as_str() {
        "h264" | "avc" | "x264" => "libx264",
        "hevc" | "h265" | "x265" => "libx265",
        "vp9" => "libvpx-vp9",
        "av1" => "libsvtav1",
        _ => codec,
    }
}

fn audio_encoder(codec: &str) -> &str {
    match codec.to_ascii_lowercase().as_str() {
        "opus" => "libopus",
        "mp3" => "libmp3lame",
        "vorbis" => "libvorbis",
        _ => codec,
    }
}

fn container_muxer(container: &str) -> Option<&'static str> {
    match container.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => Some("mp4"),
        "mkv" | "matroska" => Some("matroska"),
        "webm" => Some("webm"),
        "ts" | "mpegts" => Some("mpegts"),
        "mov" => Some("mov"),
        _ => None,
    }
}

fn common_args(opts: &EncodeOptions) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-nostdin".into(), "-y".into()];

    if let Some(ss) = opts.start_secs {
        args.extend(["-ss".into(), format!("{ss:.3}")]);
    }
    args.extend(["-i".into(), path_arg(&opts.input)]);
    if let Some(t) = opts.duration_secs {
        args.extend(["-t".into(), format!("{t:.3}")]);
    }

    if opts.streams.video() {
        args.extend(["-map".into(), "0:v:0".into()]);
    }
    if opts.streams.audio() {
        let map = match (opts.audio_track, &opts.audio_language) {
            (Some(n), _) => format!("0:a:{n}"),
            (None, Some(lang)) => format!("0:a:m:language:{lang}?"),
            (None, None) => "0:a:0?".into(),
        };
        args.extend(["-map".into(), map]);
    }

    if opts.streams.video() {
        if opts.video_codec.eq_ignore_ascii_case("copy") {
            args.extend(["-c:v".into(), "copy".into()]);
        } else {
            args.extend(["-c:v".into(), video_encoder(&opts.video_codec).into()]);
            if let Some((w, h)) = opts.resolution {
                args.extend([
                    "-vf".into(),
                    format!("scale={w}:{h}:force_original_aspect_ratio=decrease"),
                ]);
            }
            if let Some(b) = opts.video_bitrate {
                args.extend([
                    "-b:v".into(),
                    b.to_string(),
                    "-maxrate".into(),
                    b.to_string(),
                    "-bufsize".into(),
                    (b * 2).to_string(),
                ]);
            }
        }
    } else {
        args.push("-vn".into());
    }

    if opts.streams.audio() {
        match &opts.audio {
            AudioDecision::Copy => args.extend(["-c:a".into(), "copy".into()]),
            AudioDecision::Encode {
                codec,
                bitrate_kbps,
            } => {
                args.extend([
                    "-c:a".into(),
                    audio_encoder(codec).into(),
                    "-b:a".into(),
                    format!("{bitrate_kbps}k"),
                ]);
                if let Some(ch) = opts.audio_channels {
                    args.extend(["-ac".into(), ch.to_string()]);
                }
                let filters: Vec<String> = opts
                    .pan_layout
                    .iter()
                    .map(|layout| format!("pan={layout}"))
                    .chain(opts.loudness_filter.iter().cloned())
                    .collect();
                if !filters.is_empty() {
                    args.extend(["-af".into(), filters.join(",")]);
                }
            }
        }
    } else {
        args.push("-an".into());
    }

    args
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(&self, opts: &EncodeOptions, cancel: &CancellationToken) -> Result<()> {
        ensure_parent(&opts.output).await?;
        tracing::info!(
            input = %opts.input.display(),
            output = %opts.output.display(),
            "Encoding"
        );
        self.command(Self::build_args(opts))
            .execute_cancellable(cancel)
            .await?;
        if !opts.output.exists() {
            return Err(Error::tool("ffmpeg", "exited successfully but wrote no output"));
        }
        Ok(())
    }

    async fn encode_hls(
        &self,
        opts: &EncodeOptions,
        segment_secs: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_parent(&opts.output).await?;
        tracing::info!(
            input = %opts.input.display(),
            playlist = %opts.output.display(),
            segment_secs,
            streams = ?opts.streams,
            "Encoding HLS rendition"
        );
        self.command(Self::build_hls_args(opts, segment_secs))
            .execute_cancellable(cancel)
            .await?;
        Ok(())
    }
}
