//! Transcoding domain types: client profiles, audio negotiation inputs and
//! results, job snapshots, and persisted cache records.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{JobId, MediaId, ProfileId};

/// Client capability descriptor. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodingProfile {
    pub id: ProfileId,
    #[serde(default)]
    pub name: String,
    pub video_codec: String,
    pub audio_codec: String,
    /// Target resolution as `WIDTHxHEIGHT`.
    #[serde(default)]
    pub resolution: Option<String>,
    /// Maximum video bitrate in bits per second.
    #[serde(default)]
    pub max_bitrate: Option<u64>,
    #[serde(default = "default_container")]
    pub container: String,
    /// Supported audio codecs in priority order.
    #[serde(default)]
    pub audio_codecs: Vec<String>,
    #[serde(default)]
    pub max_audio_channels: Option<u32>,
    /// ffmpeg `pan` layout used when downmixing, e.g. `stereo|c0=FL+0.7*FC|c1=FR+0.7*FC`.
    #[serde(default)]
    pub downmix_layout: Option<String>,
    /// Loudness-normalization filter, e.g. `loudnorm`.
    #[serde(default)]
    pub loudness_filter: Option<String>,
    /// Preferred audio languages in priority order.
    #[serde(default)]
    pub preferred_languages: Vec<String>,
}

fn default_container() -> String {
    "mp4".into()
}

impl TranscodingProfile {
    /// A broadly compatible H.264/AAC 720p profile.
    pub fn web_default() -> Self {
        Self {
            id: ProfileId::new("web-720p"),
            name: "Web 720p".into(),
            video_codec: "h264".into(),
            audio_codec: "aac".into(),
            resolution: Some("1280x720".into()),
            max_bitrate: Some(4_000_000),
            container: default_container(),
            audio_codecs: vec!["aac".into(), "mp3".into()],
            max_audio_channels: Some(2),
            downmix_layout: None,
            loudness_filter: None,
            preferred_languages: Vec::new(),
        }
    }

    /// Parse [`resolution`](Self::resolution) into `(width, height)`.
    pub fn resolution_dims(&self) -> Option<(u32, u32)> {
        let res = self.resolution.as_deref()?;
        let (w, h) = res.split_once(['x', 'X'])?;
        Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
    }
}

/// One audio stream as described by an item's parsed stream metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioStream {
    /// Position among the item's audio streams (0-based).
    pub index: usize,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub channels: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Outcome of audio stream negotiation. Recomputed per request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSelection {
    /// Chosen audio stream index; `None` when no stream matched.
    pub index: Option<usize>,
    pub language: Option<String>,
    pub codec: Option<String>,
}

impl AudioSelection {
    /// Selection for an item without usable audio streams.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Lifecycle state of a transcoding job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Pending or running.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-file output or HLS master playlist output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    File,
    Hls,
}

/// Point-in-time view of a transcoding job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodingJob {
    pub id: JobId,
    pub media_id: MediaId,
    pub profile_id: ProfileId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Percentage in `0.0..=100.0`.
    pub progress: f32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub output_path: Option<PathBuf>,
}

/// Persisted record of a completed encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodingCache {
    /// Same as the job ID that produced it.
    pub id: JobId,
    pub media_id: MediaId,
    pub profile_id: ProfileId,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub size_bytes: u64,
}
