//! Media probing.
//!
//! [`FfprobeProber`] shells out to
//! `ffprobe -v quiet -print_format json -show_format -show_streams` and maps
//! the JSON into a [`ProbeInfo`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rh_core::{AudioStream, Error, Result};
use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;
use crate::tools::{Tool, ToolRegistry};

/// Structured probe result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeInfo {
    pub duration_secs: Option<f64>,
    /// Overall bitrate in bits per second.
    pub bitrate: Option<u64>,
    pub format: Option<String>,
    pub video_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub audio_streams: Vec<AudioStream>,
}

#[async_trait]
pub trait Prober: Send + Sync {
    fn name(&self) -> &'static str;

    async fn probe(&self, path: &Path) -> Result<ProbeInfo>;
}

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }

    pub fn from_registry(tools: &ToolRegistry) -> Result<Self> {
        Ok(Self::new(tools.require(Tool::Ffprobe)?.to_path_buf()))
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn probe(&self, path: &Path) -> Result<ProbeInfo> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"]);
        cmd.arg(path.to_string_lossy().as_ref());

        let output = cmd.execute().await?;
        parse_ffprobe_json(&output.stdout)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    channels: Option<u32>,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
    title: Option<String>,
}

/// Map ffprobe's JSON output to a [`ProbeInfo`].
pub fn parse_ffprobe_json(json: &str) -> Result<ProbeInfo> {
    let ff: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let mut info = ProbeInfo {
        duration_secs: ff.format.duration.and_then(|s| s.parse().ok()),
        bitrate: ff.format.bit_rate.and_then(|s| s.parse().ok()),
        format: ff.format.format_name,
        ..Default::default()
    };

    for stream in ff.streams {
        match stream.codec_type.as_deref() {
            Some("video") if info.video_codec.is_none() => {
                info.video_codec = stream.codec_name;
                info.width = stream.width;
                info.height = stream.height;
            }
            Some("audio") => {
                let index = info.audio_streams.len();
                info.audio_streams.push(AudioStream {
                    index,
                    language: stream.tags.language.filter(|l| l != "und"),
                    codec: stream.codec_name,
                    channels: stream.channels,
                    title: stream.tags.title,
                });
            }
            _ => {}
        }
    }

    Ok(info)
}
