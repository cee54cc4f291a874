//! # rh-av
//!
//! Audio/video plumbing for reelhouse.
//!
//! - **Tool discovery** ([`ToolRegistry`]) finds ffmpeg and ffprobe.
//! - **Command execution** ([`ToolCommand`]) runs external processes with a
//!   timeout and an optional cancellation token.
//! - **Encoding** ([`Encoder`], [`FfmpegEncoder`]) turns [`EncodeOptions`]
//!   into single-file or HLS output.
//! - **Probing** ([`Prober`], [`FfprobeProber`]) reports duration, bitrate
//!   and stream layout.
//! - **Audio negotiation** ([`select_audio_stream`], [`decide_audio`])
//!   picks a source track and decides between stream copy and re-encode.

pub mod audio;
pub mod command;
pub mod encoder;
pub mod probe;
pub mod tools;

pub use audio::{decide_audio, language_matches, select_audio_stream, AudioDecision};
pub use command::{ToolCommand, ToolOutput};
pub use encoder::{EncodeOptions, Encoder, FfmpegEncoder, StreamSelection};
pub use probe::{FfprobeProber, ProbeInfo, Prober};
pub use tools::{Tool, ToolInfo, ToolRegistry};
