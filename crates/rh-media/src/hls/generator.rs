//! HLS master playlist generation.

use std::fmt::{self, Write};

use super::types::MasterPlaylist;

/// Video bandwidth assumed when a profile has no bitrate cap.
const DEFAULT_VIDEO_BANDWIDTH: u64 = 2_000_000;
/// Bandwidth added per audio rendition.
const AUDIO_RENDITION_BANDWIDTH: u64 = 128_000;

/// Estimated peak bandwidth of a variant with `audio_renditions` alternate
/// audio tracks.
pub fn estimate_bandwidth(max_video_bitrate: Option<u64>, audio_renditions: usize) -> u64 {
    max_video_bitrate.unwrap_or(DEFAULT_VIDEO_BANDWIDTH)
        + AUDIO_RENDITION_BANDWIDTH * audio_renditions as u64
}

/// Attribute values are quoted strings and may not contain `"`.
fn quoted(value: &str) -> String {
    value.replace(['"', '\n', '\r'], "'")
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "YES"
    } else {
        "NO"
    }
}

fn write_master(out: &mut String, playlist: &MasterPlaylist) -> fmt::Result {
    writeln!(out, "#EXTM3U")?;
    writeln!(out, "#EXT-X-VERSION:3")?;

    for r in &playlist.audio {
        write!(
            out,
            "#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"{}\",NAME=\"{}\"",
            super::types::AUDIO_GROUP_ID,
            quoted(&r.name)
        )?;
        if let Some(lang) = &r.language {
            write!(out, ",LANGUAGE=\"{}\"", quoted(lang))?;
        }
        writeln!(
            out,
            ",DEFAULT={},AUTOSELECT=YES,URI=\"{}\"",
            yes_no(r.default),
            quoted(&r.uri)
        )?;
    }

    for variant in &playlist.variants {
        write!(out, "#EXT-X-STREAM-INF:BANDWIDTH={}", variant.bandwidth)?;
        if let Some((w, h)) = variant.resolution {
            write!(out, ",RESOLUTION={w}x{h}")?;
        }
        if let Some(group) = &variant.audio_group {
            write!(out, ",AUDIO=\"{}\"", quoted(group))?;
        }
        writeln!(out)?;
        writeln!(out, "{}", variant.uri)?;
    }

    Ok(())
}

/// Render a master playlist.
///
/// Emits one `EXT-X-MEDIA:TYPE=AUDIO` line per rendition, in order, then one
/// `EXT-X-STREAM-INF` line plus URI per variant.
pub fn generate_master_playlist(playlist: &MasterPlaylist) -> String {
    let mut out = String::new();
    // fmt::Write for String is infallible.
    let _ = write_master(&mut out, playlist);
    out
}
