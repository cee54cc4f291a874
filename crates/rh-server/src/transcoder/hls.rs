//! HLS packaging layout.
//!
//! An HLS job writes one video-only stream and one audio-only stream per
//! rendition into its own directory, then a master playlist tying them
//! together:
//!
//! ```text
//! <cache_dir>/hls/<job_id>/
//!     master.m3u8
//!     video/index.m3u8, video/seg_00000.ts, ...
//!     audio_0/index.m3u8, audio_0/seg_00000.ts, ...
//! ```

use rh_av::language_matches;
use rh_core::{AudioSelection, AudioStream, TranscodingProfile};
use rh_media::{
    estimate_bandwidth, AudioRendition, MasterPlaylist, RenditionNamer, Variant, AUDIO_GROUP_ID,
};

pub const MASTER_PLAYLIST: &str = "master.m3u8";
pub const VIDEO_DIR: &str = "video";
pub const VARIANT_PLAYLIST: &str = "index.m3u8";

/// One audio rendition to encode.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRendition {
    /// Source audio stream position; `None` lets the encoder pick.
    pub stream_index: Option<usize>,
    pub language: Option<String>,
    pub codec: Option<String>,
    pub name: String,
    pub default: bool,
    /// Directory under the job directory, e.g. `audio_0`.
    pub dir: String,
}

impl PlannedRendition {
    pub fn playlist_uri(&self) -> String {
        format!("{}/{VARIANT_PLAYLIST}", self.dir)
    }
}

fn within_channel_limit(profile: &TranscodingProfile, stream: &AudioStream) -> bool {
    match (profile.max_audio_channels, stream.channels) {
        (Some(max), Some(channels)) => channels <= max,
        _ => true,
    }
}

/// Decide which audio renditions an HLS job encodes.
///
/// Every stream within the profile's channel limit becomes a rendition. When
/// none qualifies, the caller's selection is used as the only rendition.
/// The first rendition matching the selected stream index, or failing that
/// the selected language, is the default; otherwise the first one is.
pub fn plan_renditions(
    profile: &TranscodingProfile,
    streams: &[AudioStream],
    selection: &AudioSelection,
) -> Vec<PlannedRendition> {
    let mut namer = RenditionNamer::new();
    let mut planned: Vec<PlannedRendition> = streams
        .iter()
        .filter(|s| within_channel_limit(profile, s))
        .enumerate()
        .map(|(n, s)| PlannedRendition {
            stream_index: Some(s.index),
            language: s.language.clone(),
            codec: s.codec.clone(),
            name: namer.name(s.title.as_deref(), s.language.as_deref(), n),
            default: false,
            dir: format!("audio_{n}"),
        })
        .collect();

    if planned.is_empty() {
        planned.push(PlannedRendition {
            stream_index: selection.index,
            language: selection.language.clone(),
            codec: selection.codec.clone(),
            name: namer.name(None, selection.language.as_deref(), 0),
            default: true,
            dir: "audio_0".into(),
        });
        return planned;
    }

    let by_index = selection
        .index
        .and_then(|idx| planned.iter().position(|r| r.stream_index == Some(idx)));
    let by_language = || {
        let lang = selection.language.as_deref()?;
        planned
            .iter()
            .position(|r| language_matches(lang, r.language.as_deref()))
    };
    let default = by_index.or_else(by_language).unwrap_or(0);
    planned[default].default = true;
    planned
}

/// Master playlist for a finished job.
pub fn master_for(profile: &TranscodingProfile, renditions: &[PlannedRendition]) -> MasterPlaylist {
    let audio: Vec<AudioRendition> = renditions
        .iter()
        .map(|r| AudioRendition {
            name: r.name.clone(),
            language: r.language.clone(),
            default: r.default,
            uri: r.playlist_uri(),
        })
        .collect();
    let variant = Variant {
        bandwidth: estimate_bandwidth(profile.max_bitrate, audio.len()),
        resolution: profile.resolution_dims(),
        audio_group: (!audio.is_empty()).then(|| AUDIO_GROUP_ID.to_string()),
        uri: format!("{VIDEO_DIR}/{VARIANT_PLAYLIST}"),
    };
    MasterPlaylist {
        audio,
        variants: vec![variant],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(index: usize, lang: Option<&str>, channels: Option<u32>) -> AudioStream {
        AudioStream {
            index,
            language: lang.map(Into::into),
            codec: Some("aac".into()),
            channels,
            title: None,
        }
    }

    #[test]
    fn default_follows_selected_index() {
        let profile = TranscodingProfile::web_default();
        let streams = vec![stream(0, Some("de"), Some(2)), stream(1, Some("en"), Some(2))];
        let sel = AudioSelection {
            index: Some(1),
            language: Some("en".into()),
            codec: Some("aac".into()),
        };
        let planned = plan_renditions(&profile, &streams, &sel);
        assert_eq!(planned.len(), 2);
        assert!(!planned[0].default);
        assert!(planned[1].default);
        assert_eq!(planned[1].name, "EN");
        assert_eq!(planned[1].dir, "audio_1");
    }

    #[test]
    fn channel_limit_filters_streams() {
        let profile = TranscodingProfile::web_default();
        let streams = vec![
            stream(0, Some("en"), Some(6)),
            stream(1, Some("en"), Some(2)),
            stream(2, Some("fr"), None),
        ];
        let planned = plan_renditions(&profile, &streams, &AudioSelection::none());
        let indices: Vec<_> = planned.iter().map(|r| r.stream_index).collect();
        assert_eq!(indices, vec![Some(1), Some(2)]);
        assert!(planned[0].default);
        assert_eq!(planned[0].dir, "audio_0");
    }

    #[test]
    fn language_picks_default_when_index_missing() {
        let profile = TranscodingProfile::web_default();
        let streams = vec![stream(0, Some("deu"), None), stream(1, Some("eng"), None)];
        let sel = AudioSelection {
            index: Some(7),
            language: Some("en".into()),
            codec: None,
        };
        let planned = plan_renditions(&profile, &streams, &sel);
        assert!(planned[1].default);
    }

    #[test]
    fn falls_back_to_selection_without_streams() {
        let profile = TranscodingProfile::web_default();
        let sel = AudioSelection {
            index: Some(0),
            language: Some("ja".into()),
            codec: Some("aac".into()),
        };
        let planned = plan_renditions(&profile, &[], &sel);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].stream_index, Some(0));
        assert_eq!(planned[0].name, "JA");
        assert!(planned[0].default);
    }

    #[test]
    fn duplicate_names_are_numbered() {
        let profile = TranscodingProfile::web_default();
        let streams = vec![stream(0, Some("en"), None), stream(1, Some("en"), None)];
        let planned = plan_renditions(&profile, &streams, &AudioSelection::none());
        assert_eq!(planned[0].name, "EN");
        assert_eq!(planned[1].name, "EN (2)");
    }

    #[test]
    fn master_references_all_renditions() {
        let profile = TranscodingProfile::web_default();
        let streams = vec![stream(0, Some("en"), None), stream(1, Some("de"), None)];
        let planned = plan_renditions(&profile, &streams, &AudioSelection::none());
        let master = master_for(&profile, &planned);
        assert_eq!(master.audio.len(), 2);
        assert_eq!(master.audio[1].uri, "audio_1/index.m3u8");
        assert_eq!(master.variants[0].resolution, Some((1280, 720)));
        assert_eq!(master.variants[0].bandwidth, 4_256_000);
        assert_eq!(master.variants[0].uri, "video/index.m3u8");
        assert_eq!(master.variants[0].audio_group.as_deref(), Some("audio"));
    }
}
