//! Audio stream negotiation.
//!
//! [`select_audio_stream`] picks the source track a client should hear and
//! [`decide_audio`] decides whether that track can be stream-copied or must
//! be re-encoded. Both are pure and total.

use rh_core::{AudioSelection, AudioStream, TranscodingProfile};

/// What to do with the selected audio stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioDecision {
    /// Pass the source stream through untouched.
    Copy,
    /// Re-encode to `codec` at `bitrate_kbps`.
    Encode { codec: String, bitrate_kbps: u32 },
}

impl AudioDecision {
    pub fn is_copy(&self) -> bool {
        matches!(self, AudioDecision::Copy)
    }
}

/// Case-insensitive language match where either side may be a prefix of the
/// other, so `"en"` matches `"eng"` and `"eng"` matches `"en"`.
///
/// Note that a one-letter preference such as `"e"` matches every language
/// starting with `e`. Streams without a language never match.
pub fn language_matches(preferred: &str, stream_language: Option<&str>) -> bool {
    let Some(stream_language) = stream_language else {
        return false;
    };
    let preferred = preferred.trim().to_lowercase();
    let stream_language = stream_language.trim().to_lowercase();
    if preferred.is_empty() || stream_language.is_empty() {
        return false;
    }
    stream_language.starts_with(&preferred) || preferred.starts_with(&stream_language)
}

fn codec_supported(profile: &TranscodingProfile, stream: &AudioStream) -> bool {
    if profile.audio_codecs.is_empty() {
        return true;
    }
    stream.codec.as_deref().is_some_and(|codec| {
        profile
            .audio_codecs
            .iter()
            .any(|c| c.eq_ignore_ascii_case(codec))
    })
}

/// Streams with an unknown channel count pass.
fn channels_ok(profile: &TranscodingProfile, stream: &AudioStream) -> bool {
    match (profile.max_audio_channels, stream.channels) {
        (Some(max), Some(ch)) => ch <= max,
        _ => true,
    }
}

fn selection(stream: &AudioStream, profile: &TranscodingProfile) -> AudioSelection {
    AudioSelection {
        index: Some(stream.index),
        language: stream
            .language
            .clone()
            .or_else(|| profile.preferred_languages.first().cloned()),
        codec: stream.codec.clone(),
    }
}

/// Choose an audio stream for `profile`. First matching rule wins:
///
/// 1. For each preferred language in order, the first stream whose language
///    matches and whose codec and channel count the profile accepts.
/// 2. For each supported codec in priority order, the first stream with that
///    codec within the channel limit.
/// 3. With a channel limit, the first stream within it.
/// 4. The first stream, or no selection when there are no streams.
///
/// A language preference that matches nothing falls through to the later
/// rules rather than selecting nothing.
pub fn select_audio_stream(profile: &TranscodingProfile, streams: &[AudioStream]) -> AudioSelection {
    for lang in &profile.preferred_languages {
        if let Some(s) = streams.iter().find(|s| {
            language_matches(lang, s.language.as_deref())
                && codec_supported(profile, s)
                && channels_ok(profile, s)
        }) {
            return selection(s, profile);
        }
    }

    for codec in &profile.audio_codecs {
        if let Some(s) = streams.iter().find(|s| {
            s.codec
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(codec))
                && channels_ok(profile, s)
        }) {
            return selection(s, profile);
        }
    }

    if profile.max_audio_channels.is_some() {
        if let Some(s) = streams.iter().find(|s| channels_ok(profile, s)) {
            return selection(s, profile);
        }
    }

    match streams.first() {
        Some(s) => selection(s, profile),
        None => AudioSelection::none(),
    }
}

/// Bitrate used when re-encoding to `codec`.
pub fn bitrate_for(codec: &str) -> u32 {
    if codec.eq_ignore_ascii_case("opus") || codec.eq_ignore_ascii_case("libopus") {
        96
    } else {
        128
    }
}

/// Copy when the source codec is one the profile accepts, otherwise
/// re-encode to the profile's first-choice codec.
///
/// The accepted set is the profile's priority list, or its single
/// `audio_codec` when the list is empty. An unknown source codec always
/// re-encodes.
pub fn decide_audio(profile: &TranscodingProfile, source_codec: Option<&str>) -> AudioDecision {
    let accepted = |codec: &str| {
        if profile.audio_codecs.is_empty() {
            profile.audio_codec.eq_ignore_ascii_case(codec)
        } else {
            profile.audio_codecs.iter().any(|c| c.eq_ignore_ascii_case(codec))
        }
    };

    if source_codec.is_some_and(accepted) {
        return AudioDecision::Copy;
    }

    let target = profile
        .audio_codecs
        .first()
        .cloned()
        .unwrap_or_else(|| profile.audio_codec.clone());
    AudioDecision::Encode {
        bitrate_kbps: bitrate_for(&target),
        codec: target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> TranscodingProfile {
        TranscodingProfile {
            audio_codecs: Vec::new(),
            max_audio_channels: None,
            ..TranscodingProfile::web_default()
        }
    }

    fn stream(index: usize, lang: &str, codec: &str, channels: Option<u32>) -> AudioStream {
        AudioStream {
            index,
            language: Some(lang.into()),
            codec: Some(codec.into()),
            channels,
            title: None,
        }
    }

    fn de_en() -> Vec<AudioStream> {
        vec![stream(0, "de", "aac", Some(2)), stream(1, "en", "ac3", Some(6))]
    }

    #[test]
    fn language_priority_beats_stream_order() {
        let mut p = profile();
        p.preferred_languages = vec!["en".into()];
        assert_eq!(select_audio_stream(&p, &de_en()).index, Some(1));

        p.preferred_languages = vec!["en".into(), "de".into()];
        assert_eq!(select_audio_stream(&p, &de_en()).index, Some(1));

        p.preferred_languages = vec!["de".into(), "en".into()];
        assert_eq!(select_audio_stream(&p, &de_en()).index, Some(0));
    }

    #[test]
    fn language_match_is_prefix_tolerant_both_ways() {
        assert!(language_matches("en", Some("eng")));
        assert!(language_matches("ENG", Some("en")));
        assert!(language_matches("e", Some("eng")));
        assert!(!language_matches("en", Some("de")));
        assert!(!language_matches("en", None));
        assert!(!language_matches("", Some("en")));
    }

    #[test]
    fn language_rule_respects_codec_and_channels() {
        let mut p = profile();
        p.preferred_languages = vec!["en".into()];
        p.audio_codecs = vec!["aac".into()];
        let streams = vec![
            stream(0, "en", "ac3", Some(6)),
            stream(1, "de", "aac", Some(2)),
            stream(2, "en", "aac", Some(2)),
        ];
        assert_eq!(select_audio_stream(&p, &streams).index, Some(2));

        p.audio_codecs.clear();
        p.max_audio_channels = Some(2);
        assert_eq!(select_audio_stream(&p, &streams).index, Some(2));
    }

    #[test]
    fn unmatched_language_falls_through_to_codec_rule() {
        let mut p = profile();
        p.preferred_languages = vec!["fr".into()];
        p.audio_codecs = vec!["ac3".into(), "aac".into()];
        let sel = select_audio_stream(&p, &de_en());
        assert_eq!(sel.index, Some(1));
        assert_eq!(sel.codec.as_deref(), Some("ac3"));
    }

    #[test]
    fn codec_priority_order() {
        let mut p = profile();
        p.audio_codecs = vec!["aac".into(), "ac3".into()];
        assert_eq!(select_audio_stream(&p, &de_en()).index, Some(0));
        p.audio_codecs = vec!["opus".into(), "ac3".into()];
        assert_eq!(select_audio_stream(&p, &de_en()).index, Some(1));
    }

    #[test]
    fn channel_limit_rule_and_unknown_channels() {
        let mut p = profile();
        p.max_audio_channels = Some(2);
        let streams = vec![stream(0, "en", "dts", Some(8)), stream(1, "en", "dts", None)];
        assert_eq!(select_audio_stream(&p, &streams).index, Some(1));
    }

    #[test]
    fn fallback_first_stream_or_none() {
        let p = profile();
        assert_eq!(select_audio_stream(&p, &de_en()).index, Some(0));
        let none = select_audio_stream(&p, &[]);
        assert_eq!(none.index, None);
        assert!(none.codec.is_none());
    }

    #[test]
    fn copy_when_source_is_supported() {
        let mut p = profile();
        p.audio_codecs = vec!["aac".into(), "mp3".into()];
        assert_eq!(decide_audio(&p, Some("MP3")), AudioDecision::Copy);
        assert_eq!(
            decide_audio(&p, Some("dts")),
            AudioDecision::Encode {
                codec: "aac".into(),
                bitrate_kbps: 128
            }
        );
    }

    #[test]
    fn single_codec_profile_and_opus_bitrate() {
        let mut p = profile();
        p.audio_codec = "opus".into();
        assert!(decide_audio(&p, Some("opus")).is_copy());
        assert_eq!(
            decide_audio(&p, None),
            AudioDecision::Encode {
                codec: "opus".into(),
                bitrate_kbps: 96
            }
        );
    }
}
