//! Parsed sidecar metadata, one variant per NFO root element.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::transcode::AudioStream;

/// Fields shared by every titled NFO document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonMeta {
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub plot: Option<String>,
    pub year: Option<i32>,
    pub premiered: Option<String>,
    pub runtime_minutes: Option<u32>,
    pub rating: Option<f32>,
    pub genres: Vec<String>,
    pub studios: Vec<String>,
    /// Provider name to provider ID (`tmdb`, `imdb`, `tvdb`).
    pub unique_ids: BTreeMap<String, String>,
    pub stream_details: Option<StreamDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoDetail {
    pub codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_secs: Option<u64>,
}

/// The `<fileinfo><streamdetails>` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamDetails {
    pub video: Vec<VideoDetail>,
    pub audio: Vec<AudioStream>,
    pub subtitle_languages: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovieMeta {
    #[serde(flatten)]
    pub common: CommonMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShowMeta {
    #[serde(flatten)]
    pub common: CommonMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMeta {
    #[serde(flatten)]
    pub common: CommonMeta,
    #[serde(default)]
    pub show_title: Option<String>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
    #[serde(default)]
    pub aired: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonMeta {
    #[serde(flatten)]
    pub common: CommonMeta,
    #[serde(default)]
    pub season: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MusicVideoMeta {
    #[serde(flatten)]
    pub common: CommonMeta,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub biography: Option<String>,
    #[serde(default)]
    pub birthdate: Option<String>,
}

/// Metadata decoded from a sidecar file, tagged by the document's root element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NfoMetadata {
    Movie(MovieMeta),
    Show(ShowMeta),
    Episode(EpisodeMeta),
    Season(SeasonMeta),
    MusicVideo(MusicVideoMeta),
    Person(PersonMeta),
    Unknown { root: String },
}

impl NfoMetadata {
    /// Minimal episode record derived from a filename pattern.
    pub fn episode_fallback(show: Option<String>, season: u32, episode: u32, title: Option<String>) -> Self {
        NfoMetadata::Episode(EpisodeMeta {
            common: CommonMeta {
                title,
                ..Default::default()
            },
            show_title: show,
            season: Some(season),
            episode: Some(episode),
            aired: None,
        })
    }

    /// Short tag stored alongside the serialized record.
    pub fn kind(&self) -> &'static str {
        match self {
            NfoMetadata::Movie(_) => "movie",
            NfoMetadata::Show(_) => "show",
            NfoMetadata::Episode(_) => "episode",
            NfoMetadata::Season(_) => "season",
            NfoMetadata::MusicVideo(_) => "music_video",
            NfoMetadata::Person(_) => "person",
            NfoMetadata::Unknown { .. } => "unknown",
        }
    }

    fn common(&self) -> Option<&CommonMeta> {
        match self {
            NfoMetadata::Movie(m) => Some(&m.common),
            NfoMetadata::Show(m) => Some(&m.common),
            NfoMetadata::Episode(m) => Some(&m.common),
            NfoMetadata::Season(m) => Some(&m.common),
            NfoMetadata::MusicVideo(m) => Some(&m.common),
            NfoMetadata::Person(_) | NfoMetadata::Unknown { .. } => None,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            NfoMetadata::Person(p) => p.name.as_deref(),
            _ => self.common().and_then(|c| c.title.as_deref()),
        }
    }

    pub fn stream_details(&self) -> Option<&StreamDetails> {
        self.common().and_then(|c| c.stream_details.as_ref())
    }

    /// Audio streams from the stream details, or empty when none were parsed.
    pub fn audio_streams(&self) -> Vec<AudioStream> {
        self.stream_details()
            .map(|sd| sd.audio.clone())
            .unwrap_or_default()
    }

    /// `(show title, season, episode)` when this is an episode with numbering.
    pub fn episode_numbering(&self) -> Option<(Option<&str>, u32, u32)> {
        match self {
            NfoMetadata::Episode(e) => Some((e.show_title.as_deref(), e.season?, e.episode?)),
            _ => None,
        }
    }
}
