//! HLS playlist types.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// `GROUP-ID` shared by every alternate audio rendition.
pub const AUDIO_GROUP_ID: &str = "audio";

/// One `EXT-X-MEDIA:TYPE=AUDIO` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioRendition {
    /// Display name; unique within a master playlist.
    pub name: String,
    pub language: Option<String>,
    pub default: bool,
    /// Relative URI of the rendition's media playlist.
    pub uri: String,
}

/// A stream variant in a master playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Peak bandwidth in bits per second.
    pub bandwidth: u64,
    pub resolution: Option<(u32, u32)>,
    /// Audio group this variant plays with, if any.
    pub audio_group: Option<String>,
    /// URI to the media playlist for this variant.
    pub uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasterPlaylist {
    pub audio: Vec<AudioRendition>,
    pub variants: Vec<Variant>,
}

/// Hands out rendition display names, disambiguating repeats with a
/// counter: `"English"`, `"English (2)"`, ... No name is handed out
/// twice, even when a track title already looks like a disambiguated one.
#[derive(Debug, Default)]
pub struct RenditionNamer {
    next_suffix: HashMap<String, usize>,
    issued: HashSet<String>,
}

impl RenditionNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name for a track: its title, else its upper-cased language, else
    /// `Track <position + 1>`.
    pub fn base_name(title: Option<&str>, language: Option<&str>, position: usize) -> String {
        title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| {
                language
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_uppercase)
            })
            .unwrap_or_else(|| format!("Track {}", position + 1))
    }

    pub fn name(&mut self, title: Option<&str>, language: Option<&str>, position: usize) -> String {
        let base = Self::base_name(title, language, position);
        let mut name = base.clone();
        if self.issued.contains(&name) {
            let next = self.next_suffix.entry(base.clone()).or_insert(2);
            loop {
                name = format!("{base} ({next})");
                *next += 1;
                if !self.issued.contains(&name) {
                    break;
                }
            }
        }
        self.issued.insert(name.clone());
        name
    }
}
