//! Episode numbering from filenames.
//!
//! Recognizes `S01E02`, `S01.E02`, `S01 E02`, `S01_E02`, `S01-E02` and
//! `1x02`, case-insensitively. The marker must start the name or follow a
//! separator (`.`, `-`, `_`, whitespace), and must not run into further
//! digits, so `1920x1080` is not an episode.

use std::sync::LazyLock;

use regex::Regex;

static SEASON_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[\s._-])s(\d{1,2})[\s._-]?e(\d{1,3})(?:[^\d]|$)")
        .expect("valid season/episode pattern")
});

static CROSS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[\s._-])(\d{1,2})x(\d{1,3})(?:[^\d]|$)").expect("valid NxM pattern")
});

/// Episode numbering and surrounding text parsed from a filename stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeInfo {
    /// Text before the marker, separators collapsed. `None` when empty.
    pub show: Option<String>,
    pub season: u32,
    pub episode: u32,
    /// Text after the marker, separators collapsed. `None` when empty.
    pub episode_title: Option<String>,
}

impl EpisodeInfo {
    /// `"Show S01E02 - Title"`, dropping the parts that are absent.
    pub fn display_title(&self) -> String {
        let marker = format!("S{:02}E{:02}", self.season, self.episode);
        let mut out = match &self.show {
            Some(show) => format!("{show} {marker}"),
            None => marker,
        };
        if let Some(title) = &self.episode_title {
            out.push_str(" - ");
            out.push_str(title);
        }
        out
    }
}

/// Collapse runs of separators to single spaces and trim.
fn normalize(s: &str) -> Option<String> {
    let words: Vec<&str> = s
        .split(|c: char| c == '.' || c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// Parse episode numbering from a filename stem (no extension).
pub fn parse_episode(stem: &str) -> Option<EpisodeInfo> {
    let caps = SEASON_EPISODE
        .captures(stem)
        .or_else(|| CROSS.captures(stem))?;
    let whole = caps.get(0)?;
    let season_m = caps.get(1)?;
    let episode_m = caps.get(2)?;

    Some(EpisodeInfo {
        show: normalize(&stem[..whole.start()]),
        season: season_m.as_str().parse().ok()?,
        episode: episode_m.as_str().parse().ok()?,
        episode_title: normalize(&stem[episode_m.end()..]),
    })
}

/// Display title for a filename stem, plus episode info when the stem
/// carries an episode marker. Without one the stem is the title.
pub fn derive_title(stem: &str) -> (String, Option<EpisodeInfo>) {
    match parse_episode(stem) {
        Some(info) => (info.display_title(), Some(info)),
        None => (stem.to_string(), None),
    }
}
