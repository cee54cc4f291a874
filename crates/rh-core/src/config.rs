//! Application configuration types.
//!
//! The top-level [`Config`] is deserialized from JSON. Every section
//! defaults sensibly so an empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::transcode::TranscodingProfile;
use crate::Error;

/// Extensions indexed when the config does not list its own.
pub const DEFAULT_EXTENSIONS: &[&str] = &["avi", "m2ts", "m4v", "mkv", "mov", "mp4", "ts", "webm"];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub library: LibraryConfig,
    pub transcoding: TranscodingConfig,
    pub rate_limits: RateLimitConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.library.roots.is_empty() {
            warnings.push("library.roots is empty; nothing will be scanned".into());
        }
        for (i, root) in self.library.roots.iter().enumerate() {
            if !root.path.is_absolute() {
                warnings.push(format!(
                    "library.roots[{i}].path '{}' is relative; it resolves against the working directory",
                    root.path.display()
                ));
            }
        }
        if self.library.extensions.is_empty() {
            warnings.push("library.extensions is empty; no files will match".into());
        }
        if self.library.allow_read_only_scan && !self.library.read_only {
            warnings.push("library.allow_read_only_scan has no effect unless read_only is set".into());
        }

        if self.transcoding.hls_segment_secs == 0 {
            warnings.push("transcoding.hls_segment_secs is 0; ffmpeg will pick its default".into());
        }

        let mut seen = HashSet::new();
        for profile in &self.transcoding.profiles {
            if !seen.insert(profile.id.as_str()) {
                warnings.push(format!("transcoding.profiles has duplicate id '{}'", profile.id));
            }
            if let Some(ref res) = profile.resolution {
                if profile.resolution_dims().is_none() {
                    warnings.push(format!(
                        "profile '{}' resolution '{res}' is not WIDTHxHEIGHT",
                        profile.id
                    ));
                }
            }
        }

        if self.rate_limits.scan_interval_secs == 0 {
            warnings.push("rate_limits.scan_interval_secs is 0; manual scans are not limited".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// SQLite database path. `None` runs without a persistent store.
    pub db_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8096,
            db_path: Some(PathBuf::from("./data/reelhouse.db")),
        }
    }
}

/// One configured scan root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryRootConfig {
    pub path: PathBuf,
    #[serde(default = "default_root_kind")]
    pub kind: String,
}

fn default_root_kind() -> String {
    "video".into()
}

/// Library indexing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub roots: Vec<LibraryRootConfig>,
    pub extensions: Vec<String>,
    /// Treat the metadata store as read-only.
    pub read_only: bool,
    /// Allow scans against a read-only store, updating only the in-memory snapshot.
    pub allow_read_only_scan: bool,
    /// Interval between periodic scans; 0 disables them.
    pub scan_interval_secs: u64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            read_only: false,
            allow_read_only_scan: false,
            scan_interval_secs: 0,
        }
    }
}

impl LibraryConfig {
    /// Lower-cased, dot-stripped extension allow-list.
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect()
    }
}

/// Transcoding and cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodingConfig {
    pub cache_dir: PathBuf,
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age_secs: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_segment_secs")]
    pub hls_segment_secs: u32,
    #[serde(default = "default_encode_timeout")]
    pub encode_timeout_secs: u64,
    /// Also remove cached output files when their rows are evicted.
    pub delete_files_on_evict: bool,
    pub profiles: Vec<TranscodingProfile>,
}

fn default_cache_max_age() -> u64 {
    24 * 60 * 60
}
fn default_cleanup_interval() -> u64 {
    60 * 60
}
fn default_segment_secs() -> u32 {
    6
}
fn default_encode_timeout() -> u64 {
    6 * 60 * 60
}

impl Default for TranscodingConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./data/transcode"),
            cache_max_age_secs: default_cache_max_age(),
            cleanup_interval_secs: default_cleanup_interval(),
            hls_segment_secs: default_segment_secs(),
            encode_timeout_secs: default_encode_timeout(),
            delete_files_on_evict: false,
            profiles: vec![TranscodingProfile::web_default()],
        }
    }
}

impl TranscodingConfig {
    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }

    pub fn encode_timeout(&self) -> Duration {
        Duration::from_secs(self.encode_timeout_secs)
    }
}

/// Minimum intervals enforced by the keyed rate limiters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub scan_interval_secs: u64,
    pub playback_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 30,
            playback_interval_secs: 5,
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}
