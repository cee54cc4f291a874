//! Locating ffmpeg and ffprobe.
//!
//! A configured path wins when it exists on disk; otherwise the tool is
//! looked up on `PATH`. Missing tools are not an error until something
//! calls [`ToolRegistry::require`].

use std::fmt;
use std::path::{Path, PathBuf};

use rh_core::config::ToolsConfig;
use rh_core::{Error, Result};
use serde::Serialize;

/// The external programs reelhouse shells out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
}

impl Tool {
    pub const ALL: [Tool; 2] = [Tool::Ffmpeg, Tool::Ffprobe];

    pub fn program(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
        }
    }

    fn configured(self, config: &ToolsConfig) -> Option<&Path> {
        match self {
            Tool::Ffmpeg => config.ffmpeg_path.as_deref(),
            Tool::Ffprobe => config.ffprobe_path.as_deref(),
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Status line for `check-tools` and startup logging.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First line of `-version` output.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Resolved executable paths, one slot per [`Tool`].
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    paths: [Option<PathBuf>; 2],
}

impl ToolRegistry {
    pub fn discover(config: &ToolsConfig) -> Self {
        let mut registry = Self::default();
        for tool in Tool::ALL {
            let path = match tool.configured(config) {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(
                        tool = %tool,
                        path = %p.display(),
                        "Configured path does not exist, falling back to PATH"
                    );
                    which::which(tool.program()).ok()
                }
                None => which::which(tool.program()).ok(),
            };
            match &path {
                Some(p) => tracing::debug!(tool = %tool, path = %p.display(), "Tool located"),
                None => tracing::debug!(tool = %tool, "Tool not located"),
            }
            registry.paths[tool.slot()] = path;
        }
        registry
    }

    /// Registry pointing `tool` at `path`, for tests and explicit setups.
    pub fn with(mut self, tool: Tool, path: impl Into<PathBuf>) -> Self {
        self.paths[tool.slot()] = Some(path.into());
        self
    }

    pub fn path(&self, tool: Tool) -> Option<&Path> {
        self.paths[tool.slot()].as_deref()
    }

    pub fn require(&self, tool: Tool) -> Result<&Path> {
        self.path(tool).ok_or_else(|| {
            Error::tool(
                tool.program(),
                format!("{tool} not found; install it or set tools.{tool}_path"),
            )
        })
    }

    /// Availability of every tool. Runs `-version` on the ones present.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        Tool::ALL
            .into_iter()
            .map(|tool| {
                let path = self.path(tool);
                ToolInfo {
                    name: tool.program().to_string(),
                    available: path.is_some(),
                    version: path.and_then(version_line),
                    path: path.map(Path::to_path_buf),
                }
            })
            .collect()
    }
}

fn version_line(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path).arg("-version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout.lines().next().map(str::to_owned)
}
