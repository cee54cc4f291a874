//! Error type shared by every reelhouse crate.
//!
//! Handlers turn an [`Error`] into a response through [`Error::http_status`]
//! and [`Error::code`]. The scanner joins the display text of the errors it
//! collects into a scan run's error field, so messages stay single-line.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Lookup of `entity` by `id` came back empty.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Bad caller input: a scan path outside its root, a malformed body.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Writes against a read-only store, or a store-backed route without a store.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Metadata store failure. Boxed so this crate stays free of rusqlite.
    #[error("Database error: {source}")]
    Database {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// ffmpeg or ffprobe could not be run, or exited non-zero. `message`
    /// carries the tail of the captured output.
    #[error("Tool error [{tool}]: {message}")]
    Tool { tool: String, message: String },

    #[error("Probe error: {0}")]
    Probe(String),

    /// Work stopped because its cancellation token fired.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// `(status, machine code)` pair used for HTTP responses.
    fn kind(&self) -> (u16, &'static str) {
        match self {
            Error::NotFound { .. } => (404, "not_found"),
            Error::Validation(_) => (400, "validation_error"),
            Error::Forbidden(_) => (403, "forbidden"),
            Error::Conflict(_) => (409, "conflict"),
            Error::Database { .. } => (500, "database_error"),
            Error::Io { .. } => (500, "io_error"),
            Error::Tool { .. } => (502, "tool_error"),
            Error::Probe(_) => (422, "probe_error"),
            Error::Cancelled(_) => (409, "cancelled"),
            Error::Internal(_) => (500, "internal_error"),
        }
    }

    pub fn http_status(&self) -> u16 {
        self.kind().0
    }

    /// Stable snake_case identifier for API clients.
    pub fn code(&self) -> &'static str {
        self.kind().1
    }

    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
