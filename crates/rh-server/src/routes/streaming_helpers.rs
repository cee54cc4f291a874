//! Shared streaming helpers: range parsing, content-type guessing, and
//! chunked file serving via `ReaderStream`.

use std::path::{Component, Path, PathBuf};

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use rh_core::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

const CHUNK: usize = 64 * 1024;

/// A parsed single `Range: bytes=...` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=START-` or `bytes=START-END`.
    From { start: u64, end: Option<u64> },
    /// `bytes=-N`: the last N bytes.
    Suffix(u64),
}

impl ByteRange {
    /// Inclusive `(start, end)` within a file of `size` bytes, or `None`
    /// when the range cannot be satisfied.
    pub fn resolve(self, size: u64) -> Option<(u64, u64)> {
        if size == 0 {
            return None;
        }
        match self {
            ByteRange::From { start, end } => {
                let end = end.unwrap_or(size - 1).min(size - 1);
                (start <= end).then_some((start, end))
            }
            ByteRange::Suffix(0) => None,
            ByteRange::Suffix(n) => Some((size.saturating_sub(n), size - 1)),
        }
    }
}

/// Parse a `Range` header value.
///
/// `None` means the header is malformed or asks for several ranges; only a
/// single range is supported.
pub fn parse_range_header(value: &str) -> Option<ByteRange> {
    let ranges = value.trim().strip_prefix("bytes=")?;
    if ranges.contains(',') {
        return None;
    }
    let (start_str, end_str) = ranges.split_once('-')?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if start_str.is_empty() {
        return Some(ByteRange::Suffix(end_str.parse().ok()?));
    }
    let start = start_str.parse().ok()?;
    let end = if end_str.is_empty() {
        None
    } else {
        Some(end_str.parse().ok()?)
    };
    Some(ByteRange::From { start, end })
}

/// Guess the MIME type from file extension / container.
pub fn guess_content_type(file_name: &str, container: Option<&str>) -> &'static str {
    let ext = container
        .or_else(|| file_name.rsplit('.').next())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "ts" | "m2ts" => "video/mp2t",
        "mov" => "video/quicktime",
        "m3u8" => "application/vnd.apple.mpegurl",
        "m4s" => "video/iso.segment",
        "aac" => "audio/aac",
        _ => "application/octet-stream",
    }
}

/// Join `relative` under `base`, rejecting anything but plain path
/// components (`..`, absolute paths, prefixes).
pub fn contained_path(base: &Path, relative: &str) -> Result<PathBuf, Error> {
    let rel = Path::new(relative);
    if relative.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(Error::Validation(format!("invalid path '{relative}'")));
    }
    Ok(base.join(rel))
}

fn not_satisfiable(size: u64) -> Response {
    (
        StatusCode::RANGE_NOT_SATISFIABLE,
        [(header::CONTENT_RANGE, format!("bytes */{size}"))],
        Body::empty(),
    )
        .into_response()
}

/// Serve a file using chunked streaming via `ReaderStream`.
///
/// Reads are done in 64KB chunks so memory stays bounded regardless of file
/// size. A single byte range is honored; a malformed or out-of-bounds
/// range yields 416.
pub async fn serve_file_streaming(
    file_path: &Path,
    container: Option<&str>,
    range_header: Option<&str>,
) -> Result<Response, Error> {
    let metadata = tokio::fs::metadata(file_path)
        .await
        .map_err(|_| Error::not_found("file", file_path.display()))?;
    if !metadata.is_file() {
        return Err(Error::not_found("file", file_path.display()));
    }

    let file_size = metadata.len();
    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let content_type = guess_content_type(&file_name, container);

    let mut file = tokio::fs::File::open(file_path)
        .await
        .map_err(|_| Error::not_found("file", file_path.display()))?;

    let Some(range_value) = range_header else {
        let body = Body::from_stream(ReaderStream::with_capacity(file, CHUNK));
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type.to_string()),
                (header::CONTENT_LENGTH, file_size.to_string()),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
            body,
        )
            .into_response());
    };

    let Some((start, end)) = parse_range_header(range_value).and_then(|r| r.resolve(file_size))
    else {
        return Ok(not_satisfiable(file_size));
    };

    let length = end - start + 1;
    file.seek(std::io::SeekFrom::Start(start)).await?;
    let body = Body::from_stream(ReaderStream::with_capacity(file.take(length), CHUNK));

    Ok((
        StatusCode::PARTIAL_CONTENT,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_RANGE, format!("bytes {start}-{end}/{file_size}")),
            (header::CONTENT_LENGTH, length.to_string()),
            (header::ACCEPT_RANGES, "bytes".to_string()),
        ],
        body,
    )
        .into_response())
}
