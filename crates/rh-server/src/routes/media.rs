//! Streaming route handlers: direct play, single-file transcodes and HLS.

use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rh_av::select_audio_stream;
use rh_core::{AudioStream, Error, JobKind, JobStatus, MediaId, MediaItem, TranscodingJob};
use rh_media::{playlist_base, rewrite_playlist};
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::streaming_helpers::{contained_path, guess_content_type, serve_file_streaming};
use crate::transcoder::job_id;

const NO_CACHE: &str = "no-cache";
const IMMUTABLE: &str = "public, max-age=31536000, immutable";
const M3U8: &str = "application/vnd.apple.mpegurl";
const X_FORWARDED_PREFIX: &str = "x-forwarded-prefix";

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProfileParams {
    /// Profile ID; the default profile when omitted.
    pub profile: Option<String>,
}

/// Returned with `202 Accepted` while a job is not yet complete.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobAcceptedResponse {
    pub job_id: String,
    pub status: String,
    pub progress: f32,
}

fn accepted(job: &TranscodingJob) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(JobAcceptedResponse {
            job_id: job.id.to_string(),
            status: job.status.as_str().to_string(),
            progress: job.progress,
        }),
    )
        .into_response()
}

fn range_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::RANGE).and_then(|v| v.to_str().ok())
}

fn lookup(ctx: &AppContext, id: &str) -> Result<MediaItem, Error> {
    let id = MediaId::new(id);
    ctx.scanner
        .get(&id)?
        .ok_or_else(|| Error::not_found("media", &id))
}

/// Audio streams known for `item`, from its stored or sidecar metadata.
fn audio_streams(ctx: &AppContext, item: &MediaItem) -> Vec<AudioStream> {
    match ctx.scanner.metadata(item) {
        Ok(meta) => meta.map(|m| m.audio_streams()).unwrap_or_default(),
        Err(e) => {
            tracing::warn!(media_id = %item.id, error = %e, "Failed to load metadata");
            Vec::new()
        }
    }
}

/// Rewrite a stored playlist for the URL it is requested from and serve it
/// uncached.
async fn serve_playlist(
    file: &std::path::Path,
    uri: &axum::http::Uri,
    headers: &HeaderMap,
) -> Result<Response, Error> {
    let body = tokio::fs::read_to_string(file)
        .await
        .map_err(|_| Error::not_found("playlist", file.display()))?;
    let prefix = headers
        .get(X_FORWARDED_PREFIX)
        .and_then(|v| v.to_str().ok());
    let base = playlist_base(uri.path(), prefix);
    let rewritten = rewrite_playlist(&body, &base, uri.query());
    Ok((
        [
            (header::CONTENT_TYPE, M3U8),
            (header::CACHE_CONTROL, NO_CACHE),
        ],
        rewritten,
    )
        .into_response())
}

/// GET /api/media/{id}/direct
#[utoipa::path(
    get,
    path = "/api/media/{id}/direct",
    params(("id" = String, Path, description = "Media ID")),
    responses(
        (status = 200, description = "Original file"),
        (status = 206, description = "Requested byte range"),
        (status = 404, description = "Unknown media"),
        (status = 416, description = "Range not satisfiable")
    )
)]
pub async fn direct_stream(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let item = lookup(&ctx, &id)?;
    Ok(serve_file_streaming(&item.path, None, range_header(&headers)).await?)
}

/// GET /api/media/{id}/transcode
#[utoipa::path(
    get,
    path = "/api/media/{id}/transcode",
    params(("id" = String, Path, description = "Media ID"), ProfileParams),
    responses(
        (status = 200, description = "Transcoded file"),
        (status = 202, description = "Transcode in progress", body = JobAcceptedResponse),
        (status = 404, description = "Unknown media or profile")
    )
)]
pub async fn transcode(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(params): Query<ProfileParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let item = lookup(&ctx, &id)?;
    let profile = ctx.profile(params.profile.as_deref())?;
    let selection = select_audio_stream(&profile, &audio_streams(&ctx, &item));
    let job = ctx.transcoder.start_transcoding(&item, &profile, &selection)?;

    match (&job.status, &job.output_path) {
        (JobStatus::Completed, Some(output)) => {
            let resp =
                serve_file_streaming(output, Some(&profile.container), range_header(&headers)).await;
            match resp {
                Ok(resp) => Ok(resp),
                // Evicted between completion and serving; encode again.
                Err(e) if e.is_not_found() => {
                    let job = ctx.transcoder.start_transcoding(&item, &profile, &selection)?;
                    Ok(accepted(&job))
                }
                Err(e) => Err(e.into()),
            }
        }
        _ => Ok(accepted(&job)),
    }
}

/// GET /api/media/{id}/hls/master.m3u8
#[utoipa::path(
    get,
    path = "/api/media/{id}/hls/master.m3u8",
    params(("id" = String, Path, description = "Media ID"), ProfileParams),
    responses(
        (status = 200, description = "Master playlist"),
        (status = 202, description = "Packaging in progress", body = JobAcceptedResponse),
        (status = 404, description = "Unknown media or profile")
    )
)]
pub async fn hls_master(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(params): Query<ProfileParams>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let item = lookup(&ctx, &id)?;
    let profile = ctx.profile(params.profile.as_deref())?;
    let streams = audio_streams(&ctx, &item);
    let selection = select_audio_stream(&profile, &streams);
    let job = ctx
        .transcoder
        .start_hls_transcoding(&item, &profile, &streams, &selection)?;

    match (&job.status, &job.output_path) {
        (JobStatus::Completed, Some(master)) => Ok(serve_playlist(master, &uri, &headers).await?),
        _ => Ok(accepted(&job)),
    }
}

/// GET /api/media/{id}/hls/{*path}
///
/// Variant playlists and segments of a packaged item. Nothing is served
/// until the item's HLS job has completed.
#[utoipa::path(
    get,
    path = "/api/media/{id}/hls/{path}",
    params(
        ("id" = String, Path, description = "Media ID"),
        ("path" = String, Path, description = "File inside the package"),
        ProfileParams
    ),
    responses(
        (status = 200, description = "Playlist or segment"),
        (status = 400, description = "Path leaves the package"),
        (status = 404, description = "Not packaged or no such file")
    )
)]
pub async fn hls_file(
    State(ctx): State<AppContext>,
    Path((id, path)): Path<(String, String)>,
    Query(params): Query<ProfileParams>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let item = lookup(&ctx, &id)?;
    let profile = ctx.profile(params.profile.as_deref())?;
    let job = job_id(&item.id, &profile.id, JobKind::Hls);
    let dir = ctx
        .transcoder
        .completed_package(&job)?
        .ok_or_else(|| Error::not_found("hls package", &job))?;
    let file = contained_path(&dir, &path)?;

    if path.ends_with(".m3u8") {
        return Ok(serve_playlist(&file, &uri, &headers).await?);
    }

    let body = tokio::fs::read(&file)
        .await
        .map_err(|_| Error::not_found("segment", &path))?;
    Ok((
        [
            (header::CONTENT_TYPE, guess_content_type(&path, None)),
            (header::CACHE_CONTROL, IMMUTABLE),
        ],
        body,
    )
        .into_response())
}
