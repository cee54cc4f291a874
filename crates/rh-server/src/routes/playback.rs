//! Playback progress and per-client flag route handlers.
//!
//! Clients identify themselves with the `X-Client-Id` header; requests
//! without one share the `anonymous` client.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use rh_core::{Error, MediaId};
use rh_db::{MediaStore, PlaybackState};
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::too_many_requests;

const X_CLIENT_ID: &str = "x-client-id";
const ANONYMOUS: &str = "anonymous";

fn client_id(headers: &HeaderMap) -> String {
    headers
        .get(X_CLIENT_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

/// Progress and flag rows reference stored items.
fn stored_item(store: &dyn MediaStore, id: &str) -> Result<MediaId, Error> {
    let id = MediaId::new(id);
    match store.get_item(&id)? {
        Some(_) => Ok(id),
        None => Err(Error::not_found("media", &id)),
    }
}

// ---------------------------------------------------------------------------
// Request / response schemas
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateProgressRequest {
    pub position_secs: f64,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PlaybackResponse {
    pub media_id: String,
    pub client_id: String,
    pub position_secs: f64,
    pub duration_secs: Option<f64>,
    pub completed: bool,
    pub updated_at: Option<String>,
    pub favorite: bool,
    pub watched: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct FlagResponse {
    pub media_id: String,
    pub favorite: bool,
    pub watched: bool,
}

// ---------------------------------------------------------------------------
// Playback routes
// ---------------------------------------------------------------------------

/// POST /api/playback/{id}/progress
///
/// At most one update per media and client per interval.
#[utoipa::path(
    post,
    path = "/api/playback/{id}/progress",
    params(("id" = String, Path, description = "Media ID")),
    request_body = UpdateProgressRequest,
    responses(
        (status = 204, description = "Progress saved"),
        (status = 400, description = "Invalid position"),
        (status = 404, description = "Unknown media"),
        (status = 429, description = "Rate limited", body = crate::routes::RateLimitedResponse)
    )
)]
pub async fn update_progress(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateProgressRequest>,
) -> Result<Response, AppError> {
    if !body.position_secs.is_finite() || body.position_secs < 0.0 {
        return Err(Error::Validation("position_secs must be a non-negative number".into()).into());
    }
    let store = ctx.store()?;
    let media_id = stored_item(store.as_ref(), &id)?;
    let client = client_id(&headers);

    if let Err(wait) = ctx.playback_limiter.check(&format!("{media_id}:{client}")) {
        return Ok(too_many_requests(wait));
    }

    store.save_playback(&PlaybackState {
        media_id: media_id.clone(),
        client_id: client.clone(),
        position_secs: body.position_secs,
        duration_secs: body.duration_secs,
        completed: body.completed,
        updated_at: Utc::now(),
    })?;
    if body.completed {
        store.set_watched(&media_id, &client, true)?;
    }
    tracing::debug!(media_id = %media_id, client_id = %client, position = body.position_secs, "Progress saved");
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// GET /api/playback/{id}
#[utoipa::path(
    get,
    path = "/api/playback/{id}",
    params(("id" = String, Path, description = "Media ID")),
    responses(
        (status = 200, description = "Playback state and flags", body = PlaybackResponse),
        (status = 404, description = "Unknown media")
    )
)]
pub async fn get_playback(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PlaybackResponse>, AppError> {
    let store = ctx.store()?;
    let media_id = stored_item(store.as_ref(), &id)?;
    let client = client_id(&headers);
    let state = store.get_playback(&media_id, &client)?;
    let flags = store.get_user_flags(&media_id, &client)?;

    Ok(Json(PlaybackResponse {
        media_id: media_id.to_string(),
        position_secs: state.as_ref().map_or(0.0, |s| s.position_secs),
        duration_secs: state.as_ref().and_then(|s| s.duration_secs),
        completed: state.as_ref().is_some_and(|s| s.completed),
        updated_at: state.as_ref().map(|s| s.updated_at.to_rfc3339()),
        client_id: client,
        favorite: flags.favorite,
        watched: flags.watched,
    }))
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

enum Flag {
    Favorite,
    Watched,
}

fn set_flag(ctx: &AppContext, id: &str, headers: &HeaderMap, flag: Flag, on: bool) -> Result<FlagResponse, Error> {
    let store = ctx.store()?;
    let media_id = stored_item(store.as_ref(), id)?;
    let client = client_id(headers);
    match flag {
        Flag::Favorite => store.set_favorite(&media_id, &client, on)?,
        Flag::Watched => store.set_watched(&media_id, &client, on)?,
    }
    let flags = store.get_user_flags(&media_id, &client)?;
    Ok(FlagResponse {
        media_id: media_id.to_string(),
        favorite: flags.favorite,
        watched: flags.watched,
    })
}

/// POST /api/favorites/{id}
#[utoipa::path(
    post,
    path = "/api/favorites/{id}",
    params(("id" = String, Path, description = "Media ID")),
    responses((status = 200, description = "Flags after the change", body = FlagResponse))
)]
pub async fn add_favorite(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<FlagResponse>, AppError> {
    Ok(Json(set_flag(&ctx, &id, &headers, Flag::Favorite, true)?))
}

/// DELETE /api/favorites/{id}
#[utoipa::path(
    delete,
    path = "/api/favorites/{id}",
    params(("id" = String, Path, description = "Media ID")),
    responses((status = 200, description = "Flags after the change", body = FlagResponse))
)]
pub async fn remove_favorite(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<FlagResponse>, AppError> {
    Ok(Json(set_flag(&ctx, &id, &headers, Flag::Favorite, false)?))
}

/// POST /api/watched/{id}
#[utoipa::path(
    post,
    path = "/api/watched/{id}",
    params(("id" = String, Path, description = "Media ID")),
    responses((status = 200, description = "Flags after the change", body = FlagResponse))
)]
pub async fn mark_watched(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<FlagResponse>, AppError> {
    Ok(Json(set_flag(&ctx, &id, &headers, Flag::Watched, true)?))
}

/// DELETE /api/watched/{id}
#[utoipa::path(
    delete,
    path = "/api/watched/{id}",
    params(("id" = String, Path, description = "Media ID")),
    responses((status = 200, description = "Flags after the change", body = FlagResponse))
)]
pub async fn mark_unwatched(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<FlagResponse>, AppError> {
    Ok(Json(set_flag(&ctx, &id, &headers, Flag::Watched, false)?))
}
