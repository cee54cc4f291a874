use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::context::AppContext;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Whether a metadata store is configured.
    pub store: bool,
    pub read_only: bool,
    pub ffmpeg: bool,
}

/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Server is up", body = HealthResponse))
)]
pub async fn health_check(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store: ctx.store.is_some(),
        read_only: ctx.store.as_ref().is_some_and(|s| s.read_only()),
        ffmpeg: ctx.tools.path(rh_av::Tool::Ffmpeg).is_some(),
    })
}
