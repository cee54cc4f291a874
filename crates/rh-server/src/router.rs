//! Axum router construction.

use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health_check,
        routes::items::list_items,
        routes::items::get_item,
        routes::library::scan_library,
        routes::library::list_roots,
        routes::library::list_scans,
        routes::media::direct_stream,
        routes::media::transcode,
        routes::media::hls_master,
        routes::media::hls_file,
        routes::jobs::list_jobs,
        routes::jobs::get_job,
        routes::jobs::cancel_job,
        routes::profiles::list_profiles,
        routes::profiles::create_profile,
        routes::playback::update_progress,
        routes::playback::get_playback,
        routes::playback::add_favorite,
        routes::playback::remove_favorite,
        routes::playback::mark_watched,
        routes::playback::mark_unwatched,
    ),
    components(schemas(
        routes::RateLimitedResponse,
        routes::health::HealthResponse,
        routes::items::ItemResponse,
        routes::items::ItemPage,
        routes::items::ItemDetailResponse,
        routes::library::ScanRequest,
        routes::library::ScanReportResponse,
        routes::library::LibraryRootResponse,
        routes::library::ScanRunResponse,
        routes::media::JobAcceptedResponse,
        routes::jobs::JobResponse,
        routes::profiles::ProfileBody,
        routes::playback::UpdateProgressRequest,
        routes::playback::PlaybackResponse,
        routes::playback::FlagResponse,
    ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Items
        .route("/items", get(routes::items::list_items))
        .route("/items/{id}", get(routes::items::get_item))
        // Library
        .route("/library/scan", post(routes::library::scan_library))
        .route("/library/roots", get(routes::library::list_roots))
        .route("/library/scans", get(routes::library::list_scans))
        // Streaming
        .route("/media/{id}/direct", get(routes::media::direct_stream))
        .route("/media/{id}/transcode", get(routes::media::transcode))
        .route("/media/{id}/hls/master.m3u8", get(routes::media::hls_master))
        .route("/media/{id}/hls/{*path}", get(routes::media::hls_file))
        // Jobs
        .route("/jobs", get(routes::jobs::list_jobs))
        .route(
            "/jobs/{id}",
            get(routes::jobs::get_job).delete(routes::jobs::cancel_job),
        )
        // Profiles
        .route(
            "/profiles",
            get(routes::profiles::list_profiles).post(routes::profiles::create_profile),
        )
        // Playback
        .route("/playback/{id}", get(routes::playback::get_playback))
        .route(
            "/playback/{id}/progress",
            post(routes::playback::update_progress),
        )
        .route(
            "/favorites/{id}",
            post(routes::playback::add_favorite).delete(routes::playback::remove_favorite),
        )
        .route(
            "/watched/{id}",
            post(routes::playback::mark_watched).delete(routes::playback::mark_unwatched),
        )
        .route("/openapi.json", get(openapi_json));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
