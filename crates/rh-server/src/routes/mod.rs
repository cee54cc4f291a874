//! Route handlers for the HTTP API.

pub mod health;
pub mod items;
pub mod jobs;
pub mod library;
pub mod media;
pub mod playback;
pub mod profiles;
pub mod streaming_helpers;

use std::time::Duration;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::rate_limit::retry_after_secs;

/// Body of a rate-limited response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RateLimitedResponse {
    pub error: String,
    pub retry_after_secs: u64,
}

/// `429 Too Many Requests` with a `Retry-After` header.
pub fn too_many_requests(wait: Duration) -> Response {
    let secs = retry_after_secs(wait);
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, secs.to_string())],
        Json(RateLimitedResponse {
            error: format!("rate limited, retry after {secs}s"),
            retry_after_secs: secs,
        }),
    )
        .into_response()
}
