//! Error-to-HTTP response conversion.
//!
//! Route handlers return `Result<T, AppError>` and use `?` on
//! [`rh_core::Error`]. The response body is `{error, code, request_id}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rh_core::Error;
use serde_json::json;

use crate::middleware::request_id;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: Error,
    request_id: Option<String>,
}

impl AppError {
    /// Wrap `inner`, picking up the current request's ID if one is set.
    pub fn new(inner: Error) -> Self {
        Self {
            inner,
            request_id: request_id::current(),
        }
    }

    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn inner(&self) -> &Error {
        &self.inner
    }
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in API handler"
            );
        }

        let body = json!({
            "error": self.inner.to_string(),
            "code": self.inner.code(),
            "request_id": self.request_id,
        });

        (status, axum::Json(body)).into_response()
    }
}
