//! Library scan route handlers.

use std::path::{Path, PathBuf};

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rh_core::{Error, ScanRun};
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::too_many_requests;
use crate::scanner::ScanReport;

/// Rate-limit key shared by every manual scan.
const SCAN_KEY: &str = "library-scan";

/// Request body for a manual scan. Both fields are optional; an empty body
/// scans every root.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct ScanRequest {
    /// Index into the configured roots.
    pub root: Option<usize>,
    /// Subtree to scan, absolute or relative to the root.
    pub path: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ScanReportResponse {
    pub root: String,
    pub target: String,
    pub scanned: usize,
    pub upserted: usize,
    pub deleted: usize,
    pub errors: Vec<String>,
}

impl From<ScanReport> for ScanReportResponse {
    fn from(r: ScanReport) -> Self {
        Self {
            root: r.root.to_string_lossy().into_owned(),
            target: r.target.to_string_lossy().into_owned(),
            scanned: r.scanned,
            upserted: r.upserted,
            deleted: r.deleted,
            errors: r.errors,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LibraryRootResponse {
    pub index: usize,
    pub path: String,
    pub kind: String,
    /// Store ID, once the root has been scanned against a writable store.
    pub id: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ScanRunResponse {
    pub id: String,
    pub root_id: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub error: Option<String>,
}

impl ScanRunResponse {
    fn from_model(run: &ScanRun) -> Self {
        Self {
            id: run.id.to_string(),
            root_id: run.root_id.to_string(),
            status: run.status.as_str().to_string(),
            started_at: run.started_at.to_rfc3339(),
            finished_at: run.finished_at.map(|t| t.to_rfc3339()),
            error: run.error.clone(),
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListScansParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// Pick the root a request targets: the explicit index, else the first
/// root containing an absolute path, else the first root.
fn root_for(ctx: &AppContext, req: &ScanRequest) -> usize {
    if let Some(index) = req.root {
        return index;
    }
    let Some(path) = req.path.as_deref().map(Path::new).filter(|p| p.is_absolute()) else {
        return 0;
    };
    ctx.scanner
        .roots()
        .iter()
        .position(|r| {
            let root = std::fs::canonicalize(&r.path).unwrap_or_else(|_| r.path.clone());
            path.starts_with(&r.path) || path.starts_with(root)
        })
        .unwrap_or(0)
}

/// POST /api/library/scan
///
/// Runs the scan on a blocking worker and replies with its reports once it
/// is done. The request is validated before the rate limiter is consulted,
/// so a rejected path does not use up the scan interval.
#[utoipa::path(
    post,
    path = "/api/library/scan",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "Scan reports, one per scanned root", body = Vec<ScanReportResponse>),
        (status = 400, description = "Invalid body or path escapes the root"),
        (status = 403, description = "Store is read-only"),
        (status = 404, description = "Unknown root index"),
        (status = 429, description = "Rate limited", body = crate::routes::RateLimitedResponse)
    )
)]
pub async fn scan_library(
    State(ctx): State<AppContext>,
    body: Bytes,
) -> Result<Response, AppError> {
    let req: ScanRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ScanRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| Error::Validation(format!("invalid scan request: {e}")))?
    };

    let subtree = if req.root.is_none() && req.path.is_none() {
        ctx.scanner.check_scan_allowed()?;
        None
    } else {
        let index = root_for(&ctx, &req);
        let path = req.path.map(PathBuf::from);
        ctx.scanner.validate_target(index, path.as_deref())?;
        Some((index, path))
    };

    if let Err(wait) = ctx.scan_limiter.check(SCAN_KEY) {
        tracing::debug!(wait_ms = wait.as_millis() as u64, "Manual scan rate limited");
        return Ok(too_many_requests(wait));
    }

    let reports = match subtree {
        None => ctx.scanner.clone().scan_all().await?,
        Some((index, path)) => vec![ctx.scanner.clone().scan_path(index, path).await?],
    };

    let body: Vec<ScanReportResponse> = reports.into_iter().map(Into::into).collect();
    Ok((StatusCode::OK, Json(body)).into_response())
}

/// GET /api/library/roots
#[utoipa::path(
    get,
    path = "/api/library/roots",
    responses((status = 200, description = "Configured roots", body = Vec<LibraryRootResponse>))
)]
pub async fn list_roots(
    State(ctx): State<AppContext>,
) -> Result<Json<Vec<LibraryRootResponse>>, AppError> {
    let stored = match &ctx.store {
        Some(store) => store.list_library_roots()?,
        None => Vec::new(),
    };
    let roots = ctx
        .scanner
        .roots()
        .iter()
        .enumerate()
        .map(|(index, r)| {
            let canonical = std::fs::canonicalize(&r.path).unwrap_or_else(|_| r.path.clone());
            LibraryRootResponse {
                index,
                path: r.path.to_string_lossy().into_owned(),
                kind: r.kind.clone(),
                id: stored
                    .iter()
                    .find(|s| s.path == canonical || s.path == r.path)
                    .map(|s| s.id.to_string()),
            }
        })
        .collect();
    Ok(Json(roots))
}

/// GET /api/library/scans
#[utoipa::path(
    get,
    path = "/api/library/scans",
    params(ListScansParams),
    responses(
        (status = 200, description = "Recent scan runs, newest first", body = Vec<ScanRunResponse>),
        (status = 403, description = "No metadata store")
    )
)]
pub async fn list_scans(
    State(ctx): State<AppContext>,
    Query(params): Query<ListScansParams>,
) -> Result<Json<Vec<ScanRunResponse>>, AppError> {
    let runs = ctx.store()?.list_scan_runs(None, params.limit)?;
    Ok(Json(runs.iter().map(ScanRunResponse::from_model).collect()))
}
