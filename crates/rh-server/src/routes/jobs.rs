//! Transcoding job route handlers.

use axum::extract::{Path, State};
use axum::Json;
use rh_core::{Error, JobId, JobKind, TranscodingJob};
use serde::Serialize;

use crate::context::AppContext;
use crate::error::AppError;

/// Snapshot of one transcoding job as the API reports it.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobResponse {
    #[serde(rename = "job_id")]
    pub id: String,
    pub media_id: String,
    pub profile_id: String,
    /// `file` or `hls`.
    pub kind: String,
    pub status: String,
    pub progress: f32,
    /// Set once the job reached a terminal state.
    pub done: bool,
    pub error: Option<String>,
    pub output_path: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

impl From<&TranscodingJob> for JobResponse {
    fn from(job: &TranscodingJob) -> Self {
        let kind = match job.kind {
            JobKind::File => "file",
            JobKind::Hls => "hls",
        };
        Self {
            id: job.id.to_string(),
            media_id: job.media_id.to_string(),
            profile_id: job.profile_id.to_string(),
            kind: kind.into(),
            status: job.status.as_str().into(),
            progress: job.progress,
            done: job.status.is_terminal(),
            error: job.error.clone(),
            output_path: job.output_path.as_deref().map(|p| p.display().to_string()),
            created_at: job.created_at.to_rfc3339(),
            started_at: job.started_at.map(|t| t.to_rfc3339()),
            finished_at: job.finished_at.map(|t| t.to_rfc3339()),
        }
    }
}

fn unknown_job(id: &str) -> AppError {
    Error::not_found("job", id).into()
}

/// GET /api/jobs
#[utoipa::path(
    get,
    path = "/api/jobs",
    responses((status = 200, description = "All jobs, oldest first", body = Vec<JobResponse>))
)]
pub async fn list_jobs(State(ctx): State<AppContext>) -> Json<Vec<JobResponse>> {
    Json(ctx.transcoder.jobs().iter().map(JobResponse::from).collect())
}

/// GET /api/jobs/{id}
#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job status", body = JobResponse),
        (status = 404, description = "Unknown job")
    )
)]
pub async fn get_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    match ctx.transcoder.job(&JobId::new(id.as_str())) {
        Some(job) => Ok(Json((&job).into())),
        None => Err(unknown_job(&id)),
    }
}

/// DELETE /api/jobs/{id}
///
/// Cancel a job. Cancelling a finished job leaves it unchanged.
#[utoipa::path(
    delete,
    path = "/api/jobs/{id}",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Job after cancellation", body = JobResponse),
        (status = 404, description = "Unknown job")
    )
)]
pub async fn cancel_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let job = ctx
        .transcoder
        .cancel(&JobId::new(id.as_str()))
        .ok_or_else(|| unknown_job(&id))?;
    tracing::info!(job_id = %job.id, status = job.status.as_str(), "Cancel requested");
    Ok(Json(JobResponse::from(&job)))
}
