//! Job status and download handlers.

use std::path::Path as FsPath;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tracing::warn;
use vforge_models::{Job, JobId, JobStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Job status response.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            output_path: job.output_path,
            s3_url: job.s3_url,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

async fn find_job(state: &AppState, job_id: &str) -> ApiResult<Job> {
    state
        .orchestrator
        .store()
        .get(&JobId::from(job_id))
        .await
        .ok_or_else(|| ApiError::not_found(format!("Job with ID {} does not exist", job_id)))
}

/// Get the status of a job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = find_job(&state, &job_id).await?;
    Ok(Json(job.into()))
}

/// Stream a completed job's output as an attachment.
pub async fn download_job_output(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let job = find_job(&state, &job_id).await?;

    if job.status != JobStatus::Completed {
        return Err(ApiError::NotReady(format!(
            "Job is currently {}. Please wait for it to complete.",
            job.status.as_str()
        )));
    }

    let output_path = job
        .output_path
        .ok_or_else(|| ApiError::internal("Job completed but no output file was generated"))?;

    let file = match tokio::fs::File::open(&output_path).await {
        Ok(file) => file,
        Err(e) => {
            warn!(job_id = %job_id, path = %output_path, "Output file unavailable: {}", e);
            return Err(ApiError::internal("The output file no longer exists on the server"));
        }
    };
    let size = file
        .metadata()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .len();

    let file_name = FsPath::new(&output_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}.mp4", job_id));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name),
        )
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::internal(e.to_string()))
}
