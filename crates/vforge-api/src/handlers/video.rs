//! Processing request handlers.
//!
//! Every handler validates through the orchestrator and answers 202 with a
//! job receipt; the work itself happens in the background.

use std::path::{Path, PathBuf};

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::{header, StatusCode};
use axum::Json;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;
use vforge_jobs::{JobReceipt, SubmitOptions};
use vforge_media::fs_utils::remove_quietly;
use vforge_models::request::MAX_COMBINE_INPUTS;
use vforge_models::{
    AudioRequest, CombineRequest, CompleteRequest, MergeRequest, OverlayRequest,
    ProcessingRequest, RequestError, WebhookHeader,
};

use crate::error::{ApiError, ApiResult};
use crate::handlers::upload::{next_field, save_field};
use crate::state::AppState;

/// A processing request plus its optional webhook fields.
#[derive(Debug, Deserialize)]
pub struct SubmitBody<T> {
    #[serde(flatten)]
    pub request: T,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_header: Option<WebhookHeader>,
}

impl<T> SubmitBody<T> {
    fn split(self) -> (T, SubmitOptions) {
        let options = SubmitOptions {
            webhook_url: self.webhook_url,
            webhook_header: self.webhook_header,
        };
        (self.request, options)
    }
}

type Accepted = (StatusCode, Json<JobReceipt>);

fn parse_body<T>(payload: Result<Json<SubmitBody<T>>, JsonRejection>) -> ApiResult<(T, SubmitOptions)> {
    let Json(body) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    Ok(body.split())
}

async fn submit(
    state: &AppState,
    request: ProcessingRequest,
    options: SubmitOptions,
) -> ApiResult<Accepted> {
    let kind = request.kind();
    let receipt = state.orchestrator.submit(request, options).await?;
    info!(job_id = %receipt.job_id, kind = %kind, "Job accepted");
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// Merge trimmed segments.
pub async fn merge_videos(
    State(state): State<AppState>,
    payload: Result<Json<SubmitBody<MergeRequest>>, JsonRejection>,
) -> ApiResult<Accepted> {
    let (request, options) = parse_body(payload)?;
    submit(&state, ProcessingRequest::Merge(request), options).await
}

/// Overlay an image on a video.
pub async fn add_overlay(
    State(state): State<AppState>,
    payload: Result<Json<SubmitBody<OverlayRequest>>, JsonRejection>,
) -> ApiResult<Accepted> {
    let (request, options) = parse_body(payload)?;
    submit(&state, ProcessingRequest::Overlay(request), options).await
}

/// Mix background music into a video.
pub async fn add_audio(
    State(state): State<AppState>,
    payload: Result<Json<SubmitBody<AudioRequest>>, JsonRejection>,
) -> ApiResult<Accepted> {
    let (request, options) = parse_body(payload)?;
    submit(&state, ProcessingRequest::Audio(request), options).await
}

/// Merge, overlay and audio in one job.
pub async fn process_complete(
    State(state): State<AppState>,
    payload: Result<Json<SubmitBody<CompleteRequest>>, JsonRejection>,
) -> ApiResult<Accepted> {
    let (request, options) = parse_body(payload)?;
    submit(&state, ProcessingRequest::Complete(request), options).await
}

/// Combine whole videos and upload the result.
///
/// Accepts JSON `{videos, webhook_url?, webhook_header?}` or a multipart form
/// with `videos` files and an optional `webhook_url` value.
pub async fn combine_videos(State(state): State<AppState>, request: Request) -> ApiResult<Accepted> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if !is_multipart {
        let payload = Json::<SubmitBody<CombineRequest>>::from_request(request, &state).await;
        let (request, options) = parse_body(payload)?;
        return submit(&state, ProcessingRequest::Combine(request), options).await;
    }

    if !state.orchestrator.has_uploader() {
        return Err(vforge_jobs::JobsError::StorageUnavailable.into());
    }

    let multipart = Multipart::from_request(request, &state)
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?;

    let mut saved = Vec::new();
    let result = async {
        let options = read_combine_form(multipart, &state.jobs_config.temp_dir, &mut saved).await?;
        let videos = saved.iter().map(|p: &PathBuf| p.to_string_lossy().into_owned()).collect();
        submit(&state, ProcessingRequest::Combine(CombineRequest { videos }), options).await
    }
    .await;

    if result.is_err() {
        for path in &saved {
            remove_quietly(path).await;
        }
    }
    result
}

/// Save the form's videos into `temp_dir`, recording each path in `saved`.
async fn read_combine_form(
    mut multipart: Multipart,
    temp_dir: &Path,
    saved: &mut Vec<PathBuf>,
) -> ApiResult<SubmitOptions> {
    let mut options = SubmitOptions::default();

    while let Some(field) = next_field(&mut multipart).await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("videos") => {
                if saved.len() >= MAX_COMBINE_INPUTS {
                    return Err(ApiError::from(vforge_jobs::JobsError::from(
                        RequestError::TooManyInputs {
                            max: MAX_COMBINE_INPUTS,
                            actual: saved.len() + 1,
                        },
                    )));
                }
                let base = field
                    .file_name()
                    .and_then(|n| Path::new(n).file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "video.mp4".to_string());
                let path = temp_dir.join(format!("{}_{}_{}", Uuid::new_v4(), saved.len(), base));
                save_field(field, &path).await?;
                saved.push(path);
            }
            Some("webhook_url") => {
                let url = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                options.webhook_url = Some(url).filter(|u| !u.trim().is_empty());
            }
            other => warn!(field = ?other, "Ignoring unexpected form field"),
        }
    }

    Ok(options)
}
