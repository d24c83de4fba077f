//! File upload handlers.

use std::path::Path;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;
use vforge_media::fs_utils::remove_quietly;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// A stored upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Name the client sent
    pub file_name: String,
    /// Where the file was stored; usable as a request path
    pub file_path: String,
    pub file_size: u64,
}

#[derive(Debug, Serialize)]
pub struct MultipleUploadResponse {
    pub files: Vec<UploadResponse>,
}

/// Upload a single file (multipart field `file`).
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    while let Some(field) = next_field(&mut multipart).await? {
        if field.name() != Some("file") {
            continue;
        }
        let stored = store_upload(&state.jobs_config.upload_dir, field).await?;
        return Ok(Json(stored));
    }

    Err(ApiError::bad_request("file is required"))
}

/// Upload several files (multipart field `files`).
///
/// Files that fail to store are skipped; the request fails only when none
/// could be stored.
pub async fn upload_multiple(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<MultipleUploadResponse>> {
    let mut files = Vec::new();
    let mut received = 0usize;

    while let Some(field) = next_field(&mut multipart).await? {
        if field.name() != Some("files") {
            continue;
        }
        received += 1;
        match store_upload(&state.jobs_config.upload_dir, field).await {
            Ok(stored) => files.push(stored),
            Err(e) => warn!("Skipping failed upload: {}", e),
        }
    }

    if received == 0 {
        return Err(ApiError::bad_request("At least one file is required"));
    }
    if files.is_empty() {
        return Err(ApiError::internal("All file uploads failed"));
    }

    Ok(Json(MultipleUploadResponse { files }))
}

pub(crate) async fn next_field<'a>(multipart: &'a mut Multipart) -> ApiResult<Option<Field<'a>>> {
    multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

/// Store an upload as `<uuid><ext>` in `dir`.
async fn store_upload(dir: &Path, field: Field<'_>) -> ApiResult<UploadResponse> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    let ext = Path::new(&file_name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let path = dir.join(format!("{}{}", Uuid::new_v4(), ext));

    let file_size = save_field(field, &path).await?;
    metrics::record_upload(file_size);
    info!(file = %path.display(), size = file_size, "Stored upload");

    Ok(UploadResponse {
        file_name,
        file_path: path.to_string_lossy().into_owned(),
        file_size,
    })
}

/// Stream a multipart field to `path`, returning the bytes written.
///
/// A partial file is removed on failure.
pub(crate) async fn save_field(mut field: Field<'_>, path: &Path) -> ApiResult<u64> {
    let mut file = File::create(path)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create {}: {}", path.display(), e)))?;

    let mut written = 0u64;
    let result: ApiResult<()> = async {
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| ApiError::internal(format!("Failed to write upload: {}", e)))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| ApiError::internal(format!("Failed to write upload: {}", e)))
    }
    .await;

    if let Err(e) = result {
        drop(file);
        remove_quietly(path).await;
        return Err(e);
    }
    Ok(written)
}
