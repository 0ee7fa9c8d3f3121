//! Job endpoints.
//!
//! - POST /jobs - upload a document and schedule recognition
//! - GET /jobs/:job_id - job state, plus tokens once it succeeded
//! - GET /jobs - list jobs by status bucket with whole-store counts

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use ocrjobs::jobs::{JobListing, JobView, Page, StatusFilter};
use ocrjobs::RawParams;

use crate::error::ApiError;
use crate::state::AppState;

const UPLOAD_FIELD: &str = "file";
const MAX_PAGE_SIZE: u64 = 1000;

#[derive(Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// POST /jobs
///
/// Accepts a multipart body whose `file` field holds the document.
/// Recognition parameters come from the query string.
pub async fn submit_job(
    State(state): State<AppState>,
    Query(params): Query<RawParams>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        upload = Some((file_name, bytes.to_vec()));
        break;
    }

    let (file_name, bytes) = upload.ok_or_else(|| ApiError::BadRequest {
        code: "missing_file",
        message: format!("multipart field '{}' is required", UPLOAD_FIELD),
    })?;

    let size = bytes.len();
    let service = state.service().clone();
    let name = file_name.clone();
    let job_id =
        tokio::task::spawn_blocking(move || service.submit_upload(&name, bytes, &params))
            .await??;

    tracing::info!(job_id = %job_id, file_name = %file_name, size, "Job accepted");

    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { job_id })))
}

/// GET /jobs/:job_id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let service = state.service().clone();
    let view = tokio::task::spawn_blocking(move || service.query(&job_id)).await??;
    Ok(Json(view))
}

/// GET /jobs?status=pending|completed|failed|all&limit=&offset=
///
/// Without `status` the pending queue (pending and processing) is listed.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<JobListing>, ApiError> {
    let filter = match params.status.as_deref() {
        None | Some("") => StatusFilter::Active,
        Some(status) => StatusFilter::parse(status).ok_or_else(|| ApiError::BadRequest {
            code: "invalid_status",
            message: format!(
                "status must be one of pending, completed, failed, all; got '{}'",
                status
            ),
        })?,
    };

    let defaults = Page::default();
    let page = Page {
        limit: params.limit.unwrap_or(defaults.limit).min(MAX_PAGE_SIZE),
        offset: params.offset.unwrap_or(defaults.offset),
    };

    let service = state.service().clone();
    let listing = tokio::task::spawn_blocking(move || service.list_jobs(filter, page)).await??;
    Ok(Json(listing))
}
