use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use ocrjobs::CheckResult;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed_check: Option<&'static str>,
    checks: Vec<CheckResult>,
}

/// GET /health
///
/// 200 when the engine answers, the store round-trips a probe row and the
/// disk has room; otherwise 500 naming the first failing check.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<HealthResponse>), ApiError> {
    let service = state.service().clone();
    let report = tokio::task::spawn_blocking(move || service.health()).await?;

    let failed_check = report.failed_check().map(|c| c.name);
    let (status, label) = if report.healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "unhealthy")
    };

    Ok((
        status,
        Json(HealthResponse {
            status: label,
            failed_check,
            checks: report.checks,
        }),
    ))
}
