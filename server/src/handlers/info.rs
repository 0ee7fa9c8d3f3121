use axum::{extract::State, Json};

use ocrjobs::ServiceInfo;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /info
pub async fn get_info(State(state): State<AppState>) -> Result<Json<ServiceInfo>, ApiError> {
    let service = state.service().clone();
    let info = tokio::task::spawn_blocking(move || service.info()).await?;
    Ok(Json(info))
}
