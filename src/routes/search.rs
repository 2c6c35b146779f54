use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::app_state::AppState;
use crate::models::api::{SearchRequest, SearchResponse};
use crate::routes::error::ApiError;

/// POST /api/v1/search — Find candidate businesses by name or address.
pub async fn search_places(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.intake.search(request).await?))
}
