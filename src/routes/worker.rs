use axum::extract::State;
use axum::Json;

use crate::app_state::AppState;
use crate::models::api::WorkerTriggerResponse;
use crate::routes::error::ApiError;

const TRIGGER_WORKER: &str = "http-trigger";

/// POST /api/v1/worker — Process at most one queued job. An empty queue is a no-op.
pub async fn process_one(
    State(state): State<AppState>,
) -> Result<Json<WorkerTriggerResponse>, ApiError> {
    let response = match state.processor.process_next(TRIGGER_WORKER).await? {
        Some(processed) => {
            tracing::info!(
                job_id = %processed.job_id,
                job_type = %processed.job_type,
                outcome = processed.outcome.label(),
                "Triggered job processed"
            );
            WorkerTriggerResponse {
                processed: true,
                job_id: Some(processed.job_id),
                job_type: Some(processed.job_type),
                outcome: Some(processed.outcome.label().to_string()),
            }
        }
        None => WorkerTriggerResponse {
            processed: false,
            job_id: None,
            job_type: None,
            outcome: None,
        },
    };
    Ok(Json(response))
}
