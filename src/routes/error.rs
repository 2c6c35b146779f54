use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::db::StoreError;
use crate::services::intake::IntakeError;
use crate::services::processor::ProcessError;
use crate::services::progress::ProgressError;

/// Error returned by API handlers, rendered as `{"error": message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error("Invalid request: {}", .0.body_text())]
    Body(#[from] JsonRejection),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Progress(#[from] ProgressError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Intake(IntakeError::Validation(_)) | ApiError::Body(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Intake(IntakeError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Intake(IntakeError::PlaceNotFound(_)) | ApiError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
