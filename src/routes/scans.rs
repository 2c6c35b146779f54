use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;

use crate::app_state::AppState;
use crate::models::api::{CreateScanRequest, JobSummary, ScanAccepted, ScanStatusResponse};
use crate::models::progress::{ProgressEvent, ProgressStage};
use crate::models::scan::{score_grade, ScanOrigin, ScanStatus};
use crate::routes::error::ApiError;

/// POST /api/v1/scans — Start a scan for a place picked from search results.
pub async fn create_scan(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateScanRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ScanAccepted>), ApiError> {
    let Json(request) = payload?;
    let origin = origin_from_headers(&headers);
    let accepted = state.intake.create_scan(request, origin).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// GET /api/v1/scans/{session_id} — Scan status, per-job progress and the report once ready.
pub async fn get_scan(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ScanStatusResponse>, ApiError> {
    let scan = state
        .store
        .get_scan(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Scan not found: {session_id}")))?;

    let jobs = state
        .store
        .get_jobs(&session_id)
        .await?
        .into_iter()
        .map(|record| JobSummary {
            job_type: record.job_type,
            status: record.status,
            error: record.error,
        })
        .collect();
    let report = state.store.get_report(&session_id).await?;

    Ok(Json(ScanStatusResponse {
        session_id: scan.session_id,
        status: scan.status,
        jobs,
        grade: report.as_ref().map(|r| score_grade(r.overall_score)),
        report,
    }))
}

/// GET /api/v1/scans/{session_id}/progress — Server-sent progress events.
///
/// Live events are best-effort. A scan that already finished yields its
/// terminal event immediately.
pub async fn scan_progress(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let scan = state
        .store
        .get_scan(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Scan not found: {session_id}")))?;

    let events: BoxStream<'static, ProgressEvent> = match scan.status {
        ScanStatus::Completed => stream::once(async {
            ProgressEvent::new(ProgressStage::Complete, 100, "Report ready!")
        })
        .boxed(),
        ScanStatus::Failed => {
            stream::once(async { ProgressEvent::failed("Scan failed") }).boxed()
        }
        ScanStatus::Pending | ScanStatus::InProgress => {
            state.progress.subscribe(&session_id).await?
        }
    };

    tracing::debug!(session_id = %session_id, "Progress subscriber connected");
    let stream = events.filter_map(|event| async move {
        Event::default()
            .event(event.stage.to_string())
            .json_data(&event)
            .ok()
            .map(Ok)
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    ))
}

/// Client address from proxy headers, plus the user agent.
pub fn origin_from_headers(headers: &HeaderMap) -> ScanOrigin {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let ip_address = header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .or_else(|| header("x-real-ip"))
        .map(str::to_string);

    ScanOrigin {
        ip_address,
        user_agent: header("user-agent").map(str::to_string),
    }
}
