use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::job::{JobStatus, JobType};
use crate::models::place::PlaceSummary;
use crate::models::report::Report;
use crate::models::scan::ScanStatus;

/// Request to start a scan for a place chosen from search results.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateScanRequest {
    #[garde(length(min = 1, max = 255))]
    pub place_id: String,

    #[garde(range(min = -90.0, max = 90.0))]
    pub lat: f64,

    #[garde(range(min = -180.0, max = 180.0))]
    pub lon: f64,
}

/// Response after a scan has been accepted (HTTP 202).
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ScanAccepted {
    pub session_id: String,
    pub status: ScanStatus,
    pub progress_url: String,
}

#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub job_type: JobType,
    pub status: JobStatus,
    pub error: Option<String>,
}

/// Response for querying a scan.
#[derive(Debug, Serialize)]
pub struct ScanStatusResponse {
    pub session_id: String,
    pub status: ScanStatus,
    pub jobs: Vec<JobSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SearchRequest {
    #[garde(length(min = 2, max = 200))]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<PlaceSummary>,
}

/// Response of the single-job processing trigger.
#[derive(Debug, Serialize)]
pub struct WorkerTriggerResponse {
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<uuid::Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_type: Option<JobType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}
