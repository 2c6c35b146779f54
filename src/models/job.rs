use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::models::place::PlaceDetails;
use crate::models::progress::ProgressStage;

/// The four analyses run for every scan.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobType {
    SearchVisibility,
    WebsiteExperience,
    LocalListings,
    CompetitorBenchmark,
}

impl JobType {
    pub const ALL: [JobType; 4] = [
        JobType::SearchVisibility,
        JobType::WebsiteExperience,
        JobType::LocalListings,
        JobType::CompetitorBenchmark,
    ];

    /// Job types the competitor benchmark waits on.
    pub const INDEPENDENT: [JobType; 3] = [
        JobType::SearchVisibility,
        JobType::WebsiteExperience,
        JobType::LocalListings,
    ];

    pub fn is_dependent(self) -> bool {
        self == JobType::CompetitorBenchmark
    }

    pub fn stage(self) -> ProgressStage {
        match self {
            JobType::SearchVisibility => ProgressStage::Search,
            JobType::WebsiteExperience => ProgressStage::Website,
            JobType::LocalListings => ProgressStage::Listings,
            JobType::CompetitorBenchmark => ProgressStage::Competitors,
        }
    }
}

/// Status of a scan job record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Persisted outcome of one job type for one scan. At most one per (scan, job type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed && self.result.is_some()
    }
}

/// Bounded exponential backoff attached to each queued job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
        }
    }
}

impl RetryPolicy {
    /// Delay before re-running a job that has failed `attempt` times (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << exponent))
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// Queue-resident unit of work. Carries the business profile so workers skip a lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobDescriptor {
    pub id: Uuid,
    pub job_type: JobType,
    pub session_id: String,
    pub business: PlaceDetails,
    pub retry: RetryPolicy,
    /// Failed executions so far.
    pub attempts: u32,
    /// Not-ready re-queues so far (dependent job only, never counted as failures).
    pub deferrals: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl JobDescriptor {
    pub fn new(
        job_type: JobType,
        session_id: impl Into<String>,
        business: PlaceDetails,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type,
            session_id: session_id.into(),
            business,
            retry,
            attempts: 0,
            deferrals: 0,
            next_retry_at: None,
        }
    }
}
